//! Accelerator architecture descriptor.
//!
//! Nine size parameters fix everything the driver derives at init: operand
//! field widths, DRAM bank sizes, probe slot addresses. Two architectures
//! are compatible iff every field matches; a model compiled for one
//! parameterization cannot run on another.

use serde_json::Value;

use crate::json;

/// Scalar data formats the accelerator's array operates on.
///
/// Adding a format means adding a variant here; the instruction layout is
/// unaware of the scalar encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    /// 16-bit signed fixed point with 8 fractional bits (scale 256).
    Fp16Bp8,
}

impl DataType {
    const FP16BP8_RATIO: f32 = 256.0;

    /// Size of one scalar in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            DataType::Fp16Bp8 => 2,
        }
    }

    /// Largest representable scalar value.
    #[must_use]
    pub fn max_scalar(self) -> f32 {
        match self {
            DataType::Fp16Bp8 => f32::from(i16::MAX) / Self::FP16BP8_RATIO,
        }
    }

    /// Smallest representable scalar value.
    #[must_use]
    pub fn min_scalar(self) -> f32 {
        match self {
            DataType::Fp16Bp8 => f32::from(i16::MIN) / Self::FP16BP8_RATIO,
        }
    }

    /// Largest tolerated round-trip error for scalar comparisons.
    #[must_use]
    pub fn max_error(self) -> f32 {
        match self {
            DataType::Fp16Bp8 => 0.2,
        }
    }

    /// Encode one scalar into its little-endian byte representation.
    ///
    /// Values are rounded half away from zero and saturate at the
    /// representable extrema.
    pub fn encode(self, value: f32, out: &mut [u8]) {
        match self {
            DataType::Fp16Bp8 => {
                let scaled = value * Self::FP16BP8_RATIO;
                let clamped = scaled.clamp(f32::from(i16::MIN), f32::from(i16::MAX));
                // Truncation toward zero after the half-offset gives
                // round-half-away-from-zero without libm.
                #[allow(clippy::cast_possible_truncation)]
                let bits = if clamped >= 0.0 {
                    (clamped + 0.5) as i16
                } else {
                    (clamped - 0.5) as i16
                };
                let bytes = bits.to_le_bytes();
                if let Some(slot) = out.get_mut(..bytes.len()) {
                    slot.copy_from_slice(&bytes);
                }
            }
        }
    }

    /// Decode one scalar from its little-endian byte representation.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            DataType::Fp16Bp8 => {
                let mut word = [0u8; 2];
                if let Some(src) = bytes.get(..2) {
                    word.copy_from_slice(src);
                }
                f32::from(i16::from_le_bytes(word)) / Self::FP16BP8_RATIO
            }
        }
    }
}

/// The accelerator's size parameters.
///
/// `data_type` is `None` when the descriptor named no recognized format;
/// [`Architecture::is_valid`] rejects that record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Architecture {
    /// Scalars per vector; matches the systolic array width.
    pub array_size: usize,
    /// Scalar format the array operates on.
    pub data_type: Option<DataType>,
    /// Local (on-chip SRAM) depth in vectors.
    pub local_depth: usize,
    /// Accumulator depth in vectors.
    pub accumulator_depth: usize,
    /// DRAM0 (activations) depth in vectors.
    pub dram0_depth: usize,
    /// DRAM1 (weights/constants) depth in vectors.
    pub dram1_depth: usize,
    /// Stride-0 selector range (a power of two count of stride exponents).
    pub stride0_depth: usize,
    /// Stride-1 selector range.
    pub stride1_depth: usize,
    /// SIMD register file depth.
    pub simd_registers_depth: usize,
}

impl Architecture {
    /// `true` when every parameter is in range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.array_size > 0
            && self.data_type.is_some()
            && self.local_depth > 0
            && self.accumulator_depth > 0
            && self.dram0_depth > 0
            && self.dram1_depth > 0
            && self.stride0_depth > 0
            && self.stride1_depth > 0
            && self.simd_registers_depth > 0
    }

    /// `true` when a model compiled for `model_arch` can run on this
    /// architecture.
    // TODO: can be less strict, e.g. if the instruction layout is the same
    // and driver depth >= model depth.
    #[must_use]
    pub fn is_compatible(&self, model_arch: &Architecture) -> bool {
        self == model_arch
    }

    /// Parse an architecture from a JSON object.
    ///
    /// Missing or ill-typed fields leave zero defaults; parsing itself
    /// never fails, validation happens in [`Architecture::is_valid`].
    #[must_use]
    pub fn parse(value: &Value) -> Architecture {
        let mut arch = Architecture::default();
        if value.is_object() {
            json::size_field(value, "array_size", &mut arch.array_size);
            arch.data_type = parse_data_type(value, "data_type");
            json::size_field(value, "local_depth", &mut arch.local_depth);
            json::size_field(value, "accumulator_depth", &mut arch.accumulator_depth);
            json::size_field(value, "dram0_depth", &mut arch.dram0_depth);
            json::size_field(value, "dram1_depth", &mut arch.dram1_depth);
            json::size_field(value, "stride0_depth", &mut arch.stride0_depth);
            json::size_field(value, "stride1_depth", &mut arch.stride1_depth);
            json::size_field(value, "simd_registers_depth", &mut arch.simd_registers_depth);
        }
        arch
    }
}

fn parse_data_type(value: &Value, name: &str) -> Option<DataType> {
    match value.get(name).and_then(Value::as_str) {
        Some("FP16BP8") => Some(DataType::Fp16Bp8),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn test_arch() -> Architecture {
        Architecture {
            array_size: 8,
            data_type: Some(DataType::Fp16Bp8),
            local_depth: 4096,
            accumulator_depth: 2048,
            dram0_depth: 1_048_576,
            dram1_depth: 1_048_576,
            stride0_depth: 4,
            stride1_depth: 4,
            simd_registers_depth: 1,
        }
    }

    #[test]
    fn valid_architecture_passes() {
        assert!(test_arch().is_valid());
    }

    #[test]
    fn zero_depth_fails_validation() {
        let mut arch = test_arch();
        arch.local_depth = 0;
        assert!(!arch.is_valid());
    }

    #[test]
    fn missing_data_type_fails_validation() {
        let mut arch = test_arch();
        arch.data_type = None;
        assert!(!arch.is_valid());
    }

    #[test]
    fn compatibility_is_exact_equality() {
        let a = test_arch();
        let mut b = a;
        assert!(a.is_compatible(&b));
        b.dram1_depth += 1;
        assert!(!a.is_compatible(&b));
    }

    #[test]
    fn parse_reads_all_fields() {
        let doc: Value = serde_json::from_str(
            r#"{
                "array_size": 8, "data_type": "FP16BP8",
                "local_depth": 4096, "accumulator_depth": 2048,
                "dram0_depth": 1048576, "dram1_depth": 1048576,
                "stride0_depth": 4, "stride1_depth": 4,
                "simd_registers_depth": 1
            }"#,
        )
        .unwrap();
        assert_eq!(Architecture::parse(&doc), test_arch());
    }

    #[test]
    fn parse_tolerates_missing_and_ill_typed_fields() {
        let doc: Value =
            serde_json::from_str(r#"{"array_size": "eight", "data_type": "FP32"}"#).unwrap();
        let arch = Architecture::parse(&doc);
        assert_eq!(arch.array_size, 0);
        assert_eq!(arch.data_type, None);
        assert!(!arch.is_valid());
    }

    #[test]
    fn parse_of_a_non_object_leaves_defaults() {
        let arch = Architecture::parse(&Value::Null);
        assert_eq!(arch, Architecture::default());
    }

    #[test]
    fn fp16bp8_constants() {
        let ty = DataType::Fp16Bp8;
        assert_eq!(ty.size_bytes(), 2);
        assert!((ty.max_scalar() - 127.996_09).abs() < 1e-3);
        assert!((ty.min_scalar() + 128.0).abs() < 1e-6);
        assert!((ty.max_error() - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn encode_stored_bytes_match_the_wire_format() {
        // [1.0, -1.0, 0.0, 0.5] -> 00 01, 00 FF, 00 00, 80 00
        let ty = DataType::Fp16Bp8;
        let mut out = [0u8; 2];
        ty.encode(1.0, &mut out);
        assert_eq!(out, [0x00, 0x01]);
        ty.encode(-1.0, &mut out);
        assert_eq!(out, [0x00, 0xFF]);
        ty.encode(0.0, &mut out);
        assert_eq!(out, [0x00, 0x00]);
        ty.encode(0.5, &mut out);
        assert_eq!(out, [0x80, 0x00]);
    }

    #[test]
    fn encode_saturates_at_the_extrema() {
        let ty = DataType::Fp16Bp8;
        let mut out = [0u8; 2];
        ty.encode(1000.0, &mut out);
        assert_eq!(out, [0xFF, 0x7F]);
        ty.encode(-1000.0, &mut out);
        assert_eq!(out, [0x00, 0x80]);
    }

    #[test]
    fn decode_inverts_encode_within_max_error() {
        let ty = DataType::Fp16Bp8;
        let mut out = [0u8; 2];
        for &x in &[0.0f32, 0.125, -0.125, 1.0, -1.0, 77.77, -77.77, 127.9, -127.9] {
            ty.encode(x, &mut out);
            assert!((ty.decode(&out) - x).abs() <= ty.max_error(), "x = {x}");
        }
    }
}
