//! Scalar codec over the DRAM banks.
//!
//! Host-side floats are quantized into the accelerator's fixed-point
//! format and moved through DMA-visible bank regions at scalar
//! granularity. Every write flushes the written byte range afterwards;
//! every read flushes first, so dirty host lines are written back before
//! the bytes are decoded.
//!
//! Offsets and sizes here are in scalars; vector-granular addressing is
//! the driver's job.

use core::cmp::Ordering;

use platform::{DmaRegion, FileSystem};
use rand::RngCore;

use crate::architecture::DataType;
use crate::error::{driver_error, Error, Result};

/// Decode `out.len()` scalars from `region` starting at scalar
/// `offset`.
pub fn read_scalars(region: &DmaRegion, ty: DataType, offset: usize, out: &mut [f32]) {
    let sizeof = ty.size_bytes();
    let base = offset * sizeof;
    region.flush(base, out.len() * sizeof);

    let mut word = [0u8; 8];
    for (i, slot) in out.iter_mut().enumerate() {
        let word = &mut word[..sizeof];
        region.read(base + i * sizeof, word);
        *slot = ty.decode(word);
    }
}

/// Encode `values` into `region` starting at scalar `offset`, then flush
/// the written range.
pub fn write_scalars(region: &mut DmaRegion, ty: DataType, offset: usize, values: &[f32]) {
    let sizeof = ty.size_bytes();
    let base = offset * sizeof;
    region.fill(base, 0, values.len() * sizeof);

    let mut word = [0u8; 8];
    for (i, &value) in values.iter().enumerate() {
        let word = &mut word[..sizeof];
        ty.encode(value, word);
        region.write(base + i * sizeof, word);
    }

    region.flush(base, values.len() * sizeof);
}

/// Fill `count` scalars with random bytes, then flush. Any bit pattern is
/// a representable fixed-point value, which is what the self-tests rely
/// on for exact move comparisons.
pub fn fill_random<R: RngCore>(
    region: &mut DmaRegion,
    ty: DataType,
    offset: usize,
    count: usize,
    rng: &mut R,
) {
    let base = offset * ty.size_bytes();
    let size = count * ty.size_bytes();

    let mut chunk = [0u8; 64];
    let mut done = 0;
    while done < size {
        let n = (size - done).min(chunk.len());
        rng.fill_bytes(&mut chunk[..n]);
        region.write(base + done, &chunk[..n]);
        done += n;
    }

    region.flush(base, size);
}

/// Fill `count` scalars with `byte`, then flush.
pub fn fill_bytes(region: &mut DmaRegion, ty: DataType, offset: usize, byte: u8, count: usize) {
    let base = offset * ty.size_bytes();
    let size = count * ty.size_bytes();
    region.fill(base, byte, size);
    region.flush(base, size);
}

/// Bytewise comparison of `count` scalars across two banks, `memcmp`
/// semantics. Both ranges are flushed before the compare.
#[must_use]
pub fn compare_bytes(
    bank0: &DmaRegion,
    bank1: &DmaRegion,
    ty: DataType,
    offset0: usize,
    offset1: usize,
    count: usize,
) -> Ordering {
    let sizeof = ty.size_bytes();
    let size = count * sizeof;
    bank0.flush(offset0 * sizeof, size);
    bank1.flush(offset1 * sizeof, size);
    bank0.compare(offset0 * sizeof, bank1, offset1 * sizeof, size)
}

/// Stream a file of raw little-endian scalars into `region` at scalar
/// `offset`. The file length must equal `count` scalars exactly.
pub fn write_scalars_from_file<F: FileSystem>(
    region: &mut DmaRegion,
    ty: DataType,
    offset: usize,
    count: usize,
    fs: &mut F,
    path: &str,
) -> Result<()> {
    let sizeof = ty.size_bytes();
    let base = offset * sizeof;
    let size = count * sizeof;

    let actual = fs
        .file_size(path)
        .map_err(|e| Error::file_system(e, path))?;
    if actual != size as u64 {
        return Err(driver_error!(
            UnexpectedConstsSize,
            "Unexpected consts size in {}",
            path
        ));
    }

    let slice = match region.as_mut_slice().get_mut(base..base + size) {
        Some(slice) => slice,
        None => {
            return Err(driver_error!(
                InsufficientBuffer,
                "Consts data too big in {}",
                path
            ))
        }
    };
    let read = fs
        .read_range(path, 0, slice)
        .map_err(|e| Error::file_system(e, path))?;
    if read != size {
        return Err(Error::file_system("short read", path));
    }

    region.flush(base, size);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use platform::HostRegion;
    use proptest::prelude::*;
    use rand::SeedableRng;

    const TY: DataType = DataType::Fp16Bp8;

    #[test]
    fn stored_bytes_match_the_wire_format() {
        // [1.0, -1.0, 0.0, 0.5] -> 00 01, 00 FF, 00 00, 80 00
        let mem = HostRegion::new(64).unwrap();
        let mut region = mem.region();
        write_scalars(&mut region, TY, 0, &[1.0, -1.0, 0.0, 0.5]);
        assert_eq!(
            &region.as_slice()[..8],
            &[0x00, 0x01, 0x00, 0xFF, 0x00, 0x00, 0x80, 0x00]
        );

        let mut out = [0.0f32; 4];
        read_scalars(&region, TY, 0, &mut out);
        assert_eq!(out, [1.0, -1.0, 0.0, 0.5]);
    }

    #[test]
    fn saturating_write_reads_back_the_extremum() {
        let mem = HostRegion::new(16).unwrap();
        let mut region = mem.region();
        write_scalars(&mut region, TY, 0, &[1000.0]);
        assert_eq!(&region.as_slice()[..2], &[0xFF, 0x7F]);

        let mut out = [0.0f32; 1];
        read_scalars(&region, TY, 0, &mut out);
        assert!((out[0] - TY.max_scalar()).abs() < 1e-6);
    }

    #[test]
    fn offset_is_scalar_granular() {
        let mem = HostRegion::new(64).unwrap();
        let mut region = mem.region();
        write_scalars(&mut region, TY, 3, &[2.5]);
        // Scalar 3 starts at byte 6; 2.5 * 256 = 640 = 0x0280.
        assert_eq!(&region.as_slice()[6..8], &[0x80, 0x02]);
    }

    #[test]
    fn fill_bytes_covers_exactly_the_requested_scalars() {
        let mem = HostRegion::new(32).unwrap();
        let mut region = mem.region();
        fill_bytes(&mut region, TY, 2, 0xFF, 3);
        let bytes = region.as_slice();
        assert!(bytes[..4].iter().all(|&b| b == 0));
        assert!(bytes[4..10].iter().all(|&b| b == 0xFF));
        assert!(bytes[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn compare_bytes_has_memcmp_semantics() {
        let mem0 = HostRegion::new(32).unwrap();
        let mem1 = HostRegion::new(32).unwrap();
        let mut bank0 = mem0.region();
        let mut bank1 = mem1.region();
        write_scalars(&mut bank0, TY, 0, &[1.0, 2.0]);
        write_scalars(&mut bank1, TY, 4, &[1.0, 2.0]);
        assert_eq!(compare_bytes(&bank0, &bank1, TY, 0, 4, 2), Ordering::Equal);

        write_scalars(&mut bank1, TY, 4, &[1.0, 2.5]);
        assert_ne!(compare_bytes(&bank0, &bank1, TY, 0, 4, 2), Ordering::Equal);
    }

    #[test]
    fn fill_random_is_deterministic_per_seed() {
        let mem0 = HostRegion::new(64).unwrap();
        let mem1 = HostRegion::new(64).unwrap();
        let mut bank0 = mem0.region();
        let mut bank1 = mem1.region();

        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);
        fill_random(&mut bank0, TY, 0, 32, &mut rng);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);
        fill_random(&mut bank1, TY, 0, 32, &mut rng);

        assert_eq!(compare_bytes(&bank0, &bank1, TY, 0, 0, 32), Ordering::Equal);
    }

    #[test]
    fn file_write_checks_the_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consts.tdata");
        std::fs::write(&path, [0x11u8; 16]).unwrap();
        let path = path.to_str().unwrap();
        let mut fs = platform::LocalFileSystem;

        let mem = HostRegion::new(64).unwrap();
        let mut region = mem.region();

        // 16 bytes = 8 FP16BP8 scalars; asking for 4 is a consts-size error.
        let err = write_scalars_from_file(&mut region, TY, 0, 4, &mut fs, path).unwrap_err();
        assert!(err.is_driver(crate::error::DriverError::UnexpectedConstsSize));

        write_scalars_from_file(&mut region, TY, 0, 8, &mut fs, path).unwrap();
        assert!(region.as_slice()[..16].iter().all(|&b| b == 0x11));
    }

    #[test]
    fn file_write_outside_the_region_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consts.tdata");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let path = path.to_str().unwrap();
        let mut fs = platform::LocalFileSystem;

        let mem = HostRegion::new(16).unwrap();
        let mut region = mem.region();
        let err = write_scalars_from_file(&mut region, TY, 4, 8, &mut fs, path).unwrap_err();
        assert!(err.is_driver(crate::error::DriverError::InsufficientBuffer));
    }

    proptest! {
        #[test]
        fn round_trip_error_is_bounded(x in -128.0f32..128.0) {
            let mem = HostRegion::new(16).unwrap();
            let mut region = mem.region();
            write_scalars(&mut region, TY, 0, &[x]);
            let mut out = [0.0f32; 1];
            read_scalars(&region, TY, 0, &mut out);
            prop_assert!((out[0] - x).abs() <= TY.max_error());
        }

        #[test]
        fn out_of_range_values_saturate(x in proptest::num::f32::NORMAL) {
            prop_assume!(x.abs() > 200.0);
            let mem = HostRegion::new(16).unwrap();
            let mut region = mem.region();
            write_scalars(&mut region, TY, 0, &[x]);
            let mut out = [0.0f32; 1];
            read_scalars(&region, TY, 0, &mut out);
            let expected = if x > 0.0 { TY.max_scalar() } else { TY.min_scalar() };
            prop_assert!((out[0] - expected).abs() < 1e-6);
        }
    }
}
