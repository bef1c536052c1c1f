//! Append-only program builder over the DMA-visible instruction region.
//!
//! The buffer owns its region for the lifetime of the driver and keeps a
//! mutable append offset; `offset <= capacity` always holds, and the
//! region is flushed over exactly the written range after every append so
//! the DMA engine reads coherent bytes.

use platform::{DmaRegion, FileSystem};

use crate::error::{driver_error, Error, Result};
use crate::instruction::{ConfigRegister, InstructionLayout, Opcode};

/// An instruction program staged in DMA-visible memory.
#[derive(Debug)]
pub struct InstructionBuffer {
    region: DmaRegion,
    offset: usize,
}

impl InstructionBuffer {
    /// Wrap the platform's program region.
    #[must_use]
    pub fn new(region: DmaRegion) -> Self {
        Self { region, offset: 0 }
    }

    /// Discard the current program.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Bytes appended so far (the program size).
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total region size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// The underlying region, for DMA submission and analysis.
    #[must_use]
    pub fn region(&self) -> &DmaRegion {
        &self.region
    }

    fn claim(&mut self, size: usize) -> Result<usize> {
        if size > self.region.len() - self.offset {
            return Err(driver_error!(InsufficientBuffer, "Program is too big"));
        }
        let at = self.offset;
        self.offset += size;
        Ok(at)
    }

    /// Append one encoded instruction.
    pub fn append_instruction(
        &mut self,
        layout: &InstructionLayout,
        opcode: Opcode,
        flags: u8,
        operand0: u64,
        operand1: u64,
        operand2: u64,
    ) -> Result<()> {
        let at = self.claim(layout.instruction_size_bytes)?;
        layout.encode(
            self.region.as_mut_slice(),
            at,
            opcode,
            flags,
            operand0,
            operand1,
            operand2,
        );
        self.region.flush(at, layout.instruction_size_bytes);
        Ok(())
    }

    /// Append a Config instruction writing `value` to `register`.
    ///
    /// The three operand fields carry `(value << 4) | register` as a single
    /// little-endian number; the decoder realigns the split itself.
    pub fn append_config(
        &mut self,
        layout: &InstructionLayout,
        register: ConfigRegister,
        value: u64,
    ) -> Result<()> {
        let at = self.claim(layout.instruction_size_bytes)?;
        layout.encode_packed(
            self.region.as_mut_slice(),
            at,
            Opcode::Config,
            0,
            (value << 4) | u64::from(register as u8),
        );
        self.region.flush(at, layout.instruction_size_bytes);
        Ok(())
    }

    /// Append `count` NoOp instructions (all-zero bytes).
    pub fn append_noops(&mut self, layout: &InstructionLayout, count: usize) -> Result<()> {
        let size = count * layout.instruction_size_bytes;
        if size > self.region.len() - self.offset {
            return Err(driver_error!(InsufficientBuffer, "Program is too big"));
        }
        self.region.fill(self.offset, 0, size);
        self.region.flush(self.offset, size);
        self.offset += size;
        Ok(())
    }

    /// Append a pre-compiled program image.
    pub fn append_program(&mut self, image: &[u8]) -> Result<()> {
        let at = self.claim(image.len())?;
        self.region.write(at, image);
        self.region.flush(at, image.len());
        Ok(())
    }

    /// Append a pre-compiled program read straight from a file into the
    /// buffer region.
    ///
    /// When `size` is nonzero the file length must match it exactly.
    pub fn append_program_from_file<F: FileSystem>(
        &mut self,
        size: usize,
        fs: &mut F,
        path: &str,
    ) -> Result<()> {
        let actual = fs
            .file_size(path)
            .map_err(|e| Error::file_system(e, path))?;
        let actual = usize::try_from(actual)
            .map_err(|_| driver_error!(InsufficientBuffer, "Program is too big in {}", path))?;

        if size != 0 && actual != size {
            return Err(driver_error!(
                UnexpectedProgramSize,
                "Unexpected program size in {}",
                path
            ));
        }
        if actual > self.region.len() - self.offset {
            return Err(driver_error!(
                InsufficientBuffer,
                "Program is too big in {}",
                path
            ));
        }

        let slice = self
            .region
            .as_mut_slice()
            .get_mut(self.offset..self.offset + actual)
            .unwrap_or(&mut []);
        let read = fs
            .read_range(path, 0, slice)
            .map_err(|e| Error::file_system(e, path))?;
        if read != actual {
            return Err(Error::file_system("short read", path));
        }

        self.region.flush(self.offset, actual);
        self.offset += actual;
        Ok(())
    }

    /// Append NoOps until the offset is a multiple of `alignment_bytes`
    /// (the DMA bus width, a power of two).
    pub fn pad_to_alignment(
        &mut self,
        layout: &InstructionLayout,
        alignment_bytes: usize,
    ) -> Result<()> {
        while self.offset & (alignment_bytes - 1) != 0 {
            self.append_instruction(layout, Opcode::NoOp, 0, 0, 0, 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::architecture::{Architecture, DataType};
    use crate::instruction::DataMoveFlags;
    use platform::HostRegion;

    fn arch() -> Architecture {
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

    fn buffer(bytes: usize) -> (HostRegion, InstructionBuffer) {
        let mem = HostRegion::new(bytes).unwrap();
        let buf = InstructionBuffer::new(mem.region());
        (mem, buf)
    }

    #[test]
    fn encode_scenario_reference_bytes() {
        // DataMove DRAM0->Local with op0 = (stride 2, addr 0x123),
        // op1 = (stride 1, addr 0x456), op2 = 7.
        let layout = InstructionLayout::new(&arch());
        let (_mem, mut buf) = buffer(256);
        buf.append_instruction(
            &layout,
            Opcode::DataMove,
            DataMoveFlags::Dram0ToLocal.as_nibble(),
            layout.make_operand0(0x123, 2),
            layout.make_operand1(0x456, 1),
            0x7,
        )
        .unwrap();

        let bytes = &buf.region().as_slice()[..layout.instruction_size_bytes];
        // operand0 = (2 << 12) | 0x123 = 0x2123, two bytes LE.
        assert_eq!(&bytes[0..2], &[0x23, 0x21]);
        // operand1 = (1 << 20) | 0x456 = 0x100456, three bytes LE.
        assert_eq!(&bytes[2..5], &[0x56, 0x04, 0x10]);
        // operand2 = 7, two bytes LE.
        assert_eq!(&bytes[5..7], &[0x07, 0x00]);
        // header = (DataMove << 4) | 0 = 0x20, highest-addressed byte.
        assert_eq!(bytes[7], 0x20);
    }

    #[test]
    fn config_scenario_reference_bytes() {
        // append_config(DRAM0_OFFSET = 0x0, 0xDEAD): operand block parses
        // little-endian as (0xDEAD << 4) | 0x0 = 0xDEAD0.
        let layout = InstructionLayout::new(&arch());
        let (_mem, mut buf) = buffer(256);
        buf.append_config(&layout, ConfigRegister::Dram0Offset, 0xDEAD)
            .unwrap();

        let bytes = &buf.region().as_slice()[..layout.instruction_size_bytes];
        assert_eq!(bytes[layout.instruction_size_bytes - 1], 0xF0);
        assert_eq!(layout.decode_packed_operands(bytes), 0xDEAD0);
    }

    #[test]
    fn append_advances_offset_and_leaves_other_bytes_alone() {
        let layout = InstructionLayout::new(&arch());
        let (_mem, mut buf) = buffer(256);

        buf.append_instruction(&layout, Opcode::NoOp, 0, 0, 0, 0).unwrap();
        let before = buf.offset();
        let snapshot: Vec<u8> = buf.region().as_slice()[..before].to_vec();

        buf.append_instruction(
            &layout,
            Opcode::DataMove,
            DataMoveFlags::LocalToDram0.as_nibble(),
            1,
            2,
            3,
        )
        .unwrap();

        assert!(buf.offset() > before);
        assert_eq!(&buf.region().as_slice()[..before], snapshot.as_slice());
    }

    #[test]
    fn overflowing_append_is_rejected_and_offset_unchanged() {
        let layout = InstructionLayout::new(&arch());
        // Room for exactly one instruction.
        let (_mem, mut buf) = buffer(layout.instruction_size_bytes);
        buf.append_instruction(&layout, Opcode::NoOp, 0, 0, 0, 0).unwrap();
        let offset = buf.offset();
        let err = buf
            .append_instruction(&layout, Opcode::NoOp, 0, 0, 0, 0)
            .unwrap_err();
        assert!(err.is_driver(crate::error::DriverError::InsufficientBuffer));
        assert_eq!(buf.offset(), offset);
    }

    #[test]
    fn pad_to_alignment_appends_only_noops() {
        let layout = InstructionLayout::new(&arch());
        let (_mem, mut buf) = buffer(512);
        buf.append_instruction(&layout, Opcode::MatMul, 0, 0, 0, 0).unwrap();
        buf.pad_to_alignment(&layout, 64).unwrap();
        assert_eq!(buf.offset() % 64, 0);

        // Every instruction after the first decodes as NoOp (all zeros).
        let mut at = layout.instruction_size_bytes;
        while at < buf.offset() {
            let decoded = layout.decode(&buf.region().as_slice()[at..]).unwrap();
            assert_eq!(decoded.opcode, Opcode::NoOp.as_nibble());
            assert_eq!(decoded.flags, 0);
            at += layout.instruction_size_bytes;
        }
    }

    #[test]
    fn pad_to_alignment_is_a_noop_when_aligned() {
        let layout = InstructionLayout::new(&arch());
        let (_mem, mut buf) = buffer(256);
        buf.append_noops(&layout, 8).unwrap();
        let offset = buf.offset();
        buf.pad_to_alignment(&layout, layout.instruction_size_bytes)
            .unwrap();
        assert_eq!(buf.offset(), offset);
    }

    #[test]
    fn append_noops_zeroes_the_range() {
        let layout = InstructionLayout::new(&arch());
        let (_mem, mut buf) = buffer(256);
        // Dirty the region first.
        buf.append_program(&[0xAA; 32]).unwrap();
        buf.reset();
        buf.append_noops(&layout, 3).unwrap();
        assert_eq!(buf.offset(), 3 * layout.instruction_size_bytes);
        assert!(buf.region().as_slice()[..buf.offset()].iter().all(|&b| b == 0));
    }

    #[test]
    fn append_program_copies_the_image() {
        let (_mem, mut buf) = buffer(64);
        buf.append_program(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(buf.offset(), 5);
        assert_eq!(&buf.region().as_slice()[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn append_program_from_file_checks_the_declared_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.tprog");
        std::fs::write(&path, [0u8; 24]).unwrap();
        let path = path.to_str().unwrap();
        let mut fs = platform::LocalFileSystem;

        let (_mem, mut buf) = buffer(256);
        let err = buf.append_program_from_file(16, &mut fs, path).unwrap_err();
        assert!(err.is_driver(crate::error::DriverError::UnexpectedProgramSize));
        assert!(err.message().contains("prog.tprog"));

        // size = 0 skips the check; the whole file lands in the buffer.
        buf.append_program_from_file(0, &mut fs, path).unwrap();
        assert_eq!(buf.offset(), 24);
    }

    #[test]
    fn append_program_from_file_rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.tprog");
        std::fs::write(&path, [0u8; 128]).unwrap();
        let path = path.to_str().unwrap();
        let mut fs = platform::LocalFileSystem;

        let (_mem, mut buf) = buffer(64);
        let err = buf.append_program_from_file(0, &mut fs, path).unwrap_err();
        assert!(err.is_driver(crate::error::DriverError::InsufficientBuffer));
    }

    #[test]
    fn missing_file_surfaces_a_file_system_error() {
        let mut fs = platform::LocalFileSystem;
        let (_mem, mut buf) = buffer(64);
        let err = buf
            .append_program_from_file(0, &mut fs, "/no/such/prog.tprog")
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FileSystem);
    }
}
