//! Execution sample collection and analysis.
//!
//! When sampling is enabled the accelerator emits one 8-byte sample every
//! [`SAMPLE_INTERVAL_CYCLES`] cycles: a 32-bit program counter and a
//! 16-bit tag of pipeline-stage valid/ready flag pairs (two reserved
//! bytes). The sample DMA deposits block-sized chunks into a finite host
//! region while the accelerator emits without bound, so the region behaves
//! as a ring: older samples get overwritten.
//!
//! Recovery leans on the program counter being monotonic within a lap:
//! the first slot where the PC *descends* marks the wrap point, and the
//! slot after the descent is the oldest surviving sample. Iteration runs
//! from there to the end of the delivered bytes; anything before the wrap
//! point is a newer lap that is discarded along with its partial context.

use core::fmt;

use alloc::vec::Vec;

use platform::{DmaRegion, FileSystem};

use crate::buffer::InstructionBuffer;
use crate::error::{driver_error, Error, Result};
use crate::instruction::{DataMoveFlags, InstructionLayout, Opcode};

/// Size of one execution sample on the wire.
pub const SAMPLE_SIZE_BYTES: usize = 8;

/// Cycles between samples, programmed into the sample-interval register
/// at driver init.
pub const SAMPLE_INTERVAL_CYCLES: u64 = 1000;

/// Program counter value marking a slot the accelerator never populated.
pub const INVALID_PROGRAM_COUNTER: u32 = u32::MAX;

const HEADER_COUNTS: usize = 1 << 8;
const OPCODE_COUNTS: usize = 1 << 4;
const FLAGS_COUNTS: usize = 1 << 16;

/// One decoded execution sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRecord {
    /// Decoder program counter at sample time.
    pub program_counter: u32,
    /// Pipeline-stage valid/ready flag pairs.
    pub flags: u16,
    /// Byte offset of the sampled instruction inside the program buffer.
    pub instruction_offset: usize,
}

/// The DMA-filled sample region and its fill offset.
#[derive(Debug)]
pub struct SampleBuffer {
    region: DmaRegion,
    offset: usize,
}

impl SampleBuffer {
    /// Wrap the platform's sample region.
    #[must_use]
    pub fn new(region: DmaRegion) -> Self {
        Self { region, offset: 0 }
    }

    /// Discard collected samples.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Bytes the DMA has delivered so far.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total region size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Pointer to the next unwritten byte, for DMA submission.
    pub(crate) fn tail_ptr(&mut self) -> *mut u8 {
        // SAFETY: offset <= len is a struct invariant.
        unsafe { self.region.base_ptr().add(self.offset) }
    }

    /// Record `bytes` more delivered bytes (the DMA's transferred count).
    pub(crate) fn advance(&mut self, bytes: usize) {
        self.offset = (self.offset + bytes).min(self.region.len());
    }

    /// Flush the delivered range ahead of host reads.
    pub fn before_read(&self) {
        self.region.flush(0, self.offset);
    }

    fn slot(&self, index: usize) -> (u32, u16) {
        let mut raw = [0u8; SAMPLE_SIZE_BYTES];
        self.region.read(index * SAMPLE_SIZE_BYTES, &mut raw);
        let pc = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let flags = u16::from_le_bytes([raw[4], raw[5]]);
        (pc, flags)
    }

    /// Byte offset of the oldest valid sample: the slot after the first
    /// program-counter descent, or the region start when the buffer never
    /// wrapped.
    #[must_use]
    pub fn valid_start(&self) -> usize {
        let slots = self.offset / SAMPLE_SIZE_BYTES;
        for i in 0..slots.saturating_sub(1) {
            let (prev, _) = self.slot(i);
            let (next, _) = self.slot(i + 1);
            if next < prev {
                return (i + 1) * SAMPLE_SIZE_BYTES;
            }
        }
        0
    }

    /// Iterate the valid samples, oldest first.
    ///
    /// Yields only slots whose PC is populated and whose derived
    /// instruction offset falls inside the current program.
    #[must_use]
    pub fn samples<'a>(
        &'a self,
        program: &'a InstructionBuffer,
        layout: &'a InstructionLayout,
    ) -> Samples<'a> {
        self.before_read();
        Samples {
            buffer: self,
            program,
            layout,
            at: self.valid_start() / SAMPLE_SIZE_BYTES,
        }
    }

    /// Aggregate the valid samples into per-header / per-opcode /
    /// per-flags counts.
    pub fn collect_analysis(
        &self,
        program: &InstructionBuffer,
        layout: &InstructionLayout,
    ) -> Result<SampleAnalysis> {
        let mut analysis = SampleAnalysis::allocate()?;
        analysis.collected_samples = self.offset / SAMPLE_SIZE_BYTES;

        for sample in self.samples(program, layout) {
            analysis.valid_samples += 1;

            let mut header = [0u8];
            program
                .region()
                .read(sample.instruction_offset + layout.instruction_size_bytes - 1, &mut header);
            let header = header[0];

            analysis.header_counts[usize::from(header)] += 1;
            analysis.opcode_counts[usize::from(header >> 4)] += 1;

            let flags = usize::from(sample.flags);
            match Opcode::from_nibble(header >> 4) {
                Some(Opcode::MatMul) => analysis.matmul_flags_counts[flags] += 1,
                Some(Opcode::DataMove) => analysis.data_move_flags_counts[flags] += 1,
                Some(Opcode::LoadWeight) => analysis.load_weight_flags_counts[flags] += 1,
                Some(Opcode::Simd) => analysis.simd_flags_counts[flags] += 1,
                Some(Opcode::NoOp) => analysis.noop_flags_counts[flags] += 1,
                _ => {}
            }
        }

        Ok(analysis)
    }

    /// Write the per-sample listing: `[pc - shift] opcode: flags`.
    pub fn print_listing<W: fmt::Write>(
        &self,
        program: &InstructionBuffer,
        layout: &InstructionLayout,
        w: &mut W,
        program_counter_shift: u32,
    ) -> fmt::Result {
        for sample in self.samples(program, layout) {
            let mut header = [0u8];
            program
                .region()
                .read(sample.instruction_offset + layout.instruction_size_bytes - 1, &mut header);
            let opcode = Opcode::from_nibble(header[0] >> 4);
            let mnemonic = opcode.map_or("???", Opcode::mnemonic);

            write!(
                w,
                "[{:08}] {}: ",
                sample.program_counter.wrapping_sub(program_counter_shift),
                mnemonic
            )?;
            write_stage_flags(w, sample.flags)?;
            writeln!(w)?;
        }
        Ok(())
    }

    /// Persist the valid byte range — from the recovered start through the
    /// last yielded sample — verbatim.
    pub fn write_to_file<F: FileSystem>(
        &self,
        program: &InstructionBuffer,
        layout: &InstructionLayout,
        fs: &mut F,
        path: &str,
    ) -> Result<()> {
        self.before_read();
        let start = self.valid_start();
        // The range ends after the last slot that would be yielded.
        let mut end = start;
        let slots = self.offset / SAMPLE_SIZE_BYTES;
        for i in (start / SAMPLE_SIZE_BYTES)..slots {
            let (pc, _) = self.slot(i);
            if pc != INVALID_PROGRAM_COUNTER {
                let instruction_offset = pc as usize * layout.instruction_size_bytes;
                if instruction_offset < program.offset() {
                    end = (i + 1) * SAMPLE_SIZE_BYTES;
                }
            }
        }

        let mut data = Vec::new();
        data.try_reserve_exact(end - start)
            .map_err(|_| driver_error!(OutOfHeapMemory, "Out of heap memory"))?;
        data.resize(end - start, 0);
        self.region.read(start, &mut data);
        fs.write_all(path, &data)
            .map_err(|e| Error::file_system(e, path))
    }
}

/// Iterator over the valid samples of a [`SampleBuffer`].
pub struct Samples<'a> {
    buffer: &'a SampleBuffer,
    program: &'a InstructionBuffer,
    layout: &'a InstructionLayout,
    at: usize,
}

impl Iterator for Samples<'_> {
    type Item = SampleRecord;

    fn next(&mut self) -> Option<SampleRecord> {
        let slots = self.buffer.offset / SAMPLE_SIZE_BYTES;
        while self.at < slots {
            let (pc, flags) = self.buffer.slot(self.at);
            self.at += 1;

            if pc == INVALID_PROGRAM_COUNTER {
                continue;
            }
            let instruction_offset = pc as usize * self.layout.instruction_size_bytes;
            if instruction_offset >= self.program.offset() {
                continue;
            }
            return Some(SampleRecord {
                program_counter: pc,
                flags,
                instruction_offset,
            });
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Aggregated sample counts.
#[derive(Debug)]
pub struct SampleAnalysis {
    /// Slots the DMA delivered, valid or not.
    pub collected_samples: usize,
    /// Samples that survived wrap recovery and program-bounds checks.
    pub valid_samples: usize,

    header_counts: Vec<u32>,
    opcode_counts: Vec<u32>,
    matmul_flags_counts: Vec<u32>,
    data_move_flags_counts: Vec<u32>,
    load_weight_flags_counts: Vec<u32>,
    simd_flags_counts: Vec<u32>,
    noop_flags_counts: Vec<u32>,
}

fn counts_vec(len: usize) -> Result<Vec<u32>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| driver_error!(OutOfHeapMemory, "Out of heap memory"))?;
    v.resize(len, 0);
    Ok(v)
}

impl SampleAnalysis {
    fn allocate() -> Result<SampleAnalysis> {
        Ok(SampleAnalysis {
            collected_samples: 0,
            valid_samples: 0,
            header_counts: counts_vec(HEADER_COUNTS)?,
            opcode_counts: counts_vec(OPCODE_COUNTS)?,
            matmul_flags_counts: counts_vec(FLAGS_COUNTS)?,
            data_move_flags_counts: counts_vec(FLAGS_COUNTS)?,
            load_weight_flags_counts: counts_vec(FLAGS_COUNTS)?,
            simd_flags_counts: counts_vec(FLAGS_COUNTS)?,
            noop_flags_counts: counts_vec(FLAGS_COUNTS)?,
        })
    }

    /// Samples observed executing `opcode`.
    #[must_use]
    pub fn opcode_count(&self, opcode: Opcode) -> u32 {
        self.opcode_counts[usize::from(opcode.as_nibble())]
    }

    /// Samples observed at an exact header byte.
    #[must_use]
    pub fn header_count(&self, header: u8) -> u32 {
        self.header_counts[usize::from(header)]
    }

    /// Samples observed executing a DataMove in the given direction.
    #[must_use]
    pub fn data_move_count(&self, flags: DataMoveFlags) -> u32 {
        self.header_count(Opcode::DataMove.as_nibble() << 4 | flags.as_nibble())
    }

    /// Per-pipeline-flags counts for one of the counted opcodes, or `None`
    /// for opcodes without a flags table.
    #[must_use]
    pub fn flags_counts(&self, opcode: Opcode) -> Option<&[u32]> {
        match opcode {
            Opcode::MatMul => Some(&self.matmul_flags_counts),
            Opcode::DataMove => Some(&self.data_move_flags_counts),
            Opcode::LoadWeight => Some(&self.load_weight_flags_counts),
            Opcode::Simd => Some(&self.simd_flags_counts),
            Opcode::NoOp => Some(&self.noop_flags_counts),
            Opcode::Config => None,
        }
    }

    /// Write the opcode totals and the DataMove direction breakdown.
    pub fn print_summary<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        writeln!(w, "Collected {} samples", self.collected_samples)?;
        writeln!(w, "Found {} valid samples", self.valid_samples)?;

        writeln!(w, "Samples per opcode ---------------------------------------")?;
        writeln!(w, "NoOp:       {}", self.opcode_count(Opcode::NoOp))?;
        writeln!(w, "MatMul:     {}", self.opcode_count(Opcode::MatMul))?;
        writeln!(w, "DataMove:   {}", self.opcode_count(Opcode::DataMove))?;
        writeln!(w, "LoadWeight: {}", self.opcode_count(Opcode::LoadWeight))?;
        writeln!(w, "SIMD:       {}", self.opcode_count(Opcode::Simd))?;

        writeln!(w, "Samples per DataMove flag ---------------------------------------")?;
        writeln!(
            w,
            "DRAM0->Local:            {}",
            self.data_move_count(DataMoveFlags::Dram0ToLocal)
        )?;
        writeln!(
            w,
            "Local->DRAM0:            {}",
            self.data_move_count(DataMoveFlags::LocalToDram0)
        )?;
        writeln!(
            w,
            "DRAM1->Local:            {}",
            self.data_move_count(DataMoveFlags::Dram1ToLocal)
        )?;
        writeln!(
            w,
            "Local->DRAM1:            {}",
            self.data_move_count(DataMoveFlags::LocalToDram1)
        )?;
        writeln!(
            w,
            "Accumulator->Local:      {}",
            self.data_move_count(DataMoveFlags::AccumulatorToLocal)
        )?;
        writeln!(
            w,
            "Local->Accumulator:      {}",
            self.data_move_count(DataMoveFlags::LocalToAccumulator)
        )?;
        writeln!(
            w,
            "Local->Accumulator(Acc): {}",
            self.data_move_count(DataMoveFlags::LocalToAccumulatorAccumulate)
        )?;
        Ok(())
    }

    /// Write the nonzero per-flags counts for every counted opcode.
    pub fn print_aggregates<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        for opcode in [
            Opcode::MatMul,
            Opcode::DataMove,
            Opcode::LoadWeight,
            Opcode::Simd,
            Opcode::NoOp,
        ] {
            writeln!(
                w,
                "{} flags ---------------------------------------",
                opcode.mnemonic()
            )?;
            writeln!(
                w,
                "Array=VR, Acc=VR, Dataflow=VR, DRAM1=VR, DRAM0=VR, MemPortB=VR, MemPortA=VR, Instruction=VR"
            )?;
            if let Some(counts) = self.flags_counts(opcode) {
                for (flags, &count) in counts.iter().enumerate() {
                    if count != 0 {
                        #[allow(clippy::cast_possible_truncation)] // flags < 2^16
                        write_stage_flags(w, flags as u16)?;
                        writeln!(w, ": {count}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Write a 16-bit stage tag as labelled valid/ready bit pairs.
fn write_stage_flags<W: fmt::Write>(w: &mut W, flags: u16) -> fmt::Result {
    const LABELS: [(usize, &str); 8] = [
        (0, "Array="),
        (2, ", Acc="),
        (4, ", Dataflow="),
        (6, ", DRAM1="),
        (8, ", DRAM0="),
        (10, ", MemPortB="),
        (12, ", MemPortA="),
        (14, ", Instruction="),
    ];

    let mut remaining = flags;
    for k in 0..16 {
        for (at, label) in LABELS {
            if at == k {
                w.write_str(label)?;
            }
        }
        w.write_str(if remaining & 1 != 0 { "1" } else { "0" })?;
        remaining >>= 1;
    }
    Ok(())
}
