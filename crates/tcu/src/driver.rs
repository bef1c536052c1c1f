//! Driver core: init, program assembly, run-to-completion, model loading,
//! and DRAM vector I/O.
//!
//! # Completion probe
//!
//! The accelerator has no host-visible done signal beyond DMA idleness,
//! and instruction-DMA idleness only means *ingest* finished — the
//! pipeline may still be executing. Completion is synthesized with a
//! memory probe instead: two sentinel vector slots are reserved at the
//! top of DRAM0 (`probe_source = dram0_depth - 1`, `probe_target =
//! dram0_depth - 2`). Every program ends with a `DRAM0 → Local` copy of
//! the source into the last Local slot followed by a `Local → DRAM0` copy
//! into the target. Before each run the host writes 0x00 over the source
//! and 0xFF over the target, then polls (flushing each round) until the
//! two slots compare equal. The probe moves are the last instructions in
//! the program and the accelerator executes in order, so equality implies
//! the whole pipeline has drained.

use core::fmt;

use alloc::vec::Vec;

use platform::{DmaRegion, FileSystem, Flash, InstructionDma, MemoryMap, SampleDma};
use rand::RngCore;

use crate::architecture::{Architecture, DataType};
use crate::buffer::InstructionBuffer;
use crate::dram;
use crate::error::{driver_error, Error, Result};
use crate::instruction::{
    dram_offset_register_value, ConfigRegister, DataMoveFlags, InstructionLayout, Opcode,
};
use crate::model::Model;
use crate::sample::{SampleAnalysis, SampleBuffer, SAMPLE_INTERVAL_CYCLES, SAMPLE_SIZE_BYTES};
use crate::tcu::Tcu;

/// The two DRAM banks visible to host and accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DramBank {
    /// Activations, inputs, outputs.
    Dram0,
    /// Weights and constants.
    Dram1,
}

/// Value loaded into the decoder program counter by the sampling
/// preamble, so sample PCs line up with buffer offsets. The config
/// instruction itself does not advance the decoder PC.
pub const PROGRAM_COUNTER_SHIFT: u32 = 1;

const MAX_PRINT_OUTPUT_VECTORS: usize = 16;

/// DRAM-offset register granularity: bank bases must sit on this boundary.
const DRAM_BANK_ALIGN: usize = 1 << 16;

/// Init-time driver configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverOptions {
    /// Decoder per-instruction timeout in cycles, when the platform
    /// defines one.
    pub decoder_timeout: Option<u16>,
}

/// The TCU host driver.
///
/// Owns the instruction buffer, both DRAM banks, the optional sample
/// buffer, and the DMA attachment, exclusively and for its whole life.
#[derive(Debug)]
pub struct Driver<Tx: InstructionDma, Rx: SampleDma> {
    arch: Architecture,
    data_type: DataType,
    layout: InstructionLayout,
    decoder_timeout: Option<u16>,

    dram0: DmaRegion,
    dram1: DmaRegion,

    tcu: Tcu<Tx, Rx>,
    buffer: InstructionBuffer,
    sample_buffer: Option<SampleBuffer>,
}

impl<Tx: InstructionDma, Rx: SampleDma> Driver<Tx, Rx> {
    /// Initialize the driver: validate the architecture, derive the
    /// instruction layout, carve the platform regions, bring up the DMA
    /// channels, and run the accelerator configuration program.
    pub fn new(
        arch: Architecture,
        memory: MemoryMap,
        mut tcu: Tcu<Tx, Rx>,
        options: DriverOptions,
    ) -> Result<Self> {
        if !arch.is_valid() {
            return Err(driver_error!(
                InvalidArch,
                "Invalid architecture in platform configuration"
            ));
        }
        let Some(data_type) = arch.data_type else {
            return Err(driver_error!(
                InvalidArch,
                "Invalid architecture in platform configuration"
            ));
        };

        let layout = InstructionLayout::new(&arch);

        let vector_size_bytes = arch.array_size * data_type.size_bytes();
        let dram0_size = arch.dram0_depth * vector_size_bytes;
        let dram1_size = arch.dram1_depth * vector_size_bytes;
        if dram0_size + dram1_size > memory.dram.len() {
            return Err(driver_error!(InsufficientBuffer, "Insufficient DRAM buffers"));
        }
        let Some((dram0, rest)) = memory.dram.split_at(dram0_size) else {
            return Err(driver_error!(InsufficientBuffer, "Insufficient DRAM buffers"));
        };
        let Some((dram1, _)) = rest.split_at(dram1_size) else {
            return Err(driver_error!(InsufficientBuffer, "Insufficient DRAM buffers"));
        };

        // The DRAM offset registers address at 64 KB granularity; a
        // misaligned bank base would silently truncate.
        if dram0.base_addr() % DRAM_BANK_ALIGN != 0 || dram1.base_addr() % DRAM_BANK_ALIGN != 0 {
            return Err(driver_error!(
                InvalidPlatform,
                "DRAM banks must be 64 KB aligned at {:#x}/{:#x}",
                dram0.base_addr(),
                dram1.base_addr()
            ));
        }

        let sample_buffer = if tcu.has_sampling() {
            let Some(region) = memory.sample else {
                return Err(driver_error!(
                    InvalidPlatform,
                    "Target must provide a sample buffer region"
                ));
            };
            let block_size = tcu.sample_block_size().unwrap_or(0);
            if block_size * SAMPLE_SIZE_BYTES > region.len() {
                return Err(driver_error!(InsufficientBuffer, "Insufficient sample buffer"));
            }
            Some(SampleBuffer::new(region))
        } else {
            None
        };

        tcu.init()?;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "TCU driver up: {} byte instructions, DRAM0 {} B, DRAM1 {} B",
            layout.instruction_size_bytes,
            dram0_size,
            dram1_size
        );

        let mut driver = Self {
            arch,
            data_type,
            layout,
            decoder_timeout: options.decoder_timeout,
            dram0,
            dram1,
            tcu,
            buffer: InstructionBuffer::new(memory.prog),
            sample_buffer,
        };
        driver.run_config()?;
        Ok(driver)
    }

    // -- accessors ---------------------------------------------------------

    /// The architecture the driver was initialized with.
    #[must_use]
    pub fn arch(&self) -> &Architecture {
        &self.arch
    }

    /// The derived instruction layout.
    #[must_use]
    pub fn layout(&self) -> &InstructionLayout {
        &self.layout
    }

    /// The staged-program buffer.
    #[must_use]
    pub fn buffer(&self) -> &InstructionBuffer {
        &self.buffer
    }

    /// The sample buffer, when sampling is configured.
    #[must_use]
    pub fn sample_buffer(&self) -> Option<&SampleBuffer> {
        self.sample_buffer.as_ref()
    }

    /// A DRAM bank's region.
    #[must_use]
    pub fn dram_bank(&self, bank: DramBank) -> &DmaRegion {
        match bank {
            DramBank::Dram0 => &self.dram0,
            DramBank::Dram1 => &self.dram1,
        }
    }

    fn dram_bank_mut(&mut self, bank: DramBank) -> &mut DmaRegion {
        match bank {
            DramBank::Dram0 => &mut self.dram0,
            DramBank::Dram1 => &mut self.dram1,
        }
    }

    // -- program assembly --------------------------------------------------

    /// Begin a fresh program: reset the buffer and, when sampling, load
    /// the decoder program counter so sample PCs line up with buffer
    /// offsets.
    pub fn setup_buffer_preamble(&mut self) -> Result<()> {
        self.buffer.reset();
        if self.sample_buffer.is_some() {
            self.buffer.append_config(
                &self.layout,
                ConfigRegister::ProgramCounter,
                u64::from(PROGRAM_COUNTER_SHIFT),
            )?;
        }
        Ok(())
    }

    /// Finish a program: append the completion probe and pad to the DMA
    /// bus width.
    pub fn setup_buffer_postamble(&mut self) -> Result<()> {
        self.append_flush_instructions()?;
        let width = self.tcu.instructions_data_width_bytes();
        self.buffer.pad_to_alignment(&self.layout, width)
    }

    /// Append one instruction to the staged program.
    pub fn append_instruction(
        &mut self,
        opcode: Opcode,
        flags: u8,
        operand0: u64,
        operand1: u64,
        operand2: u64,
    ) -> Result<()> {
        self.buffer
            .append_instruction(&self.layout, opcode, flags, operand0, operand1, operand2)
    }

    fn append_flush_instructions(&mut self) -> Result<()> {
        let probe_source_offset = self.arch.dram0_depth - 1;
        let probe_target_offset = self.arch.dram0_depth - 2;
        let local_offset = self.arch.local_depth - 1;

        self.append_instruction(
            Opcode::DataMove,
            DataMoveFlags::Dram0ToLocal.as_nibble(),
            local_offset as u64,
            probe_source_offset as u64,
            0,
        )?;
        self.append_instruction(
            Opcode::DataMove,
            DataMoveFlags::LocalToDram0.as_nibble(),
            local_offset as u64,
            probe_target_offset as u64,
            0,
        )
    }

    // -- completion probe --------------------------------------------------

    fn fill_dram_vectors_with_bytes(
        &mut self,
        bank: DramBank,
        offset_vectors: usize,
        byte: u8,
        count_vectors: usize,
    ) {
        let array_size = self.arch.array_size;
        let ty = self.data_type;
        let region = self.dram_bank_mut(bank);
        dram::fill_bytes(
            region,
            ty,
            offset_vectors * array_size,
            byte,
            count_vectors * array_size,
        );
    }

    fn reset_flush_probe(&mut self) {
        let probe_source_offset = self.arch.dram0_depth - 1;
        let probe_target_offset = self.arch.dram0_depth - 2;

        self.fill_dram_vectors_with_bytes(DramBank::Dram0, probe_source_offset, 0x00, 1);
        self.fill_dram_vectors_with_bytes(DramBank::Dram0, probe_target_offset, 0xFF, 1);
    }

    fn wait_for_flush(&self) {
        let probe_source_offset = self.arch.dram0_depth - 1;
        let probe_target_offset = self.arch.dram0_depth - 2;
        let array_size = self.arch.array_size;

        while dram::compare_bytes(
            &self.dram0,
            &self.dram0,
            self.data_type,
            probe_source_offset * array_size,
            probe_target_offset * array_size,
            array_size,
        ) != core::cmp::Ordering::Equal
        {}
    }

    // -- run ---------------------------------------------------------------

    /// Run the staged program to completion: reset the probe, stream the
    /// buffer (collecting samples concurrently when configured), then
    /// poll the probe until the pipeline has drained.
    pub fn run(&mut self) -> Result<()> {
        self.reset_flush_probe();

        if self.sample_buffer.is_some() {
            self.run_buffer_with_sampling()?;
        } else {
            self.run_buffer()?;
        }

        self.wait_for_flush();

        #[cfg(feature = "defmt")]
        defmt::debug!("TCU run complete, {} program bytes", self.buffer.offset());

        Ok(())
    }

    fn run_buffer(&mut self) -> Result<()> {
        let mut run_offset = 0;
        while run_offset != self.buffer.offset() {
            self.tcu.start_instructions(&self.buffer, &mut run_offset)?;
            while self.tcu.is_instructions_busy() {}
        }
        Ok(())
    }

    /// Interleaved transmit/receive: instruction submission drives
    /// progress, sample collection is best-effort concurrent. Sampling is
    /// completed on every idle transition so no delivered block is
    /// dropped.
    fn run_buffer_with_sampling(&mut self) -> Result<()> {
        let Some(sample_buffer) = self.sample_buffer.as_mut() else {
            return Err(driver_error!(InvalidPlatform, "No sample DMA channel"));
        };
        sample_buffer.reset();

        let mut run_offset = 0;
        let mut instructions_busy = false;
        let mut sample_busy = false;

        while run_offset != self.buffer.offset() {
            if !instructions_busy {
                self.tcu.start_instructions(&self.buffer, &mut run_offset)?;
            }
            if !sample_busy {
                self.tcu.start_sampling(sample_buffer)?;
            }

            loop {
                sample_busy = self.tcu.is_sample_busy();
                instructions_busy = self.tcu.is_instructions_busy();
                if !(sample_busy && instructions_busy) {
                    break;
                }
            }

            if !sample_busy {
                self.tcu.complete_sampling(sample_buffer);
            }
        }

        while self.tcu.is_instructions_busy() {
            if !sample_busy {
                self.tcu.start_sampling(sample_buffer)?;
            }
            sample_busy = self.tcu.is_sample_busy();
            if !sample_busy {
                self.tcu.complete_sampling(sample_buffer);
            }
        }

        if sample_busy {
            while self.tcu.is_sample_busy() {}
            self.tcu.complete_sampling(sample_buffer);
        }

        Ok(())
    }

    // -- sample reporting --------------------------------------------------

    /// Aggregate the collected samples against the staged program.
    pub fn sample_analysis(&self) -> Result<SampleAnalysis> {
        let sample_buffer = self
            .sample_buffer
            .as_ref()
            .ok_or_else(|| driver_error!(InvalidPlatform, "No sample DMA channel"))?;
        sample_buffer.collect_analysis(&self.buffer, &self.layout)
    }

    /// Write the per-sample listing for the last run.
    pub fn print_sample_listing<W: fmt::Write>(&self, w: &mut W) -> Result<()> {
        let sample_buffer = self
            .sample_buffer
            .as_ref()
            .ok_or_else(|| driver_error!(InvalidPlatform, "No sample DMA channel"))?;
        sample_buffer.print_listing(&self.buffer, &self.layout, w, PROGRAM_COUNTER_SHIFT)?;
        Ok(())
    }

    /// Persist the collected samples verbatim.
    pub fn save_samples<F: FileSystem>(&self, fs: &mut F, path: &str) -> Result<()> {
        let sample_buffer = self
            .sample_buffer
            .as_ref()
            .ok_or_else(|| driver_error!(InvalidPlatform, "No sample DMA channel"))?;
        sample_buffer.write_to_file(&self.buffer, &self.layout, fs, path)
    }

    // -- configuration program ---------------------------------------------

    fn run_config(&mut self) -> Result<()> {
        self.setup_buffer_preamble()?;

        self.buffer.append_config(
            &self.layout,
            ConfigRegister::Dram0Offset,
            dram_offset_register_value(self.dram0.base_addr()),
        )?;
        self.buffer.append_config(
            &self.layout,
            ConfigRegister::Dram1Offset,
            dram_offset_register_value(self.dram1.base_addr()),
        )?;

        if let Some(timeout) = self.decoder_timeout {
            self.buffer
                .append_config(&self.layout, ConfigRegister::Timeout, u64::from(timeout))?;
        }

        if self.sample_buffer.is_some() {
            self.buffer.append_config(
                &self.layout,
                ConfigRegister::SampleInterval,
                SAMPLE_INTERVAL_CYCLES,
            )?;
        }

        self.setup_buffer_postamble()?;
        self.run()
    }

    // -- model loading -----------------------------------------------------

    /// Stage a model: check compatibility, stream constants into DRAM1
    /// (optionally staging them into Local), and load the program under
    /// preamble/postamble framing.
    pub fn load_model<F: FileSystem>(&mut self, fs: &mut F, model: &Model) -> Result<()> {
        if !self.arch.is_compatible(&model.arch) {
            return Err(driver_error!(IncompatibleModel, "Incompatible model"));
        }

        for entry in &model.consts {
            let path = model.resolve_path(&entry.file_name)?;
            self.load_dram_vectors_from_file(fs, DramBank::Dram1, entry.base, entry.size, &path)?;

            if model.load_consts_to_local {
                self.run_load_consts(entry.base, entry.size)?;
            }
        }

        let path = model.resolve_path(&model.prog.file_name)?;
        self.load_program_from_file(fs, model.prog.size, &path)
    }

    /// Load a pre-compiled program file under preamble/postamble framing.
    pub fn load_program_from_file<F: FileSystem>(
        &mut self,
        fs: &mut F,
        size: usize,
        path: &str,
    ) -> Result<()> {
        self.setup_buffer_preamble()?;
        self.buffer.append_program_from_file(size, fs, path)?;
        self.setup_buffer_postamble()
    }

    /// Stream a file of raw vectors into a DRAM bank.
    pub fn load_dram_vectors_from_file<F: FileSystem>(
        &mut self,
        fs: &mut F,
        bank: DramBank,
        offset_vectors: usize,
        size_vectors: usize,
        path: &str,
    ) -> Result<()> {
        let array_size = self.arch.array_size;
        let scalar_size = self.data_type.size_bytes();
        if (offset_vectors + size_vectors) * scalar_size * array_size > self.dram_bank(bank).len() {
            return Err(driver_error!(
                InsufficientBuffer,
                "Consts data too big in {}",
                path
            ));
        }

        let ty = self.data_type;
        dram::write_scalars_from_file(
            self.dram_bank_mut(bank),
            ty,
            offset_vectors * array_size,
            size_vectors * array_size,
            fs,
            path,
        )
    }

    /// Stream raw vectors from flash into a DRAM bank.
    pub fn load_dram_vectors_from_flash<D: Flash>(
        &mut self,
        flash: &mut D,
        bank: DramBank,
        offset_vectors: usize,
        size_vectors: usize,
        flash_offset: usize,
    ) -> Result<()> {
        let array_size = self.arch.array_size;
        let scalar_size = self.data_type.size_bytes();
        let base = offset_vectors * array_size * scalar_size;
        let size = size_vectors * array_size * scalar_size;

        let region = self.dram_bank_mut(bank);
        let Some(slice) = region.as_mut_slice().get_mut(base..base + size) else {
            return Err(driver_error!(InsufficientBuffer, "Consts data too big"));
        };
        flash.read(flash_offset, slice).map_err(Error::vendor)?;
        region.flush(base, size);
        Ok(())
    }

    /// Emit and run a one-instruction program staging a DRAM1 region into
    /// Local memory.
    fn run_load_consts(&mut self, offset_vectors: usize, size_vectors: usize) -> Result<()> {
        self.setup_buffer_preamble()?;
        self.append_instruction(
            Opcode::DataMove,
            DataMoveFlags::Dram1ToLocal.as_nibble(),
            offset_vectors as u64,
            offset_vectors as u64,
            (size_vectors - 1) as u64,
        )?;
        self.setup_buffer_postamble()?;
        self.run()
    }

    // -- model input/output ------------------------------------------------

    /// Stream an input binding's data file into DRAM0.
    pub fn load_model_input_from_file<F: FileSystem>(
        &mut self,
        fs: &mut F,
        model: &Model,
        input_name: &str,
        path: &str,
    ) -> Result<()> {
        let Some(input) = model.input(input_name) else {
            return Err(driver_error!(
                UnexpectedInputName,
                "Unexpected input name {}",
                input_name
            ));
        };
        let (base, size) = (input.base, input.size);
        self.load_dram_vectors_from_file(fs, DramBank::Dram0, base, size, path)
    }

    /// Write host scalars into an input binding, zero-padding the
    /// remainder of the binding's vectors.
    pub fn load_model_input_scalars(
        &mut self,
        model: &Model,
        input_name: &str,
        values: &[f32],
    ) -> Result<()> {
        let Some(input) = model.input(input_name) else {
            return Err(driver_error!(
                UnexpectedInputName,
                "Unexpected input name {}",
                input_name
            ));
        };
        let (base, size) = (input.base, input.size);

        let mut staging = alloc_f32(size * self.arch.array_size)?;
        for (slot, value) in staging.iter_mut().zip(values) {
            *slot = *value;
        }
        self.write_dram_vectors(DramBank::Dram0, base, 0, size, &staging)
    }

    /// Write host scalars into a single vector of an input binding,
    /// zero-padding past `values`.
    pub fn load_model_input_vector_scalars(
        &mut self,
        model: &Model,
        input_name: &str,
        vector_offset: usize,
        values: &[f32],
    ) -> Result<()> {
        let Some(input) = model.input(input_name) else {
            return Err(driver_error!(
                UnexpectedInputName,
                "Unexpected input name {}",
                input_name
            ));
        };
        let base = input.base;

        let mut staging = alloc_f32(self.arch.array_size)?;
        for (slot, value) in staging.iter_mut().zip(values) {
            *slot = *value;
        }
        self.write_dram_vectors(DramBank::Dram0, base + vector_offset, 0, 1, &staging)
    }

    /// Read an output binding back into host scalars (up to `out.len()`).
    pub fn get_model_output_scalars(
        &self,
        model: &Model,
        output_name: &str,
        out: &mut [f32],
    ) -> Result<()> {
        let Some(output) = model.output(output_name) else {
            return Err(driver_error!(
                UnexpectedOutputName,
                "Unexpected output name {}",
                output_name
            ));
        };

        let output_scalars = output.size * self.arch.array_size;
        let mut staging = alloc_f32(output_scalars)?;
        self.read_dram_vectors(DramBank::Dram0, output.base, 0, output.size, &mut staging)?;

        for (slot, value) in out.iter_mut().zip(&staging) {
            *slot = *value;
        }
        Ok(())
    }

    /// Print up to 16 vectors of an output binding.
    pub fn print_model_output_vectors<W: fmt::Write>(
        &self,
        model: &Model,
        output_name: &str,
        w: &mut W,
    ) -> Result<()> {
        let Some(output) = model.output(output_name) else {
            return Err(driver_error!(
                UnexpectedOutputName,
                "Unexpected output name {}",
                output_name
            ));
        };

        let mut vector = alloc_f32(self.arch.array_size)?;
        let count = output.size.min(MAX_PRINT_OUTPUT_VECTORS);
        for j in 0..count {
            self.read_dram_vectors(DramBank::Dram0, output.base + j, 0, 1, &mut vector)?;

            write!(w, "{output_name}[{j:04}]=")?;
            for value in &vector {
                write!(w, "{value:9.4} ")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    // -- DRAM vector I/O ---------------------------------------------------

    fn check_vector_bounds(
        &self,
        bank: DramBank,
        offset_vectors: usize,
        stride_log2: usize,
        count_vectors: usize,
        message: &str,
    ) -> Result<()> {
        let span = offset_vectors + count_vectors * (1 << stride_log2);
        if span * self.data_type.size_bytes() * self.arch.array_size > self.dram_bank(bank).len() {
            return Err(Error::driver(
                crate::error::DriverError::InsufficientBuffer,
                format_args!("{message}"),
            ));
        }
        Ok(())
    }

    /// Write `count_vectors` vectors at stride `2^stride_log2`.
    ///
    /// `values` must carry `count_vectors * array_size` scalars.
    pub fn write_dram_vectors(
        &mut self,
        bank: DramBank,
        offset_vectors: usize,
        stride_log2: usize,
        count_vectors: usize,
        values: &[f32],
    ) -> Result<()> {
        self.check_vector_bounds(
            bank,
            offset_vectors,
            stride_log2,
            count_vectors,
            "Written data too big",
        )?;
        let array_size = self.arch.array_size;
        if values.len() < count_vectors * array_size {
            return Err(driver_error!(InsufficientBuffer, "Written data too big"));
        }

        let ty = self.data_type;
        let region = self.dram_bank_mut(bank);
        if stride_log2 == 0 {
            dram::write_scalars(
                region,
                ty,
                offset_vectors * array_size,
                values.get(..count_vectors * array_size).unwrap_or(values),
            );
        } else {
            for i in 0..count_vectors {
                let Some(vector) = values.get(i * array_size..(i + 1) * array_size) else {
                    break;
                };
                dram::write_scalars(
                    region,
                    ty,
                    (offset_vectors + i * (1 << stride_log2)) * array_size,
                    vector,
                );
            }
        }
        Ok(())
    }

    /// Read `count_vectors` vectors at stride `2^stride_log2`.
    ///
    /// `out` must have room for `count_vectors * array_size` scalars.
    pub fn read_dram_vectors(
        &self,
        bank: DramBank,
        offset_vectors: usize,
        stride_log2: usize,
        count_vectors: usize,
        out: &mut [f32],
    ) -> Result<()> {
        self.check_vector_bounds(
            bank,
            offset_vectors,
            stride_log2,
            count_vectors,
            "Read data too big",
        )?;
        let array_size = self.arch.array_size;
        if out.len() < count_vectors * array_size {
            return Err(driver_error!(InsufficientBuffer, "Read data too big"));
        }

        let region = self.dram_bank(bank);
        if stride_log2 == 0 {
            if let Some(out) = out.get_mut(..count_vectors * array_size) {
                dram::read_scalars(region, self.data_type, offset_vectors * array_size, out);
            }
        } else {
            for i in 0..count_vectors {
                let Some(vector) = out.get_mut(i * array_size..(i + 1) * array_size) else {
                    break;
                };
                dram::read_scalars(
                    region,
                    self.data_type,
                    (offset_vectors + i * (1 << stride_log2)) * array_size,
                    vector,
                );
            }
        }
        Ok(())
    }

    /// Fill `count_vectors` vectors with random bytes at stride
    /// `2^stride_log2` (self-test support).
    pub fn fill_dram_vectors_random<R: RngCore>(
        &mut self,
        bank: DramBank,
        offset_vectors: usize,
        stride_log2: usize,
        count_vectors: usize,
        rng: &mut R,
    ) -> Result<()> {
        self.check_vector_bounds(
            bank,
            offset_vectors,
            stride_log2,
            count_vectors,
            "Written data too big",
        )?;

        let array_size = self.arch.array_size;
        let ty = self.data_type;
        let region = self.dram_bank_mut(bank);
        if stride_log2 == 0 {
            dram::fill_random(region, ty, offset_vectors * array_size, count_vectors * array_size, rng);
        } else {
            for i in 0..count_vectors {
                dram::fill_random(
                    region,
                    ty,
                    (offset_vectors + i * (1 << stride_log2)) * array_size,
                    array_size,
                    rng,
                );
            }
        }
        Ok(())
    }
}

fn alloc_f32(len: usize) -> Result<Vec<f32>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| driver_error!(OutOfHeapMemory, "Out of heap memory"))?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}
