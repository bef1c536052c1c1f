//! Host-side behavioral emulator of the Tensor Compute Unit.
//!
//! Stands where the bus-mastering hardware stands so the driver can be
//! exercised end-to-end on a desktop: it implements the platform DMA
//! channel traits, decodes submitted instruction chunks with the real
//! [`tcu::InstructionLayout`], applies DataMove semantics across
//! DRAM0/DRAM1/Local/Accumulator, latches Config registers, and emits
//! execution samples into the sample channel.
//!
//! # Fidelity notes
//!
//! - DataMove (all seven directions, with stride selectors and the
//!   accumulate variant) moves real bytes. MatMul, LoadWeight, and SIMD
//!   are decoded and advance the program counter but do not compute; the
//!   emulator validates transport, ordering, and memory movement, not
//!   arithmetic.
//! - Sampling is instruction-granular: one sample per executed
//!   instruction while a nonzero sample interval is configured, rather
//!   than one per `interval` hardware cycles. While the host polls an
//!   unfinished sample block, each busy poll emits one idle sample — the
//!   hardware analog of the TCU ticking while the decoder is drained —
//!   so blocks always complete.
//! - Out-of-range addresses in a malformed program are dropped silently,
//!   as bus writes to unmapped space would be.

#![warn(missing_docs)]
// Desktop test crate: constructor misuse is a programming error; panicking
// with a clear message beats threading Results through every test setup.
#![allow(clippy::panic)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use platform::{DmaRegion, InstructionDma, SampleDma};
use tcu::{Architecture, ConfigRegister, DataMoveFlags, InstructionLayout, Opcode};

const DEFAULT_MAX_TRANSFER_LEN: usize = 1 << 23;
const DEFAULT_DATA_WIDTH_BYTES: usize = 16;

/// Emulated accelerator attached to aliased driver memory.
pub struct TcuEmulator {
    state: Rc<RefCell<State>>,
}

#[derive(Debug)]
struct State {
    arch: Architecture,
    layout: InstructionLayout,

    dram0: DmaRegion,
    dram1: DmaRegion,
    local: Vec<u8>,
    accumulator: Vec<u8>,

    // Config registers.
    dram0_offset: u64,
    dram1_offset: u64,
    timeout: u64,
    sample_interval: u64,
    program_counter: u32,

    executed_instructions: usize,

    // Instruction channel.
    max_transfer_len: usize,
    data_width_bytes: usize,
    busy_polls: u32,
    tx_busy_remaining: u32,

    // Sample channel.
    pending_samples: VecDeque<[u8; 8]>,
    rx: Option<RxTransfer>,
    rx_last_transferred: usize,
}

#[derive(Debug)]
struct RxTransfer {
    ptr: *mut u8,
    len: usize,
    delivered: usize,
}

impl TcuEmulator {
    /// Attach an emulator to the combined DRAM region the driver will
    /// carve. The emulator performs the same depth-based split.
    ///
    /// `dram` must alias the region handed to the driver (see
    /// [`DmaRegion::alias`]); the aliasing is the point — this object
    /// plays the bus master.
    #[must_use]
    pub fn new(arch: &Architecture, dram: DmaRegion) -> Self {
        let layout = InstructionLayout::new(arch);
        let vector_bytes = arch.array_size
            * arch.data_type.map_or(2, tcu::DataType::size_bytes);

        let dram0_size = arch.dram0_depth * vector_bytes;
        let dram1_size = arch.dram1_depth * vector_bytes;
        let (dram0, rest) = dram
            .split_at(dram0_size)
            .unwrap_or_else(|| panic!("emulator DRAM region smaller than DRAM0"));
        let (dram1, _) = rest
            .split_at(dram1_size)
            .unwrap_or_else(|| panic!("emulator DRAM region smaller than DRAM0+DRAM1"));

        let state = State {
            arch: *arch,
            layout,
            dram0,
            dram1,
            local: vec![0; arch.local_depth * vector_bytes],
            accumulator: vec![0; arch.accumulator_depth * vector_bytes],
            dram0_offset: 0,
            dram1_offset: 0,
            timeout: 0,
            sample_interval: 0,
            program_counter: 0,
            executed_instructions: 0,
            max_transfer_len: DEFAULT_MAX_TRANSFER_LEN,
            data_width_bytes: DEFAULT_DATA_WIDTH_BYTES,
            busy_polls: 0,
            tx_busy_remaining: 0,
            pending_samples: VecDeque::new(),
            rx: None,
            rx_last_transferred: 0,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// The instruction (memory → device) channel.
    #[must_use]
    pub fn instruction_port(&self) -> InstructionPort {
        InstructionPort {
            state: Rc::clone(&self.state),
        }
    }

    /// The sample (device → memory) channel.
    #[must_use]
    pub fn sample_port(&self) -> SamplePort {
        SamplePort {
            state: Rc::clone(&self.state),
        }
    }

    /// Bound single transfers, to force the driver's chunking path.
    pub fn set_max_transfer_len(&self, len: usize) {
        self.state.borrow_mut().max_transfer_len = len;
    }

    /// Bus data width reported to the driver (programs pad to this).
    pub fn set_data_width_bytes(&self, width: usize) {
        self.state.borrow_mut().data_width_bytes = width;
    }

    /// Keep channels busy for `polls` queries after each start, so the
    /// driver's spin loops iterate.
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().busy_polls = polls;
    }

    /// Instructions executed since construction.
    #[must_use]
    pub fn executed_instructions(&self) -> usize {
        self.state.borrow().executed_instructions
    }

    /// Current value of a latched config register.
    #[must_use]
    pub fn config_register(&self, register: ConfigRegister) -> u64 {
        let state = self.state.borrow();
        match register {
            ConfigRegister::Dram0Offset => state.dram0_offset,
            ConfigRegister::Dram1Offset => state.dram1_offset,
            ConfigRegister::Timeout => state.timeout,
            ConfigRegister::SampleInterval => state.sample_interval,
            ConfigRegister::ProgramCounter => u64::from(state.program_counter),
        }
    }

    /// A copy of one Local memory vector, for white-box assertions.
    #[must_use]
    pub fn local_vector(&self, index: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let vector_bytes = state.vector_bytes();
        state
            .local
            .get(index * vector_bytes..(index + 1) * vector_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

impl State {
    fn vector_bytes(&self) -> usize {
        self.arch.array_size * self.arch.data_type.map_or(2, tcu::DataType::size_bytes)
    }

    fn execute_chunk(&mut self, bytes: &[u8]) {
        let size = self.layout.instruction_size_bytes;
        let mut at = 0;
        while at + size <= bytes.len() {
            if let Some(instruction) = self.layout.decode(&bytes[at..]) {
                self.execute(&instruction);
            }
            at += size;
        }
    }

    fn execute(&mut self, instruction: &tcu::DecodedInstruction) {
        self.executed_instructions += 1;

        match Opcode::from_nibble(instruction.opcode) {
            Some(Opcode::Config) => {
                // Config writes do not advance the PC and are not sampled.
                // The three operand fields concatenate back into the packed
                // (value << 4) | register block.
                let packed = shl(
                    instruction.operand2,
                    (self.layout.operand0_size_bytes + self.layout.operand1_size_bytes) * 8,
                ) | shl(instruction.operand1, self.layout.operand0_size_bytes * 8)
                    | instruction.operand0;
                self.write_config(packed & 0xF, packed >> 4);
            }
            Some(Opcode::DataMove) => {
                self.emit_sample(instruction.opcode);
                self.data_move(instruction);
                self.program_counter = self.program_counter.wrapping_add(1);
            }
            _ => {
                // MatMul / LoadWeight / SIMD / NoOp / unknown: PC advance only.
                self.emit_sample(instruction.opcode);
                self.program_counter = self.program_counter.wrapping_add(1);
            }
        }
    }

    fn write_config(&mut self, register: u64, value: u64) {
        tracing::trace!(register, value, "config register write");
        match register {
            0x0 => self.dram0_offset = value,
            0x4 => self.dram1_offset = value,
            0x8 => self.timeout = value,
            0xA => {
                #[allow(clippy::cast_possible_truncation)] // PC register is 32-bit
                {
                    self.program_counter = value as u32;
                }
                // A PC reload realigns sampling; stale samples from the
                // previous program would otherwise leak into this run.
                self.pending_samples.clear();
            }
            0xB => self.sample_interval = value,
            _ => {}
        }
    }

    fn emit_sample(&mut self, opcode: u8) {
        if self.sample_interval == 0 {
            return;
        }
        let mut sample = [0u8; 8];
        sample[0..4].copy_from_slice(&self.program_counter.to_le_bytes());
        // Synthetic stage tag: instruction stage valid + the opcode.
        let flags = 0x8000 | u16::from(opcode);
        sample[4..6].copy_from_slice(&flags.to_le_bytes());
        self.pending_samples.push_back(sample);
        self.drain_pending();
    }

    fn emit_idle_sample(&mut self) {
        // The decoder is drained but the TCU keeps ticking; idle samples
        // carry the post-program PC and no instruction-stage activity.
        if self.sample_interval == 0 {
            return;
        }
        let mut sample = [0u8; 8];
        sample[0..4].copy_from_slice(&self.program_counter.to_le_bytes());
        self.pending_samples.push_back(sample);
        self.drain_pending();
    }

    fn data_move(&mut self, instruction: &tcu::DecodedInstruction) {
        let Some(flags) = DataMoveFlags::from_nibble(instruction.flags) else {
            return;
        };
        let local_address = self.layout.operand0_address(instruction.operand0) as usize;
        let local_stride = 1usize << self.layout.operand0_stride(instruction.operand0);
        let other_address = self.layout.operand1_address(instruction.operand1) as usize;
        let other_stride = 1usize << self.layout.operand1_stride(instruction.operand1);
        let count = instruction.operand2 as usize + 1;

        tracing::trace!(
            ?flags,
            local_address,
            other_address,
            count,
            "data move"
        );

        let vector_bytes = self.vector_bytes();
        let mut vector = vec![0u8; vector_bytes];

        for i in 0..count {
            let local_index = local_address + i * local_stride;
            let other_index = other_address + i * other_stride;

            match flags {
                DataMoveFlags::Dram0ToLocal => {
                    self.dram0.read(other_index * vector_bytes, &mut vector);
                    self.write_local(local_index, &vector);
                }
                DataMoveFlags::LocalToDram0 => {
                    if self.read_local(local_index, &mut vector) {
                        self.dram0.write(other_index * vector_bytes, &vector);
                    }
                }
                DataMoveFlags::Dram1ToLocal => {
                    self.dram1.read(other_index * vector_bytes, &mut vector);
                    self.write_local(local_index, &vector);
                }
                DataMoveFlags::LocalToDram1 => {
                    if self.read_local(local_index, &mut vector) {
                        self.dram1.write(other_index * vector_bytes, &vector);
                    }
                }
                DataMoveFlags::AccumulatorToLocal => {
                    if copy_vector(&self.accumulator, other_index, &mut vector) {
                        self.write_local(local_index, &vector);
                    }
                }
                DataMoveFlags::LocalToAccumulator => {
                    if self.read_local(local_index, &mut vector) {
                        write_vector(&mut self.accumulator, other_index, &vector);
                    }
                }
                DataMoveFlags::LocalToAccumulatorAccumulate => {
                    if self.read_local(local_index, &mut vector) {
                        accumulate_vector(&mut self.accumulator, other_index, &vector);
                    }
                }
            }
        }
    }

    fn read_local(&self, index: usize, out: &mut [u8]) -> bool {
        copy_vector(&self.local, index, out)
    }

    fn write_local(&mut self, index: usize, vector: &[u8]) {
        write_vector(&mut self.local, index, vector);
    }

    // -- sample channel ----------------------------------------------------

    fn drain_pending(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return;
        };
        while rx.delivered < rx.len {
            let Some(sample) = self.pending_samples.pop_front() else {
                break;
            };
            let n = sample.len().min(rx.len - rx.delivered);
            // SAFETY: the driver reserved [ptr, ptr + len) inside its
            // sample region before starting the transfer; delivered + n
            // stays within len.
            unsafe {
                std::ptr::copy_nonoverlapping(sample.as_ptr(), rx.ptr.add(rx.delivered), n);
            }
            rx.delivered += n;
        }
        if rx.delivered == rx.len {
            self.rx_last_transferred = rx.len;
            self.rx = None;
        }
    }
}

/// Left shift that yields zero instead of overflowing for exotic layouts.
fn shl(value: u64, bits: usize) -> u64 {
    if bits >= 64 {
        0
    } else {
        value << bits
    }
}

fn copy_vector(memory: &[u8], index: usize, out: &mut [u8]) -> bool {
    let len = out.len();
    match memory.get(index * len..(index + 1) * len) {
        Some(src) => {
            out.copy_from_slice(src);
            true
        }
        None => false,
    }
}

fn write_vector(memory: &mut [u8], index: usize, vector: &[u8]) {
    let len = vector.len();
    if let Some(dst) = memory.get_mut(index * len..(index + 1) * len) {
        dst.copy_from_slice(vector);
    }
}

/// Element-wise saturating fixed-point add into the accumulator.
fn accumulate_vector(memory: &mut [u8], index: usize, vector: &[u8]) {
    let len = vector.len();
    if let Some(dst) = memory.get_mut(index * len..(index + 1) * len) {
        for (dst_word, src_word) in dst.chunks_exact_mut(2).zip(vector.chunks_exact(2)) {
            let a = i16::from_le_bytes([dst_word[0], dst_word[1]]);
            let b = i16::from_le_bytes([src_word[0], src_word[1]]);
            dst_word.copy_from_slice(&a.saturating_add(b).to_le_bytes());
        }
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// The emulator's instruction channel (memory → device).
#[derive(Debug)]
pub struct InstructionPort {
    state: Rc<RefCell<State>>,
}

impl InstructionDma for InstructionPort {
    type Error = std::convert::Infallible;

    fn self_test(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn start_transfer(&mut self, ptr: *const u8, len: usize) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        tracing::debug!(len, "instruction chunk");
        // SAFETY: the driver submits ranges inside its own staged program
        // region, which outlives the transfer.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
        state.execute_chunk(bytes);
        state.tx_busy_remaining = state.busy_polls;
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.tx_busy_remaining > 0 {
            state.tx_busy_remaining -= 1;
            true
        } else {
            false
        }
    }

    fn max_transfer_len(&self) -> usize {
        self.state.borrow().max_transfer_len
    }

    fn data_width_bytes(&self) -> usize {
        self.state.borrow().data_width_bytes
    }
}

/// The emulator's sample channel (device → memory).
#[derive(Debug)]
pub struct SamplePort {
    state: Rc<RefCell<State>>,
}

impl SampleDma for SamplePort {
    type Error = std::convert::Infallible;

    fn self_test(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn start_transfer(&mut self, ptr: *mut u8, len: usize) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.rx = Some(RxTransfer {
            ptr,
            len,
            delivered: 0,
        });
        state.drain_pending();
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.rx.is_some() {
            // Time passes while the host polls: the TCU keeps emitting.
            state.emit_idle_sample();
        }
        state.rx.is_some()
    }

    fn transferred_bytes(&self) -> usize {
        self.state.borrow().rx_last_transferred
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use platform::HostRegion;
    use tcu::{DataType, InstructionBuffer};

    fn arch() -> Architecture {
        Architecture {
            array_size: 4,
            data_type: Some(DataType::Fp16Bp8),
            local_depth: 64,
            accumulator_depth: 32,
            dram0_depth: 8192,
            dram1_depth: 8192,
            stride0_depth: 4,
            stride1_depth: 4,
            simd_registers_depth: 1,
        }
    }

    #[test]
    fn data_move_round_trips_through_local() {
        let a = arch();
        let vector_bytes = 4 * 2;
        let dram_mem = HostRegion::new((a.dram0_depth + a.dram1_depth) * vector_bytes).unwrap();
        // SAFETY: test-local alias; the emulator is the only writer.
        let emulator = TcuEmulator::new(&a, unsafe { dram_mem.region().alias() });

        // Seed DRAM0 vector 3 directly.
        let mut dram = dram_mem.region();
        dram.write(3 * vector_bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);

        // DRAM0[3] -> Local[5]; Local[5] -> DRAM0[100].
        let layout = InstructionLayout::new(&a);
        let prog_mem = HostRegion::new(256).unwrap();
        let mut program = InstructionBuffer::new(prog_mem.region());
        program
            .append_instruction(&layout, Opcode::DataMove, 0b0000, 5, 3, 0)
            .unwrap();
        program
            .append_instruction(&layout, Opcode::DataMove, 0b0001, 5, 100, 0)
            .unwrap();

        let mut port = emulator.instruction_port();
        port.start_transfer(program.region().as_slice().as_ptr(), program.offset())
            .unwrap();

        assert_eq!(emulator.local_vector(5), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let mut out = [0u8; 8];
        dram.read(100 * vector_bytes, &mut out);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(emulator.executed_instructions(), 2);
    }

    #[test]
    fn config_writes_latch_registers_without_advancing_pc() {
        let a = arch();
        let dram_mem = HostRegion::new((a.dram0_depth + a.dram1_depth) * 8).unwrap();
        // SAFETY: test-local alias.
        let emulator = TcuEmulator::new(&a, unsafe { dram_mem.region().alias() });

        let layout = InstructionLayout::new(&a);
        let prog_mem = HostRegion::new(256).unwrap();
        let mut program = InstructionBuffer::new(prog_mem.region());
        program
            .append_config(&layout, ConfigRegister::Dram0Offset, 0x1234)
            .unwrap();
        program
            .append_config(&layout, ConfigRegister::Timeout, 100)
            .unwrap();

        let mut port = emulator.instruction_port();
        port.start_transfer(program.region().as_slice().as_ptr(), program.offset())
            .unwrap();

        assert_eq!(emulator.config_register(ConfigRegister::Dram0Offset), 0x1234);
        assert_eq!(emulator.config_register(ConfigRegister::Timeout), 100);
        assert_eq!(emulator.config_register(ConfigRegister::ProgramCounter), 0);
    }

    #[test]
    fn accumulate_saturates() {
        let mut memory = vec![0u8; 8];
        memory[0..2].copy_from_slice(&i16::MAX.to_le_bytes());
        accumulate_vector(&mut memory, 0, &[1, 0, 2, 0, 0, 0, 0, 0]);
        assert_eq!(i16::from_le_bytes([memory[0], memory[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([memory[2], memory[3]]), 2);
    }
}
