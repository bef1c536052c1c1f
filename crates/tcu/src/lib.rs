//! Host-side driver for a Tensor Compute Unit (TCU): a fixed-function
//! matrix/SIMD accelerator attached over two AXI DMA channels on an FPGA
//! SoC.
//!
//! The driver turns model-execution requests — load this model, bind
//! these inputs, run, return these outputs — into bit-packed accelerator
//! programs staged in a DMA-visible buffer, streams them to the device,
//! waits for completion through a DRAM compare probe, and optionally
//! records cycle-interval execution samples for post-hoc analysis.
//!
//! # Structure
//!
//! - [`architecture`] — accelerator parameter records and the scalar codec
//! - [`instruction`] — opcodes, per-architecture operand layout, encoder
//! - [`buffer`] — the append-only program builder
//! - [`dram`] — fixed-point vector I/O over the DRAM banks
//! - [`sample`] — execution sample collection, wrap recovery, analysis
//! - [`tcu`] — DMA transport
//! - [`model`] — the compiled-model descriptor
//! - [`driver`] — orchestration: init, load, run-to-completion, read-back
//! - [`selftest`] — on-device memory move exercises
//!
//! The host thread owns the accelerator exclusively and never suspends:
//! all waits are busy polls against DMA busy bits or the completion
//! probe. Cache coherence with the bus-mastering device is maintained by
//! flushing exactly the touched range at every write→submit and
//! submit→read transition.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod architecture;
pub mod buffer;
pub mod dram;
pub mod driver;
pub mod error;
pub mod instruction;
mod json;
pub mod model;
pub mod sample;
pub mod selftest;
pub mod tcu;

pub use architecture::{Architecture, DataType};
pub use buffer::InstructionBuffer;
pub use driver::{DramBank, Driver, DriverOptions, PROGRAM_COUNTER_SHIFT};
pub use error::{DriverError, Error, ErrorKind, Result};
pub use instruction::{
    ConfigRegister, DataMoveFlags, DecodedInstruction, InstructionLayout, Opcode,
};
pub use model::Model;
pub use sample::{
    SampleAnalysis, SampleBuffer, SampleRecord, INVALID_PROGRAM_COUNTER, SAMPLE_INTERVAL_CYCLES,
    SAMPLE_SIZE_BYTES,
};
pub use tcu::Tcu;
