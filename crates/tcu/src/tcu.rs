//! TCU transport: chunked instruction transmit and sample receive over
//! the two AXI DMA channels.
//!
//! The instruction channel streams the staged program to the accelerator
//! in chunks bounded by the channel's maximum transfer length and rounded
//! down to its bus data width (programs are padded to that width, so the
//! final chunk never rounds to zero). The sample channel, when present,
//! receives fixed-size sample blocks into the sample region.
//!
//! All waits are the caller's busy polls; this layer only enqueues and
//! reports busy state.

use platform::{InstructionDma, SampleDma};

use crate::buffer::InstructionBuffer;
use crate::error::{driver_error, Error, Result};
use crate::sample::{SampleBuffer, SAMPLE_SIZE_BYTES};

/// The accelerator's DMA attachment.
#[derive(Debug)]
pub struct Tcu<Tx: InstructionDma, Rx: SampleDma> {
    instruction_dma: Tx,
    sampling: Option<SampleChannel<Rx>>,
}

#[derive(Debug)]
struct SampleChannel<Rx> {
    dma: Rx,
    block_size: usize,
}

impl<Tx: InstructionDma> Tcu<Tx, platform::NoSampleDma> {
    /// A TCU with no sample channel wired.
    #[must_use]
    pub fn new(instruction_dma: Tx) -> Self {
        Self {
            instruction_dma,
            sampling: None,
        }
    }
}

impl<Tx: InstructionDma, Rx: SampleDma> Tcu<Tx, Rx> {
    /// A TCU with both channels wired; `sample_block_size` is the number
    /// of samples per receive chunk.
    #[must_use]
    pub fn with_sampling(instruction_dma: Tx, sample_dma: Rx, sample_block_size: usize) -> Self {
        Self {
            instruction_dma,
            sampling: Some(SampleChannel {
                dma: sample_dma,
                block_size: sample_block_size,
            }),
        }
    }

    /// Run the vendor self-tests on every wired channel.
    pub fn init(&mut self) -> Result<()> {
        self.instruction_dma.self_test().map_err(Error::vendor)?;
        if let Some(channel) = self.sampling.as_mut() {
            channel.dma.self_test().map_err(Error::vendor)?;
        }
        Ok(())
    }

    /// `true` when a sample channel is wired.
    #[must_use]
    pub fn has_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// Samples per receive chunk, when sampling is wired.
    #[must_use]
    pub fn sample_block_size(&self) -> Option<usize> {
        self.sampling.as_ref().map(|channel| channel.block_size)
    }

    /// The instruction channel's bus data width, for program padding.
    #[must_use]
    pub fn instructions_data_width_bytes(&self) -> usize {
        self.instruction_dma.data_width_bytes()
    }

    /// Enqueue the next instruction chunk starting at `*run_offset` and
    /// advance the offset by the bytes actually submitted.
    pub fn start_instructions(
        &mut self,
        buffer: &InstructionBuffer,
        run_offset: &mut usize,
    ) -> Result<()> {
        let remaining = buffer.offset().saturating_sub(*run_offset);
        let mut transfer = remaining.min(self.instruction_dma.max_transfer_len());
        transfer &= !(self.instruction_dma.data_width_bytes() - 1);

        // SAFETY: run_offset stays inside the buffer region; the chunk was
        // bounded by the remaining program bytes above.
        let ptr = unsafe { buffer.region().base_ptr().add(*run_offset) };
        *run_offset += transfer;

        self.instruction_dma
            .start_transfer(ptr, transfer)
            .map_err(Error::vendor)
    }

    /// `true` while an instruction chunk is being ingested.
    #[must_use]
    pub fn is_instructions_busy(&self) -> bool {
        self.instruction_dma.is_busy()
    }

    /// Enqueue one sample block receive at the buffer's fill offset.
    pub fn start_sampling(&mut self, buffer: &mut SampleBuffer) -> Result<()> {
        let channel = self
            .sampling
            .as_mut()
            .ok_or_else(|| driver_error!(InvalidPlatform, "No sample DMA channel"))?;

        let transfer = channel.block_size * SAMPLE_SIZE_BYTES;
        if transfer > buffer.capacity() - buffer.offset() {
            return Err(driver_error!(OutOfSampleBuffer, "Out of sample buffer"));
        }

        channel
            .dma
            .start_transfer(buffer.tail_ptr(), transfer)
            .map_err(Error::vendor)
    }

    /// Advance the buffer's fill offset by the bytes the channel actually
    /// delivered.
    pub fn complete_sampling(&mut self, buffer: &mut SampleBuffer) {
        if let Some(channel) = self.sampling.as_ref() {
            buffer.advance(channel.dma.transferred_bytes());
        }
    }

    /// `true` while a sample block receive is in flight.
    #[must_use]
    pub fn is_sample_busy(&self) -> bool {
        self.sampling
            .as_ref()
            .map_or(false, |channel| channel.dma.is_busy())
    }
}
