//! Platform memory map.
//!
//! Boards hand the driver three regions carved from the DDR map at fixed
//! addresses (the usual BSP configuration constants):
//!
//! | Region | Platform constants | Required |
//! |--------|--------------------|----------|
//! | instruction buffer | `PROG_BUFFER_BASE` / `PROG_BUFFER_HIGH` | yes |
//! | DRAM banks (packed back-to-back) | `DRAM_BUFFER_BASE` / `DRAM_BUFFER_HIGH` | yes |
//! | sample buffer | `SAMPLE_BUFFER_BASE` / `SAMPLE_BUFFER_HIGH` | only with sampling |
//!
//! The driver splits the DRAM region into DRAM0 and DRAM1 by architecture
//! depth at init and checks that both bank bases sit on the 64 KB boundary
//! the accelerator's DRAM-offset registers can express.

use crate::mem::DmaRegion;

/// The regions a platform grants the driver at init.
#[derive(Debug)]
pub struct MemoryMap {
    /// Instruction (program) buffer region.
    pub prog: DmaRegion,
    /// Combined DRAM0+DRAM1 region; the driver splits it by depth.
    pub dram: DmaRegion,
    /// Sample collection region, present iff the board wires the sample
    /// DMA channel.
    pub sample: Option<DmaRegion>,
}

impl MemoryMap {
    /// Build a memory map from raw `[base, high)` platform ranges.
    ///
    /// # Safety
    ///
    /// Each range must be mapped, DMA-visible, mutually disjoint memory
    /// that nothing else aliases (see [`DmaRegion::from_range`]).
    #[must_use]
    pub unsafe fn from_platform_ranges(
        prog: (usize, usize),
        dram: (usize, usize),
        sample: Option<(usize, usize)>,
    ) -> Self {
        // SAFETY: forwarded directly from the caller's contract.
        unsafe {
            Self {
                prog: DmaRegion::from_range(prog.0, prog.1),
                dram: DmaRegion::from_range(dram.0, dram.1),
                sample: sample.map(|(base, high)| DmaRegion::from_range(base, high)),
            }
        }
    }
}
