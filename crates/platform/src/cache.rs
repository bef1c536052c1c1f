//! Data-cache maintenance over DMA-visible memory.
//!
//! The accelerator masters the memory bus directly, so every host write to
//! a shared region must be flushed out of the d-cache before the DMA
//! descriptor referencing it is submitted, and every host read must be
//! preceded by a flush to write back any dirty lines covering the range
//! (on the target SoC a flush implies invalidate, so the subsequent load
//! refetches from DRAM).
//!
//! On `hardware` builds this calls the BSP-provided flush hook. On host
//! builds memory is coherent and a compiler fence is enough to keep the
//! ordering contract visible to the optimizer.

#[cfg(feature = "hardware")]
extern "C" {
    /// BSP hook: flush (and invalidate) the d-cache lines covering
    /// `[addr, addr + len)`. Provided by the board support glue.
    fn tcu_platform_dcache_flush_range(addr: usize, len: usize);
}

/// Flush the d-cache lines covering `[ptr, ptr + len)`.
#[inline]
pub fn flush_range(ptr: *const u8, len: usize) {
    #[cfg(feature = "hardware")]
    // SAFETY: the BSP hook accepts any address range; cache maintenance on
    // a mapped range has no memory-safety effect on the Rust side.
    unsafe {
        tcu_platform_dcache_flush_range(ptr as usize, len);
    }

    #[cfg(not(feature = "hardware"))]
    {
        let _ = (ptr, len);
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
}
