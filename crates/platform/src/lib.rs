//! Platform layer for the TCU host driver.
//!
//! This crate provides trait-based abstractions for everything the driver
//! needs from the board support package, enabling development and testing
//! without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (board main, out of tree)
//!         ↓
//! Driver Layer (tcu crate)
//!         ↓
//! Platform Layer (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (vendor BSP: AXI DMA, d-cache ops, FAT filesystem)
//! ```
//!
//! # Abstractions
//!
//! - [`InstructionDma`] / [`SampleDma`] - the two AXI DMA channels
//! - [`DmaRegion`] - a DMA-visible byte region with explicit cache flush
//! - [`MemoryMap`] - the platform's program/DRAM/sample region carving
//! - [`FileSystem`] - blocking byte-range file access
//! - [`Flash`] - blocking block-read from on-board flash
//! - [`Stopwatch`] - elapsed-microseconds measurement
//!
//! # Features
//!
//! - `std`: host-side implementations for testing ([`HostRegion`],
//!   [`LocalFileSystem`], [`StdStopwatch`])
//! - `hardware`: route cache maintenance to the BSP d-cache hook
//! - `defmt`: enable defmt logging derives

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

pub mod cache;
pub mod dma;
pub mod flash;
pub mod mem;
pub mod memmap;
pub mod stopwatch;
pub mod storage;

pub use dma::{InstructionDma, NoSampleDma, SampleDma};
pub use flash::Flash;
pub use mem::DmaRegion;
pub use memmap::MemoryMap;
pub use stopwatch::Stopwatch;
pub use storage::FileSystem;

#[cfg(any(test, feature = "std"))]
pub use mem::HostRegion;
#[cfg(any(test, feature = "std"))]
pub use stopwatch::StdStopwatch;
#[cfg(any(test, feature = "std"))]
pub use storage::LocalFileSystem;
