//! Shared fixture: a driver wired to the emulated accelerator over
//! host-allocated, 64 KB-aligned regions.

#![allow(dead_code)] // each integration binary uses a subset
#![allow(clippy::unwrap_used, clippy::expect_used)]

use platform::{HostRegion, MemoryMap, NoSampleDma};
use tcu::{Architecture, DataType, Driver, DriverOptions, Tcu};
use tcu_emulator::{InstructionPort, SamplePort, TcuEmulator};

/// Reference test architecture: 64 KB per DRAM bank, 6-byte instructions.
pub fn test_arch() -> Architecture {
    Architecture {
        array_size: 8,
        data_type: Some(DataType::Fp16Bp8),
        local_depth: 256,
        accumulator_depth: 128,
        dram0_depth: 4096,
        dram1_depth: 4096,
        stride0_depth: 4,
        stride1_depth: 4,
        simd_registers_depth: 1,
    }
}

pub struct Fixture {
    pub arch: Architecture,
    pub prog: HostRegion,
    pub dram: HostRegion,
    pub sample: Option<HostRegion>,
    pub emulator: TcuEmulator,
}

impl Fixture {
    pub fn new(arch: Architecture) -> Self {
        Self::with_sample_region(arch, None)
    }

    pub fn with_sampling(arch: Architecture, sample_bytes: usize) -> Self {
        Self::with_sample_region(arch, Some(sample_bytes))
    }

    fn with_sample_region(arch: Architecture, sample_bytes: Option<usize>) -> Self {
        let vector_bytes = arch.array_size * 2;
        let dram_bytes = (arch.dram0_depth + arch.dram1_depth) * vector_bytes;

        let prog = HostRegion::new(64 * 1024).expect("program region");
        let dram = HostRegion::new(dram_bytes).expect("dram region");
        let sample = sample_bytes.map(|bytes| HostRegion::new(bytes).expect("sample region"));

        // SAFETY: the emulator plays the bus-mastering hardware over the
        // same bytes the driver owns; all accesses stay on the copying
        // accessors.
        let emulator = TcuEmulator::new(&arch, unsafe { dram.region().alias() });

        Self {
            arch,
            prog,
            dram,
            sample,
            emulator,
        }
    }

    pub fn memory_map(&self) -> MemoryMap {
        MemoryMap {
            prog: self.prog.region(),
            dram: self.dram.region(),
            sample: self.sample.as_ref().map(HostRegion::region),
        }
    }

    pub fn driver(
        &self,
        options: DriverOptions,
    ) -> tcu::Result<Driver<InstructionPort, NoSampleDma>> {
        let tcu = Tcu::new(self.emulator.instruction_port());
        Driver::new(self.arch, self.memory_map(), tcu, options)
    }

    pub fn sampling_driver(
        &self,
        block_size: usize,
        options: DriverOptions,
    ) -> tcu::Result<Driver<InstructionPort, SamplePort>> {
        let tcu = Tcu::with_sampling(
            self.emulator.instruction_port(),
            self.emulator.sample_port(),
            block_size,
        );
        Driver::new(self.arch, self.memory_map(), tcu, options)
    }
}
