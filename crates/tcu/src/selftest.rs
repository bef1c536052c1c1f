//! Built-in hardware exercises: move random vectors between DRAM banks
//! through Local and Accumulator memory, sweeping sizes, strides, and
//! offsets, and compare the read-back against the source.
//!
//! Useful on a freshly bitstreamed board to shake out DMA wiring and
//! memory map mistakes before any model runs.

use core::fmt;

use rand::RngCore;

use platform::{InstructionDma, SampleDma};

use crate::driver::{DramBank, Driver};
use crate::error::{driver_error, Result};
use crate::instruction::{DataMoveFlags, Opcode};

/// Outcome of a [`run_memory_test`] sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryTestReport {
    /// Move programs executed.
    pub test_count: usize,
    /// Programs whose read-back differed from the source.
    pub failure_count: usize,
}

const TEST_MAX_SIZE: usize = 8;
const TEST_UNTIL_OFFSET: usize = 4;

fn bank_to_local(bank: DramBank) -> DataMoveFlags {
    match bank {
        DramBank::Dram0 => DataMoveFlags::Dram0ToLocal,
        DramBank::Dram1 => DataMoveFlags::Dram1ToLocal,
    }
}

fn local_to_bank(bank: DramBank) -> DataMoveFlags {
    match bank {
        DramBank::Dram0 => DataMoveFlags::LocalToDram0,
        DramBank::Dram1 => DataMoveFlags::LocalToDram1,
    }
}

#[allow(clippy::too_many_arguments)] // sweep parameters mirror the program shape
fn do_memory_test<Tx: InstructionDma, Rx: SampleDma, R: RngCore, W: fmt::Write>(
    driver: &mut Driver<Tx, Rx>,
    from_bank: DramBank,
    from_offset: usize,
    from_buffer: &mut [f32],
    to_bank: DramBank,
    to_offset: usize,
    to_buffer: &mut [f32],
    size: usize,
    stride0: usize,
    stride1: usize,
    rng: &mut R,
    report: &mut MemoryTestReport,
    w: &mut W,
    verbose: bool,
) -> Result<()> {
    let arch = *driver.arch();
    let span = size * (1 << stride0.max(stride1));
    if from_offset + span > arch.local_depth
        || to_offset + span > arch.local_depth
        || to_offset + span > arch.accumulator_depth
    {
        return Ok(());
    }

    driver.fill_dram_vectors_random(from_bank, from_offset, stride1, size, rng)?;
    driver.read_dram_vectors(from_bank, from_offset, stride1, size, from_buffer)?;

    let layout = *driver.layout();
    driver.setup_buffer_preamble()?;
    driver.append_instruction(
        Opcode::DataMove,
        bank_to_local(from_bank).as_nibble(),
        layout.make_operand0(from_offset as u64, stride0 as u64),
        layout.make_operand1(from_offset as u64, stride1 as u64),
        (size - 1) as u64,
    )?;
    driver.append_instruction(
        Opcode::DataMove,
        DataMoveFlags::LocalToAccumulator.as_nibble(),
        layout.make_operand0(from_offset as u64, stride0 as u64),
        layout.make_operand1(from_offset as u64, stride1 as u64),
        (size - 1) as u64,
    )?;
    driver.append_instruction(
        Opcode::DataMove,
        DataMoveFlags::AccumulatorToLocal.as_nibble(),
        layout.make_operand0(to_offset as u64, stride0 as u64),
        layout.make_operand1(from_offset as u64, stride1 as u64),
        (size - 1) as u64,
    )?;
    driver.append_instruction(
        Opcode::DataMove,
        local_to_bank(to_bank).as_nibble(),
        layout.make_operand0(to_offset as u64, stride0 as u64),
        layout.make_operand1(to_offset as u64, stride1 as u64),
        (size - 1) as u64,
    )?;
    driver.setup_buffer_postamble()?;
    driver.run()?;

    driver.read_dram_vectors(to_bank, to_offset, stride1, size, to_buffer)?;

    let scalars = size * arch.array_size;
    let mismatches = from_buffer
        .iter()
        .zip(to_buffer.iter())
        .take(scalars)
        .filter(|(a, b)| a != b)
        .count();

    if mismatches != 0 {
        report.failure_count += 1;
        if verbose {
            writeln!(
                w,
                "FAILED moving {size} vectors from {from_offset} to {to_offset}: {mismatches} bad scalars"
            )?;
        }
    }
    report.test_count += 1;

    Ok(())
}

/// Sweep DRAM→Local→Accumulator→Local→DRAM moves across sizes, strides,
/// and offsets, comparing read-back against source.
///
/// Pass a seeded generator to make failures reproduce.
pub fn run_memory_test<Tx: InstructionDma, Rx: SampleDma, R: RngCore, W: fmt::Write>(
    driver: &mut Driver<Tx, Rx>,
    from_bank: DramBank,
    to_bank: DramBank,
    rng: &mut R,
    w: &mut W,
    verbose: bool,
) -> Result<MemoryTestReport> {
    let arch = *driver.arch();
    let max_size = TEST_MAX_SIZE.min(arch.accumulator_depth);
    let scalars = max_size * arch.array_size;

    let mut from_buffer = alloc::vec::Vec::new();
    let mut to_buffer = alloc::vec::Vec::new();
    if from_buffer.try_reserve_exact(scalars).is_err() || to_buffer.try_reserve_exact(scalars).is_err()
    {
        return Err(driver_error!(OutOfHeapMemory, "Out of heap memory"));
    }
    from_buffer.resize(scalars, 0.0);
    to_buffer.resize(scalars, 0.0);

    let mut report = MemoryTestReport::default();

    let mut size = 1;
    while size <= max_size {
        writeln!(w, "{size:06} vectors -----------------------")?;

        for stride0 in 0..arch.stride0_depth.min(3) {
            for stride1 in 0..arch.stride1_depth.min(3) {
                for from_offset in 0..TEST_UNTIL_OFFSET {
                    for to_offset in 0..TEST_UNTIL_OFFSET {
                        do_memory_test(
                            driver,
                            from_bank,
                            from_offset,
                            &mut from_buffer,
                            to_bank,
                            to_offset,
                            &mut to_buffer,
                            size,
                            stride0,
                            stride1,
                            rng,
                            &mut report,
                            w,
                            verbose,
                        )?;
                    }
                }
            }
        }

        writeln!(
            w,
            "{}: {} tests, {} failures",
            if report.failure_count == 0 { "OK" } else { "FAILED" },
            report.test_count,
            report.failure_count
        )?;
        size *= 2;
    }

    Ok(report)
}
