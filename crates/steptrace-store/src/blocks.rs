//! Basic-block reconstruction from executed program counters.

use crate::format::{InstructionRecord, INSTRUCTION_WIDTH};

/// A maximal run of contiguously executed fixed-width instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlock {
    pub pc: u64,
    pub size: u32,
}

/// Splits an ordered program-counter sequence into maximal contiguous
/// runs: a next pc that is not exactly one instruction past the previous
/// one closes the current block and opens a new one. The first and last
/// elements always bound a block, so a single pc yields a single
/// one-instruction block.
pub fn extract_basic_blocks(pcs: &[u64]) -> Vec<BasicBlock> {
    let mut blocks = Vec::new();
    let Some((&first, rest)) = pcs.split_first() else {
        return blocks;
    };
    let mut start = first;
    let mut last = first;
    for &pc in rest {
        if last + INSTRUCTION_WIDTH != pc {
            blocks.push(BasicBlock {
                pc: start,
                size: (last + INSTRUCTION_WIDTH - start) as u32,
            });
            start = pc;
        }
        last = pc;
    }
    blocks.push(BasicBlock {
        pc: start,
        size: (last + INSTRUCTION_WIDTH - start) as u32,
    });
    blocks
}

/// Projects a thread's parsed records back to its pc sequence.
pub fn extract_pcs(records: &[InstructionRecord]) -> Vec<u64> {
    records.iter().map(|record| record.pc).collect()
}
