use crate::block::{BlockMap, BlockType};
use serde::{Deserialize, Serialize};

/// Where the experiment is after a trial advance.
///
/// Every field is zero-based. A new value is produced for each trial and never
/// mutated afterwards; the `*_num` helpers give the one-based numbers that end
/// up in the results file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Trials started since the first real trial
    pub trial: usize,
    /// Blocks entered since the first real trial
    pub block: usize,
    pub metablock: usize,
    /// Index of the active block instance in the schedule
    pub block_in_metablock: usize,
    pub trial_in_metablock: usize,
    /// Keeps counting across repetitions of a single block
    pub trial_in_block: usize,
    /// Index into the active block instance's trial order
    pub block_trial: usize,
    /// Completed instances per block type
    pub instances: BlockMap<usize>,
    /// Completed passes per block type over the whole run
    pub repetitions: BlockMap<usize>,
    /// Completed passes per block type in the current metablock
    pub metablock_repetitions: BlockMap<usize>,
}

impl Position {
    pub fn trial_num(&self) -> usize {
        self.trial + 1
    }

    pub fn block_num(&self) -> usize {
        self.block + 1
    }

    pub fn metablock_num(&self) -> usize {
        self.metablock + 1
    }

    pub fn block_instance(&self, ty: BlockType) -> usize {
        self.instances[ty] + 1
    }

    pub fn repetition_num(&self, ty: BlockType) -> usize {
        self.repetitions[ty] + 1
    }
}
