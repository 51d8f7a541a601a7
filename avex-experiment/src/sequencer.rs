use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::factory::{TrialCatalog, TrialSet};
use avex_core::{BlockType, TrialSpec};
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, warn};

/// One entry of a metablock's block schedule
#[derive(Debug, Clone)]
pub struct BlockInstance {
    pub block_type: BlockType,
    /// A single block is revisited instead of being duplicated in the schedule
    pub single: bool,
    pub trials: Arc<TrialSet>,
    /// Presentation order, as indices into `trials`
    pub order: Vec<usize>,
    /// Passes completed over this instance
    pub reps: usize,
}

impl BlockInstance {
    fn new(block_type: BlockType, single: bool, trials: Arc<TrialSet>) -> Self {
        let order = (0..trials.len()).collect();
        Self {
            block_type,
            single,
            trials,
            order,
            reps: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Trial at position `index` of the presentation order
    pub fn trial(&self, index: usize) -> Option<TrialSpec> {
        self.order.get(index).and_then(|&i| self.trials.get(i))
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
    }
}

/// Ordered block instances of a metablock, plus the shuffling policy
#[derive(Debug, Clone)]
pub struct BlockSchedule {
    pub blocks: Vec<BlockInstance>,
    pub randomize_blocks: bool,
    pub randomize_trials: bool,
}

impl BlockSchedule {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BlockInstance> {
        self.blocks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockInstance> {
        self.blocks.get_mut(index)
    }

    /// Reorders blocks and trials for a new metablock
    pub fn redraw<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.randomize_blocks {
            self.blocks.shuffle(rng);
        }
        if self.randomize_trials {
            for block in &mut self.blocks {
                block.shuffle(rng);
            }
        }
    }

    /// Trials one metablock presents
    pub fn trials_per_metablock(&self, block_set_repetitions: usize) -> usize {
        self.blocks
            .iter()
            .map(|b| {
                if b.single {
                    b.len() * block_set_repetitions
                } else {
                    b.len()
                }
            })
            .sum()
    }
}

/// Lays the block prototypes out into a schedule
pub struct BlockSequencer<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> BlockSequencer<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn build<R: Rng + ?Sized>(
        &self,
        catalog: &TrialCatalog,
        rng: &mut R,
    ) -> Result<BlockSchedule, ExperimentError> {
        let mut blocks = Vec::new();
        for ty in self.config.included_blocks() {
            let Some(prototype) = catalog.get(ty) else {
                continue;
            };
            if prototype.is_empty() {
                warn!("skipping {} block: no trials", ty);
                continue;
            }
            let copies = if prototype.single {
                1
            } else {
                self.config.block_set_repetitions
            };
            for _ in 0..copies {
                blocks.push(BlockInstance::new(
                    ty,
                    prototype.single,
                    Arc::clone(&prototype.trials),
                ));
            }
        }

        if blocks.is_empty() {
            return Err(ExperimentError::EmptySchedule);
        }

        let mut schedule = BlockSchedule {
            blocks,
            randomize_blocks: self.config.randomize_blocks,
            randomize_trials: self.config.randomize_trials,
        };
        schedule.redraw(rng);
        debug!(
            "schedule: {:?}",
            schedule
                .blocks
                .iter()
                .map(|b| b.block_type.as_str())
                .collect::<Vec<_>>()
        );
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::BlockPrototype;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog(counts: [(BlockType, usize); 3], single: bool) -> TrialCatalog {
        let mut catalog = TrialCatalog::default();
        for (ty, n) in counts {
            let trials = TrialSet::Listed(
                (0..n)
                    .map(|i| TrialSpec {
                        audio_file: Some(format!("a{i}.wav").into()),
                        audio_offset: Some(100),
                        ..TrialSpec::default()
                    })
                    .collect(),
            );
            catalog.prototypes[ty] = Some(BlockPrototype {
                block_type: ty,
                single,
                trials: Arc::new(trials),
            });
        }
        catalog
    }

    fn config_all(reps: usize, single: bool) -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        for ty in BlockType::ALL {
            config.blocks[ty].include = true;
            config.blocks[ty].single = single;
        }
        config.block_set_repetitions = reps;
        config
    }

    #[test]
    fn test_multi_blocks_are_duplicated() {
        let config = config_all(2, false);
        let catalog = catalog(
            [
                (BlockType::Audio, 2),
                (BlockType::Animation, 3),
                (BlockType::AudioAnimation, 1),
            ],
            false,
        );
        let schedule = BlockSequencer::new(&config)
            .build(&catalog, &mut StdRng::seed_from_u64(1))
            .unwrap();
        let types: Vec<_> = schedule.blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(
            types,
            vec![
                BlockType::Audio,
                BlockType::Audio,
                BlockType::Animation,
                BlockType::Animation,
                BlockType::AudioAnimation,
                BlockType::AudioAnimation
            ]
        );
        assert_eq!(schedule.trials_per_metablock(2), 2 * (2 + 3 + 1));
    }

    #[test]
    fn test_single_blocks_appear_once() {
        let config = config_all(3, true);
        let catalog = catalog(
            [
                (BlockType::Audio, 2),
                (BlockType::Animation, 2),
                (BlockType::AudioAnimation, 2),
            ],
            true,
        );
        let schedule = BlockSequencer::new(&config)
            .build(&catalog, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(schedule.len(), 3);
        assert!(schedule.blocks.iter().all(|b| b.single && b.reps == 0));
        assert_eq!(schedule.trials_per_metablock(3), 3 * 3 * 2);
    }

    #[test]
    fn test_empty_blocks_are_skipped() {
        let config = config_all(1, false);
        let catalog = catalog(
            [
                (BlockType::Audio, 2),
                (BlockType::Animation, 0),
                (BlockType::AudioAnimation, 1),
            ],
            false,
        );
        let schedule = BlockSequencer::new(&config)
            .build(&catalog, &mut StdRng::seed_from_u64(1))
            .unwrap();
        let types: Vec<_> = schedule.blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(types, vec![BlockType::Audio, BlockType::AudioAnimation]);
    }

    #[test]
    fn test_nothing_to_present_is_an_error() {
        let config = config_all(1, false);
        let catalog = catalog(
            [
                (BlockType::Audio, 0),
                (BlockType::Animation, 0),
                (BlockType::AudioAnimation, 0),
            ],
            false,
        );
        assert!(matches!(
            BlockSequencer::new(&config).build(&catalog, &mut StdRng::seed_from_u64(1)),
            Err(ExperimentError::EmptySchedule)
        ));
    }

    #[test]
    fn test_randomized_trials_are_a_permutation() {
        let mut config = ExperimentConfig::default();
        config.randomize_trials = true;
        let catalog = catalog(
            [
                (BlockType::Audio, 20),
                (BlockType::Animation, 0),
                (BlockType::AudioAnimation, 0),
            ],
            false,
        );
        let schedule = BlockSequencer::new(&config)
            .build(&catalog, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let mut order = schedule.blocks[0].order.clone();
        assert_ne!(order, (0..20).collect::<Vec<_>>());
        order.sort_unstable();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_randomized_blocks_are_redrawn_as_permutations() {
        let mut config = config_all(4, false);
        config.randomize_blocks = true;
        let catalog = catalog(
            [
                (BlockType::Audio, 2),
                (BlockType::Animation, 2),
                (BlockType::AudioAnimation, 2),
            ],
            false,
        );
        let mut rng = StdRng::seed_from_u64(9);
        let mut schedule = BlockSequencer::new(&config).build(&catalog, &mut rng).unwrap();
        let types = |s: &BlockSchedule| s.blocks.iter().map(|b| b.block_type).collect::<Vec<_>>();

        let canonical: Vec<_> = BlockType::ALL.iter().flat_map(|t| [*t; 4]).collect();
        let first = types(&schedule);
        assert_ne!(first, canonical);
        for ty in BlockType::ALL {
            assert_eq!(first.iter().filter(|t| **t == ty).count(), 4);
        }
        // trials keep their order when only blocks are randomized
        assert!(schedule.blocks.iter().all(|b| b.order == vec![0, 1]));

        schedule.redraw(&mut rng);
        let second = types(&schedule);
        assert_ne!(second, first);
        for ty in BlockType::ALL {
            assert_eq!(second.iter().filter(|t| **t == ty).count(), 4);
        }
    }

    #[test]
    fn test_unrandomized_order_is_canonical() {
        let config = ExperimentConfig::default();
        let catalog = catalog(
            [
                (BlockType::Audio, 3),
                (BlockType::Animation, 0),
                (BlockType::AudioAnimation, 0),
            ],
            false,
        );
        let schedule = BlockSequencer::new(&config)
            .build(&catalog, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let block = &schedule.blocks[0];
        assert_eq!(block.order, vec![0, 1, 2]);
        assert!(block.trial(0).unwrap().audio_file.unwrap().ends_with("a0.wav"));
        assert!(block.trial(3).is_none());
    }
}
