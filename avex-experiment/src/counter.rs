use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::sequencer::BlockSchedule;
use avex_core::{BlockMap, Position};
use rand::Rng;
use tracing::debug;

/// Outcome of a trial advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Trial(Position),
    /// Every metablock has been presented
    Finished,
}

/// Walks trial, block and metablock boundaries over a `BlockSchedule`.
///
/// The counter only holds configuration. Each call takes the previous
/// `Position` and returns the next one.
#[derive(Debug, Clone)]
pub struct TrialCounter {
    block_set_repetitions: usize,
    metablocks: usize,
    full_random: BlockMap<bool>,
}

impl TrialCounter {
    pub fn new(config: &ExperimentConfig) -> Self {
        Self {
            block_set_repetitions: config.block_set_repetitions,
            metablocks: config.metablocks,
            full_random: BlockMap::from_fn(|ty| config.blocks[ty].full_random),
        }
    }

    /// Position of the first real trial
    pub fn first(&self, schedule: &BlockSchedule) -> Result<Step, ExperimentError> {
        if self.metablocks == 0 {
            return Ok(Step::Finished);
        }
        let position = Position::default();
        check_in_bounds(schedule, &position)?;
        Ok(Step::Trial(position))
    }

    pub fn advance<R: Rng + ?Sized>(
        &self,
        prev: &Position,
        schedule: &mut BlockSchedule,
        rng: &mut R,
    ) -> Result<Step, ExperimentError> {
        let mut next = *prev;
        next.trial += 1;
        next.trial_in_metablock += 1;
        next.trial_in_block += 1;
        next.block_trial += 1;

        let block = schedule
            .get_mut(next.block_in_metablock)
            .ok_or_else(|| out_of_schedule(&next))?;
        if next.block_trial < block.len() {
            return Ok(Step::Trial(next));
        }

        let ty = block.block_type;
        next.block_trial = 0;
        next.repetitions[ty] += 1;
        next.metablock_repetitions[ty] += 1;
        block.reps += 1;

        if block.single && next.metablock_repetitions[ty] < self.block_set_repetitions {
            if self.full_random[ty] {
                block.shuffle(rng);
            }
            debug!(
                "{} block pass {} of {}",
                ty,
                next.metablock_repetitions[ty] + 1,
                self.block_set_repetitions
            );
            return Ok(Step::Trial(next));
        }

        next.instances[ty] += 1;
        next.block += 1;
        next.block_in_metablock += 1;
        next.trial_in_block = 0;

        if next.block_in_metablock >= schedule.len() {
            next.block_in_metablock = 0;
            next.trial_in_metablock = 0;
            next.metablock_repetitions = BlockMap::default();
            next.metablock += 1;
            if next.metablock >= self.metablocks {
                debug!("all {} metablocks complete", self.metablocks);
                return Ok(Step::Finished);
            }
            debug!("starting metablock {}", next.metablock_num());
            schedule.redraw(rng);
        }

        check_in_bounds(schedule, &next)?;
        Ok(Step::Trial(next))
    }
}

fn out_of_schedule(position: &Position) -> ExperimentError {
    ExperimentError::Invariant(format!(
        "block {} is outside the schedule",
        position.block_in_metablock
    ))
}

fn check_in_bounds(schedule: &BlockSchedule, position: &Position) -> Result<(), ExperimentError> {
    let block = schedule
        .get(position.block_in_metablock)
        .ok_or_else(|| out_of_schedule(position))?;
    if position.block_trial >= block.len() {
        return Err(ExperimentError::Invariant(format!(
            "trial {} is past the end of a {}-trial {} block",
            position.block_trial,
            block.len(),
            block.block_type
        )));
    }
    Ok(())
}
