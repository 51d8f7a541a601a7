use crate::block::BlockType;
use crate::position::Position;
use crate::response::Response;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stimulus configuration of one trial
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrialSpec {
    pub audio_file: Option<PathBuf>,
    pub vis_file: Option<PathBuf>,
    /// Audio onset relative to the visual event, in ms
    pub audio_offset: Option<i64>,
    pub num_dots: Option<u32>,
}

/// Onsets the presenter measured while playing a trial, in ms
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PresentationTimings {
    pub animation_start: Option<f64>,
    pub animation_delay: Option<f64>,
    pub audio_start: Option<f64>,
    pub audio_delay: Option<f64>,
}

/// Fields identical on every record of a run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub exp_id: i64,
    pub sub_exp_id: i64,
    pub exp_build: String,
    pub exp_build_date: String,
    pub ra_id: String,
    pub subject: String,
    pub session: String,
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    #[serde(flatten)]
    pub identity: RecordIdentity,
    pub trial_num: usize,
    pub block_num: usize,
    pub metablock_num: usize,
    pub block_instance: usize,
    pub repetition_num: usize,
    pub trial_in_metablock: usize,
    pub block_in_metablock: usize,
    pub trial_in_block: usize,
    pub time_stamp: String,
    pub block_type: BlockType,
    #[serde(flatten)]
    pub spec: TrialSpec,
    #[serde(flatten)]
    pub timings: PresentationTimings,
    pub response: Option<Response>,
    pub response_correct: Option<bool>,
}

impl TrialRecord {
    pub fn new(
        identity: &RecordIdentity,
        position: &Position,
        block_type: BlockType,
        spec: TrialSpec,
        time_stamp: String,
    ) -> Self {
        Self {
            identity: identity.clone(),
            trial_num: position.trial_num(),
            block_num: position.block_num(),
            metablock_num: position.metablock_num(),
            block_instance: position.block_instance(block_type),
            repetition_num: position.repetition_num(block_type),
            trial_in_metablock: position.trial_in_metablock + 1,
            block_in_metablock: position.block_in_metablock + 1,
            trial_in_block: position.trial_in_block + 1,
            time_stamp,
            block_type,
            spec,
            timings: PresentationTimings::default(),
            response: None,
            response_correct: None,
        }
    }
}
