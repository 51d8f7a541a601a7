use crate::Cli;
use anyhow::{Context, Result};
use avex_core::{ExperimentState, PresentationTimings, ResponseDraft, TrialRecord, TrialSpec};
use avex_experiment::results::write_json;
use avex_experiment::{
    CsvResultsWriter, ExperimentConfig, ExperimentStateMachine, Playback, Presentation,
    ResponseMode, SessionInfo,
};
use avex_timing::{DeadlineScheduler, Timer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stands in for the audio device and animation canvas
pub struct SimulatedPresenter<T: Timer> {
    timer: T,
}

impl<T: Timer> Presentation for SimulatedPresenter<T> {
    fn play(&mut self, spec: &TrialSpec) -> Playback {
        let now_ms = self.timer.now() as f64 / 1_000_000.0;
        debug!(
            "presenting audio={:?} vis={:?} offset={:?} dots={:?}",
            spec.audio_file, spec.vis_file, spec.audio_offset, spec.num_dots
        );
        Playback::Finished(PresentationTimings {
            animation_start: spec.vis_file.as_ref().map(|_| now_ms),
            animation_delay: spec.vis_file.as_ref().map(|_| 0.0),
            audio_start: spec.audio_file.as_ref().map(|_| now_ms),
            audio_delay: spec.audio_file.as_ref().map(|_| 0.0),
        })
    }

    fn clear(&mut self) {}
}

/// Answers every response prompt with a random valid response
pub struct SimulatedSubject {
    mode: ResponseMode,
    rng: StdRng,
}

impl SimulatedSubject {
    pub fn respond(&mut self) -> ResponseDraft {
        match &self.mode {
            ResponseMode::Rating {
                duration,
                agreement,
            } => ResponseDraft::Rating {
                duration: Some(self.rng.random_range(duration.0..=duration.1)),
                agreement: Some(self.rng.random_range(agreement.0..=agreement.1)),
            },
            ResponseMode::OrderJudgment {
                positive_label,
                negative_label,
                confidence_min,
                confidence_levels,
            } => {
                let label = if self.rng.random_bool(0.5) {
                    positive_label
                } else {
                    negative_label
                };
                let max = confidence_min + confidence_levels - 1;
                ResponseDraft::OrderJudgment {
                    label: Some(label.clone()),
                    confidence: Some(self.rng.random_range(*confidence_min..=max)),
                }
            }
        }
    }
}

type Experiment<T> = ExperimentStateMachine<
    SimulatedPresenter<T>,
    DeadlineScheduler<T>,
    StdRng,
    CsvResultsWriter,
>;

pub struct App<T: Timer> {
    experiment: Experiment<T>,
    subject: SimulatedSubject,
    json_out: Option<PathBuf>,
}

impl<T: Timer> App<T> {
    pub fn new(cli: &Cli, config: ExperimentConfig, timer: T) -> Result<Self> {
        let session = SessionInfo {
            ra_id: cli.ra.clone(),
            subject_id: cli.subject.clone(),
            session_id: cli.session.clone(),
            data_dir: cli
                .data_dir
                .clone()
                .unwrap_or_else(|| default_data_dir(&cli.properties)),
            properties_file: cli.properties.clone(),
        };

        let mut rng = match cli.seed.or(config.random_seed) {
            Some(seed) => {
                info!("random seed {}", seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_os_rng(),
        };
        let subject = SimulatedSubject {
            mode: config.response.clone(),
            rng: StdRng::seed_from_u64(rng.random()),
        };

        let texts = config.texts.clone();
        let writer = CsvResultsWriter::for_properties(&session.properties_file);
        let mut experiment = ExperimentStateMachine::new(
            config,
            &session,
            SimulatedPresenter {
                timer: timer.clone(),
            },
            DeadlineScheduler::new(timer),
            rng,
            writer,
        )
        .context("failed to prepare the experiment")?;

        for warning in experiment.warnings() {
            warn!("{warning}");
        }

        experiment.add_listener(
            move |state: ExperimentState, current: Option<&TrialRecord>| {
                if let Some(text) = texts.for_state(state) {
                    info!("{text}");
                }
                if let (ExperimentState::Trial, Some(record)) = (state, current) {
                    debug!(
                        "trial {} (block {}, metablock {})",
                        record.trial_num, record.block_num, record.metablock_num
                    );
                }
            },
        );

        Ok(Self {
            experiment,
            subject,
            json_out: cli.json.clone(),
        })
    }

    pub fn run(mut self) -> Result<()> {
        info!(
            "experiment {}.{}: {} metablocks, {} trials per metablock",
            self.experiment.config.experiment_id,
            self.experiment.config.sub_experiment_id,
            self.experiment.config.metablocks,
            self.experiment
                .schedule()
                .trials_per_metablock(self.experiment.config.block_set_repetitions)
        );

        self.experiment.start()?;
        while !self.experiment.state().is_terminal() {
            if self.experiment.state().allows_response() {
                let draft = self.subject.respond();
                match self.experiment.set_response_values(draft) {
                    Err(e) if e.is_recoverable() => warn!("{e}"),
                    other => {
                        other?;
                    }
                }
            } else {
                let id = self
                    .experiment
                    .scheduler_mut()
                    .wait_next()
                    .with_context(|| {
                        format!("stalled in {} with no timer armed", self.experiment.state())
                    })?;
                self.experiment.timer_expired(id)?;
            }
        }

        info!(
            "{} trials written to {}",
            self.experiment.log().len(),
            self.experiment.sink().target().display()
        );

        if let Some(path) = &self.json_out {
            write_json(path, self.experiment.log())
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

fn default_data_dir(properties: &Path) -> PathBuf {
    match properties.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
