use crate::config::ExperimentConfig;
use crate::counter::{Step, TrialCounter};
use crate::error::ExperimentError;
use crate::factory::TrialFactory;
use crate::recorder::ResponseRecorder;
use crate::results::TrialSink;
use crate::sequencer::{BlockSchedule, BlockSequencer};
use avex_core::{
    ExperimentState, Position, PresentationTimings, RecordIdentity, ResponseDraft, TrialRecord,
    TrialSpec,
};
use avex_timing::{Scheduler, TimerId};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const TIME_STAMP_FORMAT: &str = "%b %d, %Y; %I:%M:%S %p";

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    Start,
    TimerExpired(TimerId),
    /// Deferred completion of a `Playback::Pending` presentation
    PresentationFinished(PresentationTimings),
    Response(ResponseDraft),
    /// Host window closed
    Abort,
}

/// Result of handing a trial to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Playback {
    Finished(PresentationTimings),
    /// Completion arrives later as `ExperimentEvent::PresentationFinished`
    Pending,
}

/// Owner of the audio device and animation canvas
pub trait Presentation {
    fn play(&mut self, spec: &TrialSpec) -> Playback;
    fn clear(&mut self);
}

/// Notified after every state transition
pub trait StateListener {
    fn on_state(&mut self, state: ExperimentState, current: Option<&TrialRecord>);
}

impl<F> StateListener for F
where
    F: FnMut(ExperimentState, Option<&TrialRecord>),
{
    fn on_state(&mut self, state: ExperimentState, current: Option<&TrialRecord>) {
        self(state, current)
    }
}

/// Who is running the session and where its files live
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub ra_id: String,
    pub subject_id: String,
    pub session_id: String,
    pub data_dir: PathBuf,
    pub properties_file: PathBuf,
}

impl SessionInfo {
    pub fn identity(&self, config: &ExperimentConfig) -> RecordIdentity {
        RecordIdentity {
            exp_id: config.experiment_id,
            sub_exp_id: config.sub_experiment_id,
            exp_build: env!("CARGO_PKG_VERSION").to_string(),
            exp_build_date: option_env!("AVEX_BUILD_DATE")
                .unwrap_or("unknown")
                .to_string(),
            ra_id: self.ra_id.clone(),
            subject: self.subject_id.clone(),
            session: self.session_id.clone(),
        }
    }
}

pub struct ExperimentStateMachine<P, S, R, W>
where
    P: Presentation,
    S: Scheduler,
    R: Rng,
    W: TrialSink,
{
    pub config: ExperimentConfig,
    state: ExperimentState,
    presentation: P,
    scheduler: S,
    rng: R,
    sink: W,
    identity: RecordIdentity,
    schedule: BlockSchedule,
    counter: TrialCounter,
    recorder: ResponseRecorder,
    position: Option<Position>,
    current: Option<TrialRecord>,
    armed: Option<TimerId>,
    warmup_count: usize,
    warnings: Vec<String>,
    listeners: Vec<Box<dyn StateListener>>,
}

impl<P, S, R, W> ExperimentStateMachine<P, S, R, W>
where
    P: Presentation,
    S: Scheduler,
    R: Rng,
    W: TrialSink,
{
    /// Discovers the trial pool for `session` and lays out the schedule
    pub fn new(
        config: ExperimentConfig,
        session: &SessionInfo,
        presentation: P,
        scheduler: S,
        mut rng: R,
        sink: W,
    ) -> Result<Self, ExperimentError> {
        let catalog = TrialFactory::new(&config, &session.data_dir).build()?;
        let schedule = BlockSequencer::new(&config).build(&catalog, &mut rng)?;
        let identity = session.identity(&config);
        let mut machine =
            Self::with_schedule(config, identity, schedule, presentation, scheduler, rng, sink);
        machine.warnings = catalog.warnings;
        Ok(machine)
    }

    pub fn with_schedule(
        config: ExperimentConfig,
        identity: RecordIdentity,
        schedule: BlockSchedule,
        presentation: P,
        scheduler: S,
        rng: R,
        sink: W,
    ) -> Self {
        Self {
            counter: TrialCounter::new(&config),
            recorder: ResponseRecorder::new(config.response.clone()),
            config,
            state: ExperimentState::Idle,
            presentation,
            scheduler,
            rng,
            sink,
            identity,
            schedule,
            position: None,
            current: None,
            armed: None,
            warmup_count: 0,
            warnings: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: impl StateListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn current(&self) -> Option<&TrialRecord> {
        self.current.as_ref()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn log(&self) -> &[TrialRecord] {
        self.recorder.log()
    }

    pub fn schedule(&self) -> &BlockSchedule {
        &self.schedule
    }

    /// Operator warnings collected while building the trial pool
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn warmup_count(&self) -> usize {
        self.warmup_count
    }

    pub fn armed_timer(&self) -> Option<TimerId> {
        self.armed
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    pub fn start(&mut self) -> Result<bool, ExperimentError> {
        self.handle_event(ExperimentEvent::Start)
    }

    pub fn timer_expired(&mut self, id: TimerId) -> Result<bool, ExperimentError> {
        self.handle_event(ExperimentEvent::TimerExpired(id))
    }

    pub fn presentation_finished(
        &mut self,
        timings: PresentationTimings,
    ) -> Result<bool, ExperimentError> {
        self.handle_event(ExperimentEvent::PresentationFinished(timings))
    }

    /// Submits the response controls; an invalid draft leaves the state as is
    pub fn set_response_values(&mut self, draft: ResponseDraft) -> Result<bool, ExperimentError> {
        self.handle_event(ExperimentEvent::Response(draft))
    }

    pub fn abort(&mut self) -> Result<bool, ExperimentError> {
        self.handle_event(ExperimentEvent::Abort)
    }

    /// Applies one event. Returns `Ok(false)` when the event does not apply to
    /// the current state, including expiries of timers that are no longer armed.
    pub fn handle_event(&mut self, event: ExperimentEvent) -> Result<bool, ExperimentError> {
        use ExperimentState::*;

        match (self.state, event) {
            (state, ExperimentEvent::Abort) if !state.is_terminal() => {
                info!("experiment aborted in {}", state);
                self.transition(Aborted)?;
                Ok(true)
            }

            (Idle, ExperimentEvent::Start) => {
                info!("experiment started");
                let next = if self.config.num_warmup_trials == 0 {
                    TrialFirstDelay
                } else {
                    WarmupDelay
                };
                self.transition(next)?;
                Ok(true)
            }

            (state, ExperimentEvent::TimerExpired(id)) if state.is_timed() => {
                if self.armed != Some(id) {
                    debug!("ignoring stale timer {:?} in {}", id, state);
                    return Ok(false);
                }
                self.armed = None;
                let next = match state {
                    WarmupDelay => WarmupTrial,
                    WarmupPause => WarmupRespond,
                    TrialFirstDelay | TrialDelay => Trial,
                    Pause => Respond,
                    _ => return Ok(false),
                };
                self.transition(next)?;
                Ok(true)
            }

            (state, ExperimentEvent::PresentationFinished(timings)) if state.is_presenting() => {
                self.store_timings(timings);
                self.transition(pause_after(state))?;
                Ok(true)
            }

            (WarmupRespond, ExperimentEvent::Response(draft)) => {
                self.recorder.validate(&draft)?;
                self.warmup_count += 1;
                debug!(
                    "warmup trial {} of {} answered",
                    self.warmup_count, self.config.num_warmup_trials
                );
                let next = if self.warmup_count >= self.config.num_warmup_trials {
                    TrialFirstDelay
                } else {
                    WarmupDelay
                };
                self.transition(next)?;
                Ok(true)
            }

            (Respond, ExperimentEvent::Response(draft)) => {
                let current = self
                    .current
                    .clone()
                    .ok_or_else(|| ExperimentError::Invariant("no current trial".into()))?;
                let logged = self.recorder.record(current, &draft)?;
                self.sink.record(logged)?;
                debug!("trial {} recorded", logged.trial_num);
                self.transition(TrialDelay)?;
                Ok(true)
            }

            _ => Ok(false),
        }
    }

    fn transition(&mut self, mut next: ExperimentState) -> Result<(), ExperimentError> {
        loop {
            debug!("{} -> {}", self.state, next);
            self.state = next;
            let follow = self.enter(next)?;
            self.notify();
            match follow {
                Some(state) => next = state,
                None => return Ok(()),
            }
        }
    }

    /// Runs the entry action of `state`; returns a state to move on to at once
    fn enter(
        &mut self,
        state: ExperimentState,
    ) -> Result<Option<ExperimentState>, ExperimentError> {
        use ExperimentState::*;

        match state {
            Idle => Ok(None),
            WarmupDelay => {
                self.prepare_warmup()?;
                self.arm(self.config.pre_stimulus_silence_ms);
                Ok(None)
            }
            WarmupTrial | Trial => {
                let spec = self
                    .current
                    .as_ref()
                    .map(|r| r.spec.clone())
                    .ok_or_else(|| ExperimentError::Invariant("nothing to present".into()))?;
                match self.presentation.play(&spec) {
                    Playback::Finished(timings) => {
                        self.store_timings(timings);
                        Ok(Some(pause_after(state)))
                    }
                    Playback::Pending => Ok(None),
                }
            }
            WarmupPause | Pause => {
                self.arm(self.config.post_stimulus_silence_ms);
                Ok(None)
            }
            WarmupRespond | Respond => {
                self.presentation.clear();
                Ok(None)
            }
            TrialFirstDelay => {
                let step = self.counter.first(&self.schedule)?;
                self.begin(step)
            }
            TrialDelay => {
                let prev = self
                    .position
                    .ok_or_else(|| ExperimentError::Invariant("no position to advance".into()))?;
                let step = self.counter.advance(&prev, &mut self.schedule, &mut self.rng)?;
                self.begin(step)
            }
            Finish => {
                self.disarm();
                self.current = None;
                self.sink.finish()?;
                info!("experiment finished after {} trials", self.recorder.len());
                Ok(None)
            }
            Aborted => {
                self.disarm();
                self.current = None;
                self.sink.abort()?;
                Ok(None)
            }
        }
    }

    fn begin(&mut self, step: Step) -> Result<Option<ExperimentState>, ExperimentError> {
        let position = match step {
            Step::Finished => return Ok(Some(ExperimentState::Finish)),
            Step::Trial(position) => position,
        };
        let block = self
            .schedule
            .get(position.block_in_metablock)
            .ok_or_else(|| ExperimentError::Invariant("block outside the schedule".into()))?;
        let spec = block.trial(position.block_trial).ok_or_else(|| {
            ExperimentError::Invariant(format!(
                "trial {} outside a {}-trial block",
                position.block_trial,
                block.len()
            ))
        })?;
        self.current = Some(TrialRecord::new(
            &self.identity,
            &position,
            block.block_type,
            spec,
            time_stamp(),
        ));
        self.position = Some(position);
        self.arm(self.config.pre_stimulus_silence_ms);
        Ok(None)
    }

    /// Draws a random exemplar from the first scheduled block
    fn prepare_warmup(&mut self) -> Result<(), ExperimentError> {
        let block = self.schedule.get(0).ok_or(ExperimentError::EmptySchedule)?;
        if block.is_empty() {
            return Err(ExperimentError::Invariant("warmup block has no trials".into()));
        }
        let index = self.rng.random_range(0..block.len());
        let spec = block
            .trial(index)
            .ok_or_else(|| ExperimentError::Invariant("warmup trial out of range".into()))?;
        self.current = Some(TrialRecord::new(
            &self.identity,
            &Position::default(),
            block.block_type,
            spec,
            time_stamp(),
        ));
        Ok(())
    }

    fn store_timings(&mut self, timings: PresentationTimings) {
        match self.current.as_mut() {
            Some(record) => record.timings = timings,
            None => warn!("presentation timings arrived without a current trial"),
        }
    }

    fn arm(&mut self, delay_ms: u64) {
        self.disarm();
        self.armed = Some(self.scheduler.schedule(Duration::from_millis(delay_ms)));
    }

    fn disarm(&mut self) {
        if let Some(id) = self.armed.take() {
            self.scheduler.cancel(id);
        }
    }

    fn notify(&mut self) {
        let current = self.current.as_ref();
        for listener in &mut self.listeners {
            listener.on_state(self.state, current);
        }
    }
}

fn pause_after(state: ExperimentState) -> ExperimentState {
    if state.is_warmup() {
        ExperimentState::WarmupPause
    } else {
        ExperimentState::Pause
    }
}

fn time_stamp() -> String {
    chrono::Local::now().format(TIME_STAMP_FORMAT).to_string()
}
