use serde::{Deserialize, Serialize};

/// Lifecycle of one experiment run
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExperimentState {
    #[default]
    Idle,
    WarmupDelay,
    WarmupTrial,
    WarmupPause,
    WarmupRespond,
    TrialFirstDelay,
    Trial,
    Pause,
    Respond,
    TrialDelay,
    Finish,
    /// Abandoned by the host before completion
    Aborted,
}

impl ExperimentState {
    pub fn as_str(&self) -> &'static str {
        use ExperimentState::*;
        match self {
            Idle => "IDLE",
            WarmupDelay => "WARMUP_DELAY",
            WarmupTrial => "WARMUP_TRIAL",
            WarmupPause => "WARMUP_PAUSE",
            WarmupRespond => "WARMUP_RESPOND",
            TrialFirstDelay => "TRIAL_FIRST_DELAY",
            Trial => "TRIAL",
            Pause => "PAUSE",
            Respond => "RESPOND",
            TrialDelay => "TRIAL_DELAY",
            Finish => "FINISH",
            Aborted => "ABORTED",
        }
    }

    pub fn is_warmup(&self) -> bool {
        matches!(
            self,
            Self::WarmupDelay | Self::WarmupTrial | Self::WarmupPause | Self::WarmupRespond
        )
    }

    pub fn allows_response(&self) -> bool {
        matches!(self, Self::WarmupRespond | Self::Respond)
    }

    pub fn is_presenting(&self) -> bool {
        matches!(self, Self::WarmupTrial | Self::Trial)
    }

    /// States that count down a pre- or post-stimulus silence
    pub fn is_timed(&self) -> bool {
        matches!(
            self,
            Self::WarmupDelay
                | Self::WarmupPause
                | Self::TrialFirstDelay
                | Self::Pause
                | Self::TrialDelay
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish | Self::Aborted)
    }
}

impl std::fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
