use serde::{Deserialize, Serialize};

/// One of the two mutually exclusive order-judgment answers
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryAnswer {
    Positive,
    Negative,
}

impl BinaryAnswer {
    /// Offset sign this answer claims
    pub fn direction(&self) -> i64 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
        }
    }

    /// Whether the answer matches the sign of the audio offset.
    ///
    /// Returns `None` for a zero or missing offset, where neither answer is right.
    pub fn matches_offset(&self, audio_offset: Option<i64>) -> Option<bool> {
        match audio_offset?.signum() {
            0 => None,
            sign => Some(sign == self.direction()),
        }
    }
}

/// A validated subject response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Slider ratings of duration and audio/visual agreement
    Rating { duration: i64, agreement: i64 },
    /// Forced choice plus confidence level
    OrderJudgment {
        answer: BinaryAnswer,
        label: String,
        confidence: i64,
    },
}

/// Raw response controls as the UI holds them at submit time.
///
/// `None` means the control was never touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseDraft {
    Rating {
        duration: Option<i64>,
        agreement: Option<i64>,
    },
    OrderJudgment {
        label: Option<String>,
        confidence: Option<i64>,
    },
}
