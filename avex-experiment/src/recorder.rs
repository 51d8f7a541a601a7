use crate::config::ResponseMode;
use crate::error::ResponseError;
use avex_core::{BinaryAnswer, Response, ResponseDraft, TrialRecord};

/// Validates subject responses and keeps the append-only trial log
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    mode: ResponseMode,
    log: Vec<TrialRecord>,
}

impl ResponseRecorder {
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            mode,
            log: Vec::new(),
        }
    }

    /// Checks a draft against the response mode without touching the log
    pub fn validate(&self, draft: &ResponseDraft) -> Result<Response, ResponseError> {
        match (&self.mode, draft) {
            (
                ResponseMode::Rating {
                    duration: duration_range,
                    agreement: agreement_range,
                },
                ResponseDraft::Rating {
                    duration,
                    agreement,
                },
            ) => {
                let duration = duration.ok_or(ResponseError::MissingDuration)?;
                let agreement = agreement.ok_or(ResponseError::MissingAgreement)?;
                in_range("duration", duration, *duration_range)?;
                in_range("agreement", agreement, *agreement_range)?;
                Ok(Response::Rating {
                    duration,
                    agreement,
                })
            }
            (
                ResponseMode::OrderJudgment {
                    positive_label,
                    negative_label,
                    confidence_min,
                    confidence_levels,
                },
                ResponseDraft::OrderJudgment { label, confidence },
            ) => {
                let label = label.as_deref().ok_or(ResponseError::MissingAnswer)?;
                let confidence = confidence.ok_or(ResponseError::MissingConfidence)?;
                let answer = if label == positive_label.as_str() {
                    BinaryAnswer::Positive
                } else if label == negative_label.as_str() {
                    BinaryAnswer::Negative
                } else {
                    return Err(ResponseError::UnknownAnswer(label.to_string()));
                };
                let max = confidence_min + confidence_levels - 1;
                in_range("confidence", confidence, (*confidence_min, max))?;
                Ok(Response::OrderJudgment {
                    answer,
                    label: label.to_string(),
                    confidence,
                })
            }
            _ => Err(ResponseError::WrongKind),
        }
    }

    /// Validates the draft, merges it into `record` and appends the record
    pub fn record(
        &mut self,
        mut record: TrialRecord,
        draft: &ResponseDraft,
    ) -> Result<&TrialRecord, ResponseError> {
        let response = self.validate(draft)?;
        record.response_correct = match &response {
            Response::OrderJudgment { answer, .. } => {
                answer.matches_offset(record.spec.audio_offset)
            }
            Response::Rating { .. } => None,
        };
        record.response = Some(response);
        self.log.push(record);
        Ok(&self.log[self.log.len() - 1])
    }

    pub fn log(&self) -> &[TrialRecord] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

fn in_range(field: &'static str, value: i64, (min, max): (i64, i64)) -> Result<(), ResponseError> {
    if value < min || value > max {
        return Err(ResponseError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avex_core::{BlockType, Position, RecordIdentity, TrialSpec};

    fn toj() -> ResponseRecorder {
        ResponseRecorder::new(ResponseMode::OrderJudgment {
            positive_label: "Audio first".into(),
            negative_label: "Visual first".into(),
            confidence_min: -2,
            confidence_levels: 5,
        })
    }

    fn record_with_offset(offset: i64) -> TrialRecord {
        TrialRecord::new(
            &RecordIdentity::default(),
            &Position::default(),
            BlockType::AudioAnimation,
            TrialSpec {
                audio_file: Some("a.wav".into()),
                vis_file: Some("v.txt".into()),
                audio_offset: Some(offset),
                num_dots: Some(1),
            },
            "t".into(),
        )
    }

    fn judgment(label: &str, confidence: i64) -> ResponseDraft {
        ResponseDraft::OrderJudgment {
            label: Some(label.into()),
            confidence: Some(confidence),
        }
    }

    #[test]
    fn test_correctness_follows_offset_sign() {
        let mut recorder = toj();
        let cases = [
            (100, "Audio first", Some(true)),
            (-100, "Audio first", Some(false)),
            (-100, "Visual first", Some(true)),
            (100, "Visual first", Some(false)),
            (0, "Audio first", None),
            (0, "Visual first", None),
        ];
        for (offset, label, expected) in cases {
            let record = recorder
                .record(record_with_offset(offset), &judgment(label, 0))
                .unwrap();
            assert_eq!(record.response_correct, expected, "{offset} {label}");
        }
        assert_eq!(recorder.len(), cases.len());
    }

    #[test]
    fn test_incomplete_judgment_is_rejected() {
        let mut recorder = toj();
        let no_answer = ResponseDraft::OrderJudgment {
            label: None,
            confidence: Some(1),
        };
        let no_confidence = ResponseDraft::OrderJudgment {
            label: Some("Audio first".into()),
            confidence: None,
        };
        assert_eq!(
            recorder.record(record_with_offset(1), &no_answer).unwrap_err(),
            ResponseError::MissingAnswer
        );
        assert_eq!(
            recorder.validate(&no_confidence).unwrap_err(),
            ResponseError::MissingConfidence
        );
        assert!(matches!(
            recorder.validate(&judgment("Both", 0)),
            Err(ResponseError::UnknownAnswer(_))
        ));
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_confidence_bounds() {
        let recorder = toj();
        assert!(recorder.validate(&judgment("Audio first", -2)).is_ok());
        assert!(recorder.validate(&judgment("Audio first", 2)).is_ok());
        assert!(matches!(
            recorder.validate(&judgment("Audio first", 3)),
            Err(ResponseError::OutOfRange { field: "confidence", .. })
        ));
        assert!(recorder.validate(&judgment("Audio first", -3)).is_err());
    }

    #[test]
    fn test_rating_requires_both_sliders() {
        let mut recorder = ResponseRecorder::new(ResponseMode::Rating {
            duration: (1, 100),
            agreement: (1, 7),
        });
        let untouched = ResponseDraft::Rating {
            duration: Some(50),
            agreement: None,
        };
        assert_eq!(
            recorder.validate(&untouched).unwrap_err(),
            ResponseError::MissingAgreement
        );
        let out_of_range = ResponseDraft::Rating {
            duration: Some(101),
            agreement: Some(3),
        };
        assert!(recorder.validate(&out_of_range).is_err());
        assert_eq!(
            recorder.validate(&judgment("Audio first", 0)).unwrap_err(),
            ResponseError::WrongKind
        );

        let ok = ResponseDraft::Rating {
            duration: Some(40),
            agreement: Some(7),
        };
        let record = recorder.record(record_with_offset(100), &ok).unwrap();
        assert_eq!(
            record.response,
            Some(Response::Rating {
                duration: 40,
                agreement: 7
            })
        );
        assert_eq!(record.response_correct, None);
    }
}
