use crate::error::{ConfigError, PropertyError};
use crate::properties::PropertyStore;
use avex_core::{BlockMap, BlockType, ExperimentState};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per block type inclusion and repetition policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockSettings {
    pub include: bool,
    /// Presented as one schedule entry revisited `block_set_repetitions` times
    pub single: bool,
    /// Reshuffle a single block's trials on every revisit
    pub full_random: bool,
}

/// The two stimulus file families trials are built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Audio,
    Animation,
}

impl MediaKind {
    /// Property key prefix, as in `audioFileFormat`
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Animation => "animation",
        }
    }
}

/// How stimulus file names for one media kind are found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSource {
    /// Parameter names substituted into `format`, slowest-varying first
    pub params: Vec<String>,
    /// File stem template with `${name}` or `{name}` placeholders
    pub format: String,
    /// Candidate extensions without the dot, in preference order
    pub extensions: Vec<String>,
    pub subdirectory: String,
}

impl FileSource {
    /// Reads the media keys, strictly when an included block needs them,
    /// otherwise only if the extensions are configured.
    fn load_for(
        store: &PropertyStore,
        media: MediaKind,
        needed: bool,
        templated: bool,
        fallback: &FileSource,
    ) -> Result<Self, PropertyError> {
        if needed {
            Self::load(store, media, templated)
        } else if store.contains(&format!("{}FileExtensions", media.prefix())) {
            Self::load(store, media, false)
        } else {
            Ok(fallback.clone())
        }
    }

    fn load(
        store: &PropertyStore,
        media: MediaKind,
        templated: bool,
    ) -> Result<Self, PropertyError> {
        let p = media.prefix();
        let key = |suffix: &str| format!("{p}{suffix}");
        Ok(Self {
            params: if templated {
                store.get_array(&key("Params"))?
            } else {
                store.get_opt_array(&key("Params")).unwrap_or_default()
            },
            format: if templated {
                store.get_str(&key("FileFormat"))?.to_string()
            } else {
                store.get_opt_str(&key("FileFormat")).unwrap_or_default().to_string()
            },
            extensions: store.get_array(&key("FileExtensions"))?,
            subdirectory: store
                .get_opt_str(&key("FileSubDirectory"))
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResponseMode {
    /// Duration and agreement sliders
    Rating {
        duration: (i64, i64),
        agreement: (i64, i64),
    },
    /// Temporal-order judgment with confidence
    OrderJudgment {
        positive_label: String,
        negative_label: String,
        confidence_min: i64,
        confidence_levels: i64,
    },
}

/// Opaque operator texts shown while a state is active
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusTexts {
    pub warmup_delay: Option<String>,
    pub during_trial: Option<String>,
    pub enter_response: Option<String>,
    pub first_delay: Option<String>,
    pub trial_delay: Option<String>,
}

impl StatusTexts {
    fn load(store: &PropertyStore) -> Self {
        let text = |key: &str| store.get_opt_str(key).map(str::to_string);
        Self {
            warmup_delay: text("warmupDelayText"),
            during_trial: text("duringTrialText"),
            enter_response: text("enterResponseText"),
            first_delay: text("firstDelayText"),
            trial_delay: text("trialDelayText"),
        }
    }

    pub fn for_state(&self, state: ExperimentState) -> Option<&str> {
        use ExperimentState::*;
        match state {
            WarmupDelay => self.warmup_delay.as_deref(),
            WarmupTrial | Trial => self.during_trial.as_deref(),
            WarmupRespond | Respond => self.enter_response.as_deref(),
            TrialFirstDelay => self.first_delay.as_deref(),
            TrialDelay => self.trial_delay.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentConfig {
    pub experiment_id: i64,
    pub sub_experiment_id: i64,
    pub debug: bool,
    pub blocks: BlockMap<BlockSettings>,
    pub block_set_repetitions: usize,
    pub metablocks: usize,
    pub randomize_blocks: bool,
    pub randomize_trials: bool,
    pub sound_offsets: Vec<i64>,
    pub num_animation_points: Vec<u32>,
    pub audio_files: FileSource,
    pub animation_files: FileSource,
    /// Admissible values of every parameter named in a `*Params` key
    pub parameters: BTreeMap<String, Vec<String>>,
    /// Scan subdirectories instead of expanding file name templates
    pub load_trials_from_folder: bool,
    /// Playlist file stem inside the data directory, when `usePlaylist` is set
    pub playlist: Option<String>,
    pub pre_stimulus_silence_ms: u64,
    pub post_stimulus_silence_ms: u64,
    pub num_warmup_trials: usize,
    pub response: ResponseMode,
    pub texts: StatusTexts,
    pub random_seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let mut blocks = BlockMap::<BlockSettings>::default();
        blocks[BlockType::Audio].include = true;
        Self {
            experiment_id: 0,
            sub_experiment_id: 0,
            debug: false,
            blocks,
            block_set_repetitions: 1,
            metablocks: 1,
            randomize_blocks: false,
            randomize_trials: false,
            sound_offsets: vec![-100, 100],
            num_animation_points: vec![1],
            audio_files: FileSource {
                extensions: vec!["wav".into()],
                subdirectory: "aud".into(),
                ..FileSource::default()
            },
            animation_files: FileSource {
                extensions: vec!["txt".into()],
                subdirectory: "vis".into(),
                ..FileSource::default()
            },
            parameters: BTreeMap::new(),
            load_trials_from_folder: true,
            playlist: None,
            pre_stimulus_silence_ms: 1000,
            post_stimulus_silence_ms: 1000,
            num_warmup_trials: 0,
            response: ResponseMode::OrderJudgment {
                positive_label: "Audio first".into(),
                negative_label: "Visual first".into(),
                confidence_min: -2,
                confidence_levels: 5,
            },
            texts: StatusTexts::default(),
            random_seed: None,
        }
    }
}

impl ExperimentConfig {
    pub fn from_properties(store: &PropertyStore) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut blocks = BlockMap::<BlockSettings>::default();
        for ty in BlockType::ALL {
            let name = ty.as_str();
            let fallback = &defaults.blocks[ty];
            blocks[ty] = BlockSettings {
                include: store
                    .get_opt_bool(&format!("include{name}Block"))?
                    .unwrap_or(fallback.include),
                single: store
                    .get_opt_bool(&format!("single{name}Block"))?
                    .unwrap_or(fallback.single),
                full_random: store
                    .get_opt_bool(&format!("single{name}FullRandom"))?
                    .unwrap_or(fallback.full_random),
            };
        }

        let needs_audio = BlockType::ALL
            .iter()
            .any(|t| blocks[*t].include && t.has_audio());
        let needs_animation = BlockType::ALL
            .iter()
            .any(|t| blocks[*t].include && t.has_animation());

        let load_trials_from_folder = store
            .get_opt_bool("loadTrialsFromFolder")?
            .unwrap_or(defaults.load_trials_from_folder);
        let templated = !load_trials_from_folder;

        // Media of excluded block types is still read when configured so a
        // saved playlist covers every block type.
        let audio_files = FileSource::load_for(
            store,
            MediaKind::Audio,
            needs_audio,
            templated,
            &defaults.audio_files,
        )?;
        let animation_files = FileSource::load_for(
            store,
            MediaKind::Animation,
            needs_animation,
            templated,
            &defaults.animation_files,
        )?;

        let mut parameters = BTreeMap::new();
        for (source, needed) in [(&audio_files, needs_audio), (&animation_files, needs_animation)] {
            for name in &source.params {
                if needed {
                    parameters.insert(name.clone(), store.get_array(name)?);
                } else if let Some(values) = store.get_opt_array(name) {
                    parameters.entry(name.clone()).or_insert(values);
                }
            }
        }

        let sound_offsets = if needs_audio {
            store.get_int_array("soundOffsets")?
        } else {
            store.get_opt_int_array("soundOffsets")?.unwrap_or_default()
        };
        let num_animation_points = if needs_animation {
            store.get_int_array("numAnimationPoints")?
        } else {
            store
                .get_opt_int_array("numAnimationPoints")?
                .unwrap_or_default()
        };
        let num_animation_points = num_animation_points
            .into_iter()
            .map(|n| at_least("numAnimationPoints", n, 0).map(|n| n as u32))
            .collect::<Result<Vec<u32>, _>>()?;

        let playlist = if store.get_opt_bool("usePlaylist")?.unwrap_or(false) {
            Some(store.get_str("playlistName")?.to_string())
        } else {
            None
        };

        Ok(Self {
            experiment_id: store.get_int("experimentID")?,
            sub_experiment_id: store.get_int("subExperimentID")?,
            debug: store.get_opt_bool("debug")?.unwrap_or(defaults.debug),
            blocks,
            block_set_repetitions: count(store, "blockSetRepetitions", 1)?,
            metablocks: count(store, "metablocks", 1)?,
            randomize_blocks: store
                .get_opt_bool("randomizeBlocks")?
                .unwrap_or(defaults.randomize_blocks),
            randomize_trials: store
                .get_opt_bool("randomizeTrials")?
                .unwrap_or(defaults.randomize_trials),
            sound_offsets,
            num_animation_points,
            audio_files,
            animation_files,
            parameters,
            load_trials_from_folder,
            playlist,
            pre_stimulus_silence_ms: count(store, "preStimulusSilence", 0)? as u64,
            post_stimulus_silence_ms: count(store, "postStimulusSilence", 0)? as u64,
            num_warmup_trials: count(store, "numWarmupTrials", 0)?,
            response: load_response_mode(store)?,
            texts: StatusTexts::load(store),
            random_seed: store
                .get_opt_int("randomSeed")?
                .map(|s| at_least("randomSeed", s, 0).map(|s| s as u64))
                .transpose()?,
        })
    }

    pub fn included_blocks(&self) -> impl Iterator<Item = BlockType> + '_ {
        BlockType::ALL.into_iter().filter(|t| self.blocks[*t].include)
    }
}

fn load_response_mode(store: &PropertyStore) -> Result<ResponseMode, ConfigError> {
    let kind = match store.get_opt_str("responseType") {
        Some(kind) => kind.to_string(),
        None if store.contains("answerPositive.label") => "orderJudgment".to_string(),
        None => "rating".to_string(),
    };

    match kind.as_str() {
        "orderJudgment" => {
            let confidence_min = store.get_int("confidenceMin")?;
            let confidence_levels = match store.get_opt_int("confidenceLevels")? {
                Some(n) => at_least("confidenceLevels", n, 1)?,
                None => 5,
            };
            Ok(ResponseMode::OrderJudgment {
                positive_label: store.get_str("answerPositive.label")?.to_string(),
                negative_label: store.get_str("answerNegative.label")?.to_string(),
                confidence_min,
                confidence_levels,
            })
        }
        "rating" => Ok(ResponseMode::Rating {
            duration: range(store, "durationMin", "durationMax")?,
            agreement: range(store, "agreementMin", "agreementMax")?,
        }),
        other => Err(ConfigError::UnknownResponseType(other.to_string())),
    }
}

fn range(
    store: &PropertyStore,
    min_key: &'static str,
    max_key: &'static str,
) -> Result<(i64, i64), ConfigError> {
    let min = store.get_int(min_key)?;
    let max = store.get_int(max_key)?;
    if min > max {
        return Err(ConfigError::EmptyRange {
            min_key,
            max_key,
            min,
            max,
        });
    }
    Ok((min, max))
}

fn count(store: &PropertyStore, key: &'static str, min: i64) -> Result<usize, ConfigError> {
    at_least(key, store.get_int(key)?, min).map(|v| v as usize)
}

fn at_least(key: &'static str, value: i64, min: i64) -> Result<i64, ConfigError> {
    if value < min {
        return Err(ConfigError::TooSmall { key, min, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toj_properties() -> PropertyStore {
        PropertyStore::parse(
            "\
experimentID=2
subExperimentID=0
includeAudioBlock=true
singleAudioBlock=true
singleAudioFullRandom=false
includeAnimationBlock=false
includeAudioAnimationBlock=false
blockSetRepetitions=3
metablocks=2
randomizeBlocks=false
randomizeTrials=false
loadTrialsFromFolder=false
soundOffsets=-100,100
audioParams=pitches,frequencies
audioFileFormat=${pitches}_${frequencies}
audioFileExtensions=wav,aiff
audioFileSubDirectory=aud
pitches=a,d
frequencies=330
preStimulusSilence=500
postStimulusSilence=750
numWarmupTrials=2
answerPositive.label=Tone first
answerNegative.label=Dot first
confidenceMin=-2
enterResponseText=Respond now
",
        )
    }

    #[test]
    fn test_load_order_judgment_config() {
        let config = ExperimentConfig::from_properties(&toj_properties()).unwrap();
        assert_eq!(config.experiment_id, 2);
        assert!(config.blocks[BlockType::Audio].include);
        assert!(config.blocks[BlockType::Audio].single);
        assert!(!config.blocks[BlockType::Animation].include);
        assert_eq!(config.block_set_repetitions, 3);
        assert_eq!(config.metablocks, 2);
        assert_eq!(config.sound_offsets, vec![-100, 100]);
        assert_eq!(config.audio_files.params, vec!["pitches", "frequencies"]);
        assert_eq!(config.parameters["pitches"], vec!["a", "d"]);
        assert_eq!(config.parameters["frequencies"], vec!["330"]);
        assert_eq!(config.pre_stimulus_silence_ms, 500);
        assert_eq!(config.num_warmup_trials, 2);
        assert_eq!(
            config.response,
            ResponseMode::OrderJudgment {
                positive_label: "Tone first".into(),
                negative_label: "Dot first".into(),
                confidence_min: -2,
                confidence_levels: 5,
            }
        );
        assert_eq!(
            config.texts.for_state(ExperimentState::Respond),
            Some("Respond now")
        );
        assert_eq!(config.included_blocks().collect::<Vec<_>>(), vec![BlockType::Audio]);
    }

    #[test]
    fn test_absent_optional_keys_take_defaults() {
        let mut store = PropertyStore::new();
        for (k, v) in [
            ("experimentID", "1"),
            ("subExperimentID", "0"),
            ("blockSetRepetitions", "1"),
            ("metablocks", "1"),
            ("soundOffsets", "-50,50"),
            ("audioFileExtensions", "wav"),
            ("preStimulusSilence", "0"),
            ("postStimulusSilence", "0"),
            ("numWarmupTrials", "0"),
            ("answerPositive.label", "A"),
            ("answerNegative.label", "V"),
            ("confidenceMin", "0"),
        ] {
            store.insert(k, v);
        }
        let config = ExperimentConfig::from_properties(&store).unwrap();
        let defaults = ExperimentConfig::default();
        assert_eq!(config.load_trials_from_folder, defaults.load_trials_from_folder);
        assert_eq!(config.blocks, defaults.blocks);
        assert_eq!(config.debug, defaults.debug);
        assert_eq!(config.randomize_blocks, defaults.randomize_blocks);
        assert_eq!(config.randomize_trials, defaults.randomize_trials);
    }

    #[test]
    fn test_excluded_media_read_when_configured() {
        let mut store = toj_properties();
        store.insert("animationParams", "shapes");
        store.insert("animationFileFormat", "${shapes}");
        store.insert("animationFileExtensions", "txt");
        store.insert("animationFileSubDirectory", "dots");
        store.insert("shapes", "ring,bar");
        store.insert("numAnimationPoints", "3,6");
        let config = ExperimentConfig::from_properties(&store).unwrap();

        assert!(!config.blocks[BlockType::Animation].include);
        assert_eq!(config.animation_files.subdirectory, "dots");
        assert_eq!(config.parameters["shapes"], vec!["ring", "bar"]);
        assert_eq!(config.num_animation_points, vec![3, 6]);

        // without the keys, nothing about animation is required
        let config = ExperimentConfig::from_properties(&toj_properties()).unwrap();
        assert_eq!(config.animation_files, ExperimentConfig::default().animation_files);
        assert!(config.num_animation_points.is_empty());
    }

    #[test]
    fn test_rating_mode_config() {
        let mut store = toj_properties();
        store.insert("responseType", "rating");
        store.insert("durationMin", "1");
        store.insert("durationMax", "100");
        store.insert("agreementMin", "1");
        store.insert("agreementMax", "7");
        let config = ExperimentConfig::from_properties(&store).unwrap();
        assert_eq!(
            config.response,
            ResponseMode::Rating {
                duration: (1, 100),
                agreement: (1, 7)
            }
        );
    }

    #[test]
    fn test_response_type_inferred_from_labels() {
        let store = toj_properties();
        assert!(matches!(
            load_response_mode(&store),
            Ok(ResponseMode::OrderJudgment { .. })
        ));

        let mut rating = PropertyStore::new();
        let keys = [
            ("durationMin", "0"),
            ("durationMax", "9"),
            ("agreementMin", "0"),
            ("agreementMax", "4"),
        ];
        for (k, v) in keys {
            rating.insert(k, v);
        }
        assert!(matches!(load_response_mode(&rating), Ok(ResponseMode::Rating { .. })));
    }

    #[test]
    fn test_missing_parameter_values_fail() {
        let mut store = toj_properties();
        store.insert("audioParams", "pitches,envelopes");
        let err = ExperimentConfig::from_properties(&store).unwrap_err();
        assert!(err.to_string().contains("envelopes"));
    }

    #[test]
    fn test_zero_metablocks_rejected() {
        let mut store = toj_properties();
        store.insert("metablocks", "0");
        assert!(matches!(
            ExperimentConfig::from_properties(&store),
            Err(ConfigError::TooSmall { key: "metablocks", .. })
        ));
    }

    #[test]
    fn test_empty_rating_range_rejected() {
        let mut store = toj_properties();
        store.insert("responseType", "rating");
        store.insert("durationMin", "10");
        store.insert("durationMax", "1");
        store.insert("agreementMin", "1");
        store.insert("agreementMax", "7");
        assert!(matches!(
            ExperimentConfig::from_properties(&store),
            Err(ConfigError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_playlist_requires_name() {
        let mut store = toj_properties();
        store.insert("usePlaylist", "true");
        assert!(ExperimentConfig::from_properties(&store).is_err());
        store.insert("playlistName", "session_a");
        let config = ExperimentConfig::from_properties(&store).unwrap();
        assert_eq!(config.playlist.as_deref(), Some("session_a"));
    }
}
