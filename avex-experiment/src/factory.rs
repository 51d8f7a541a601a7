use crate::config::{ExperimentConfig, FileSource, MediaKind};
use crate::error::ExperimentError;
use crate::playlist;
use avex_core::{BlockMap, BlockType, TrialSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cross product of stimulus files and parameters, decoded on demand.
///
/// Dimensions nest as audio file, animation file, sound offset, dot count
/// with the last varying fastest. Dimensions the block type does not use
/// count as a single empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialProduct {
    pub block_type: BlockType,
    pub audio_files: Vec<PathBuf>,
    pub vis_files: Vec<PathBuf>,
    pub offsets: Vec<i64>,
    pub dots: Vec<u32>,
}

impl TrialProduct {
    fn dims(&self) -> [usize; 4] {
        let audio = self.block_type.has_audio();
        let animation = self.block_type.has_animation();
        [
            if audio { self.audio_files.len() } else { 1 },
            if animation { self.vis_files.len() } else { 1 },
            if audio { self.offsets.len() } else { 1 },
            if animation { self.dots.len() } else { 1 },
        ]
    }

    pub fn len(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<TrialSpec> {
        if index >= self.len() {
            return None;
        }
        let mut rest = index;
        let mut digits = [0usize; 4];
        for (digit, size) in digits.iter_mut().zip(self.dims()).rev() {
            *digit = rest % size;
            rest /= size;
        }
        let [a, v, o, d] = digits;

        let audio = self.block_type.has_audio();
        let animation = self.block_type.has_animation();
        Some(TrialSpec {
            audio_file: audio.then(|| self.audio_files[a].clone()),
            vis_file: animation.then(|| self.vis_files[v].clone()),
            audio_offset: audio.then(|| self.offsets[o]),
            num_dots: animation.then(|| self.dots[d]),
        })
    }
}

/// Trials of one block prototype
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialSet {
    /// Loaded row by row from a playlist
    Listed(Vec<TrialSpec>),
    Product(TrialProduct),
}

impl TrialSet {
    pub fn len(&self) -> usize {
        match self {
            Self::Listed(trials) => trials.len(),
            Self::Product(product) => product.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<TrialSpec> {
        match self {
            Self::Listed(trials) => trials.get(index).cloned(),
            Self::Product(product) => product.get(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = TrialSpec> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

#[derive(Debug, Clone)]
pub struct BlockPrototype {
    pub block_type: BlockType,
    pub single: bool,
    pub trials: Arc<TrialSet>,
}

impl BlockPrototype {
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Block prototypes of all three block types, plus operator warnings.
///
/// Only the included types are sequenced; the others are kept so a saved
/// playlist serves sessions that include them.
#[derive(Debug, Clone, Default)]
pub struct TrialCatalog {
    pub prototypes: BlockMap<Option<BlockPrototype>>,
    pub warnings: Vec<String>,
}

impl TrialCatalog {
    pub fn get(&self, ty: BlockType) -> Option<&BlockPrototype> {
        self.prototypes[ty].as_ref()
    }

    pub fn trial_count(&self, ty: BlockType) -> usize {
        self.get(ty).map_or(0, BlockPrototype::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockPrototype> {
        self.prototypes.iter().filter_map(|(_, p)| p.as_ref())
    }
}

/// Builds block prototypes from the configuration and the data directory
pub struct TrialFactory<'a> {
    config: &'a ExperimentConfig,
    data_dir: &'a Path,
}

impl<'a> TrialFactory<'a> {
    pub fn new(config: &'a ExperimentConfig, data_dir: &'a Path) -> Self {
        Self { config, data_dir }
    }

    pub fn playlist_path(&self) -> Option<PathBuf> {
        self.config
            .playlist
            .as_ref()
            .map(|name| self.data_dir.join(format!("{name}.csv")))
    }

    /// Loads the playlist when one exists; otherwise generates the trial pool
    /// and, if a playlist is configured, saves it for later runs.
    pub fn build(&self) -> Result<TrialCatalog, ExperimentError> {
        let playlist_path = self.playlist_path();

        let mut catalog = match &playlist_path {
            Some(path) if path.exists() => {
                info!("loading trials from playlist {}", path.display());
                self.from_playlist(path)?
            }
            _ => self.generate()?,
        };

        if let Some(path) = playlist_path.filter(|p| !p.exists()) {
            if catalog.iter().all(BlockPrototype::is_empty) {
                let msg = format!("no trials generated, playlist {} not saved", path.display());
                warn!("{msg}");
                catalog.warnings.push(msg);
            } else {
                playlist::write(&path, &catalog)?;
                info!("saved playlist {}", path.display());
            }
        }

        for ty in self.config.included_blocks() {
            if catalog.trial_count(ty) == 0 {
                let msg = format!("block type '{ty}' is included but has no trials");
                warn!("{msg}");
                catalog.warnings.push(msg);
            } else {
                debug!("{} block: {} trials", ty, catalog.trial_count(ty));
            }
        }

        Ok(catalog)
    }

    fn from_playlist(&self, path: &Path) -> Result<TrialCatalog, ExperimentError> {
        let (rows, warnings) = playlist::read(path, self.config, self.data_dir)?;
        let mut catalog = TrialCatalog {
            warnings,
            ..TrialCatalog::default()
        };
        for ty in BlockType::ALL {
            catalog.prototypes[ty] = Some(BlockPrototype {
                block_type: ty,
                single: self.config.blocks[ty].single,
                trials: Arc::new(TrialSet::Listed(rows[ty].clone())),
            });
        }
        Ok(catalog)
    }

    fn generate(&self) -> Result<TrialCatalog, ExperimentError> {
        let mut catalog = TrialCatalog::default();
        let included: Vec<BlockType> = self.config.included_blocks().collect();

        let audio_files = self.media_files(
            MediaKind::Audio,
            included.iter().any(BlockType::has_audio),
            &mut catalog.warnings,
        )?;
        let vis_files = self.media_files(
            MediaKind::Animation,
            included.iter().any(BlockType::has_animation),
            &mut catalog.warnings,
        )?;

        for ty in BlockType::ALL {
            let product = TrialProduct {
                block_type: ty,
                audio_files: audio_files.clone(),
                vis_files: vis_files.clone(),
                offsets: self.config.sound_offsets.clone(),
                dots: self.config.num_animation_points.clone(),
            };
            catalog.prototypes[ty] = Some(BlockPrototype {
                block_type: ty,
                single: self.config.blocks[ty].single,
                trials: Arc::new(TrialSet::Product(product)),
            });
        }
        Ok(catalog)
    }

    fn source(&self, media: MediaKind) -> &FileSource {
        match media {
            MediaKind::Audio => &self.config.audio_files,
            MediaKind::Animation => &self.config.animation_files,
        }
    }

    /// Media no included block needs is looked up quietly; a failed lookup
    /// leaves those block types empty.
    fn media_files(
        &self,
        media: MediaKind,
        needed: bool,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<PathBuf>, ExperimentError> {
        if needed {
            return self.discover(media, warnings);
        }
        self.locate(media, false).or_else(|e| {
            debug!("no {} files for excluded blocks: {e}", media.prefix());
            Ok(Vec::new())
        })
    }

    /// Stimulus files for one media kind
    pub fn discover(
        &self,
        media: MediaKind,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<PathBuf>, ExperimentError> {
        let files = self.locate(media, true)?;

        if files.is_empty() {
            let msg = format!(
                "Unable to locate any files for the '{}' block. Please ensure that the correct \
                 data directory is selected and that the properties file contains the relevant \
                 file parameters",
                media.prefix()
            );
            warn!("{msg}");
            warnings.push(msg);
        }
        Ok(files)
    }

    fn locate(&self, media: MediaKind, needed: bool) -> Result<Vec<PathBuf>, ExperimentError> {
        if self.config.load_trials_from_folder {
            self.scan_directory(media, needed)
        } else {
            self.expand_templates(media, needed)
        }
    }

    fn expand_templates(
        &self,
        media: MediaKind,
        needed: bool,
    ) -> Result<Vec<PathBuf>, ExperimentError> {
        let source = self.source(media);
        let dir = self.data_dir.join(&source.subdirectory);

        let mut value_sets = Vec::with_capacity(source.params.len());
        for name in &source.params {
            let values = self.config.parameters.get(name).ok_or_else(|| {
                ExperimentError::Invariant(format!("no values loaded for parameter '{name}'"))
            })?;
            value_sets.push(values.as_slice());
        }

        let mut files = Vec::new();
        for combination in ParameterProduct::new(&value_sets) {
            let stem = fill_template(&source.format, &source.params, &combination);
            let found = source
                .extensions
                .iter()
                .map(|ext| dir.join(format!("{stem}.{ext}")))
                .find(|path| path.exists());
            match found {
                Some(path) => files.push(path),
                None if needed => {
                    warn!("no {} file for '{}', combination dropped", media.prefix(), stem)
                }
                None => debug!("no {} file for '{}'", media.prefix(), stem),
            }
        }
        Ok(files)
    }

    fn scan_directory(
        &self,
        media: MediaKind,
        needed: bool,
    ) -> Result<Vec<PathBuf>, ExperimentError> {
        let source = self.source(media);
        let dir = self.data_dir.join(&source.subdirectory);
        if !dir.is_dir() {
            if needed {
                warn!("stimulus directory {} does not exist", dir.display());
            }
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| ExperimentError::io(&dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ExperimentError::io(&dir, e))?.path();
            let allowed = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| source.extensions.iter().any(|a| a == ext));
            if path.is_file() && allowed {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Replaces each `${name}` / `{name}` placeholder with its value
pub fn fill_template(format: &str, params: &[String], values: &[&str]) -> String {
    let mut stem = format.replace('$', "");
    for (name, value) in params.iter().zip(values) {
        stem = stem.replace(&format!("{{{name}}}"), value);
    }
    stem
}

/// Every combination of the value sets, first set varying slowest
struct ParameterProduct<'a> {
    sets: &'a [&'a [String]],
    next: Option<Vec<usize>>,
}

impl<'a> ParameterProduct<'a> {
    fn new(sets: &'a [&'a [String]]) -> Self {
        let next = if sets.iter().any(|s| s.is_empty()) {
            None
        } else {
            Some(vec![0; sets.len()])
        };
        Self { sets, next }
    }
}

impl<'a> Iterator for ParameterProduct<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let item = current
            .iter()
            .zip(self.sets)
            .map(|(i, set)| set[*i].as_str())
            .collect();

        let mut following = current;
        for pos in (0..following.len()).rev() {
            following[pos] += 1;
            if following[pos] < self.sets[pos].len() {
                self.next = Some(following);
                return Some(item);
            }
            following[pos] = 0;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn templated_config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.load_trials_from_folder = false;
        config.audio_files = FileSource {
            params: vec!["pitches".into(), "spectrums".into()],
            format: "${pitches}_${spectrums}".into(),
            extensions: vec!["wav".into(), "aiff".into()],
            subdirectory: "aud".into(),
        };
        config
            .parameters
            .insert("pitches".into(), vec!["a".into(), "d".into(), "g".into()]);
        config
            .parameters
            .insert("spectrums".into(), vec!["l".into(), "n".into()]);
        config
    }

    #[test]
    fn test_fill_template() {
        let params = vec!["pitches".to_string(), "spectrums".to_string()];
        assert_eq!(fill_template("${pitches}_${spectrums}", &params, &["a", "l"]), "a_l");
        assert_eq!(fill_template("{pitches}-x", &params, &["g", "n"]), "g-x");
    }

    #[test]
    fn test_parameter_product_order() {
        let a = vec!["1".to_string(), "2".to_string()];
        let b = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let sets = [a.as_slice(), b.as_slice()];
        let combos: Vec<String> = ParameterProduct::new(&sets).map(|c| c.concat()).collect();
        assert_eq!(combos, vec!["1x", "1y", "1z", "2x", "2y", "2z"]);
    }

    #[test]
    fn test_parameter_product_without_parameters_yields_once() {
        let sets: [&[String]; 0] = [];
        assert_eq!(ParameterProduct::new(&sets).count(), 1);
    }

    #[test]
    fn test_templates_keep_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "aud/a_l.wav");
        touch(dir.path(), "aud/a_n.aiff");
        touch(dir.path(), "aud/g_n.wav");
        touch(dir.path(), "aud/g_n.aiff");

        let config = templated_config();
        let factory = TrialFactory::new(&config, dir.path());
        let mut warnings = Vec::new();
        let files = factory.discover(MediaKind::Audio, &mut warnings).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a_l.wav", "a_n.aiff", "g_n.wav"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_audio_block_is_files_times_offsets() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "aud/a_l.wav");
        touch(dir.path(), "aud/d_l.wav");

        let mut config = templated_config();
        config.sound_offsets = vec![-200, 0, 200];
        let catalog = TrialFactory::new(&config, dir.path()).build().unwrap();

        let audio = catalog.get(BlockType::Audio).unwrap();
        assert_eq!(audio.len(), 6);
        let first = audio.trials.get(0).unwrap();
        assert_eq!(first.audio_offset, Some(-200));
        assert!(first.vis_file.is_none() && first.num_dots.is_none());
        let fourth = audio.trials.get(3).unwrap();
        assert!(fourth.audio_file.unwrap().ends_with("d_l.wav"));
        assert_eq!(fourth.audio_offset, Some(-200));
    }

    #[test]
    fn test_directory_scan_filters_extensions_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "vis/b.txt");
        touch(dir.path(), "vis/a.txt");
        touch(dir.path(), "vis/notes.md");

        let mut config = ExperimentConfig::default();
        config.blocks[BlockType::Audio].include = false;
        config.blocks[BlockType::Animation].include = true;
        config.num_animation_points = vec![2, 5];

        let catalog = TrialFactory::new(&config, dir.path()).build().unwrap();
        let animation = catalog.get(BlockType::Animation).unwrap();
        let specs: Vec<_> = animation.trials.iter().collect();
        assert_eq!(specs.len(), 4);
        assert!(specs[0].vis_file.as_ref().unwrap().ends_with("a.txt"));
        assert_eq!(specs[0].num_dots, Some(2));
        assert_eq!(specs[1].num_dots, Some(5));
        assert!(specs[2].vis_file.as_ref().unwrap().ends_with("b.txt"));
        assert!(specs.iter().all(|s| s.audio_file.is_none()));
    }

    #[test]
    fn test_combined_block_is_full_product() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "aud/x.wav");
        touch(dir.path(), "aud/y.wav");
        touch(dir.path(), "vis/p.txt");

        let mut config = ExperimentConfig::default();
        config.blocks[BlockType::AudioAnimation].include = true;
        config.sound_offsets = vec![-1, 1];
        config.num_animation_points = vec![1, 2, 3];

        let catalog = TrialFactory::new(&config, dir.path()).build().unwrap();
        assert_eq!(catalog.trial_count(BlockType::Audio), 4);
        assert_eq!(catalog.trial_count(BlockType::AudioAnimation), 2 * 1 * 2 * 3);

        let last = catalog
            .get(BlockType::AudioAnimation)
            .unwrap()
            .trials
            .get(11)
            .unwrap();
        assert!(last.audio_file.unwrap().ends_with("y.wav"));
        assert_eq!(last.audio_offset, Some(1));
        assert_eq!(last.num_dots, Some(3));
        assert!(catalog.get(BlockType::AudioAnimation).unwrap().trials.get(12).is_none());
    }

    #[test]
    fn test_missing_files_warn_but_do_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let config = templated_config();
        let catalog = TrialFactory::new(&config, dir.path()).build().unwrap();
        assert_eq!(catalog.trial_count(BlockType::Audio), 0);
        assert_eq!(catalog.warnings.len(), 2);
    }
}
