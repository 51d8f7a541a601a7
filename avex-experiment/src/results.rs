use crate::error::ExperimentError;
use avex_core::{Response, TrialRecord};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAX_PART_ATTEMPTS: usize = 100;

pub const HEADER: [&str; 27] = [
    "exp_id",
    "sub_exp_id",
    "exp_build",
    "exp_build_date",
    "ra_id",
    "subject",
    "session",
    "trial_num",
    "block_num",
    "metablock_num",
    "block_instance",
    "repetition_num",
    "trial_in_metablock",
    "block_in_metablock",
    "trial_in_block",
    "time_stamp",
    "audioFile",
    "visFile",
    "audioOffset",
    "numDots",
    "animationStart",
    "aniStrikeDelay",
    "audioStart",
    "audioToneDelay",
    "confidence",
    "subjResponse",
    "responseCorrect",
];

const NA: &str = "NA";

/// Receives every logged trial as it is recorded
pub trait TrialSink {
    fn record(&mut self, record: &TrialRecord) -> Result<(), ExperimentError>;

    /// Called once when the experiment reaches FINISH
    fn finish(&mut self) -> Result<(), ExperimentError>;

    /// Called once when the run is abandoned; recorded rows must survive
    fn abort(&mut self) -> Result<(), ExperimentError> {
        Ok(())
    }
}

impl TrialSink for Vec<TrialRecord> {
    fn record(&mut self, record: &TrialRecord) -> Result<(), ExperimentError> {
        self.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExperimentError> {
        Ok(())
    }
}

/// Streams rows to a `.part` file and merges it into the results file on finish
#[derive(Debug)]
pub struct CsvResultsWriter {
    target: PathBuf,
    /// File name of the `.part` file without its extension
    part_stem: String,
    part_path: PathBuf,
    part: Option<BufWriter<File>>,
    rows: usize,
}

impl CsvResultsWriter {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let part_stem = format!("{stem}-{stamp}");
        let part_path = target.with_file_name(format!("{part_stem}.csv.part"));
        Self {
            target,
            part_stem,
            part_path,
            part: None,
            rows: 0,
        }
    }

    /// Results go next to the properties file, with a `.csv` extension
    pub fn for_properties(properties_file: &Path) -> Self {
        Self::new(properties_file.with_extension("csv"))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn part_writer(&mut self) -> Result<&mut BufWriter<File>, ExperimentError> {
        if self.part.is_none() {
            let file = self.create_part()?;
            debug!("streaming trials to {}", self.part_path.display());
            self.part = Some(BufWriter::new(file));
        }
        self.part
            .as_mut()
            .ok_or_else(|| ExperimentError::Invariant("partial results file not open".into()))
    }

    /// Creates a fresh `.part` file, numbering the name when another run
    /// started within the same second
    fn create_part(&mut self) -> Result<File, ExperimentError> {
        for attempt in 0..MAX_PART_ATTEMPTS {
            let name = match attempt {
                0 => format!("{}.csv.part", self.part_stem),
                n => format!("{}-{n}.csv.part", self.part_stem),
            };
            let path = self.target.with_file_name(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    self.part_path = path;
                    return Ok(file);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ExperimentError::io(&path, e)),
            }
        }
        Err(ExperimentError::Invariant(format!(
            "no free partial results file for {}",
            self.target.display()
        )))
    }

    fn close_part(&mut self) -> Result<(), ExperimentError> {
        if let Some(mut part) = self.part.take() {
            part.flush()
                .map_err(|e| ExperimentError::io(&self.part_path, e))?;
        }
        Ok(())
    }
}

impl TrialSink for CsvResultsWriter {
    fn record(&mut self, record: &TrialRecord) -> Result<(), ExperimentError> {
        let line = csv_line(&row(record));
        let path = self.part_path.clone();
        let part = self.part_writer()?;
        writeln!(part, "{line}")
            .and_then(|_| part.flush())
            .map_err(|e| ExperimentError::io(&path, e))?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExperimentError> {
        self.close_part()?;
        let target = self.target.clone();
        let io = |e| ExperimentError::io(&target, e);

        let is_new = !target.exists();
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(io)?;
        if is_new {
            writeln!(out, "{}", HEADER.join(",")).map_err(io)?;
        }

        if self.part_path.exists() {
            let rows = fs::read(&self.part_path)
                .map_err(|e| ExperimentError::io(&self.part_path, e))?;
            out.write_all(&rows).map_err(io)?;
            out.flush().map_err(io)?;
            fs::remove_file(&self.part_path)
                .map_err(|e| ExperimentError::io(&self.part_path, e))?;
        }
        info!("wrote {} trials to {}", self.rows, target.display());
        Ok(())
    }

    fn abort(&mut self) -> Result<(), ExperimentError> {
        self.close_part()?;
        if self.rows > 0 {
            warn!(
                "run aborted; {} recorded trials kept in {}",
                self.rows,
                self.part_path.display()
            );
        }
        Ok(())
    }
}

/// Results file fields of one record, in `HEADER` order
pub fn row(record: &TrialRecord) -> Vec<String> {
    let id = &record.identity;
    let spec = &record.spec;
    let t = &record.timings;

    let (confidence, subj_response) = match &record.response {
        Some(Response::OrderJudgment {
            label, confidence, ..
        }) => (confidence.to_string(), label.clone()),
        Some(Response::Rating {
            duration,
            agreement,
        }) => (agreement.to_string(), duration.to_string()),
        None => (NA.to_string(), NA.to_string()),
    };

    vec![
        id.exp_id.to_string(),
        id.sub_exp_id.to_string(),
        id.exp_build.clone(),
        id.exp_build_date.clone(),
        id.ra_id.clone(),
        id.subject.clone(),
        id.session.clone(),
        record.trial_num.to_string(),
        record.block_num.to_string(),
        record.metablock_num.to_string(),
        record.block_instance.to_string(),
        record.repetition_num.to_string(),
        record.trial_in_metablock.to_string(),
        record.block_in_metablock.to_string(),
        record.trial_in_block.to_string(),
        record.time_stamp.clone(),
        or_na(spec.audio_file.as_deref().map(base_name)),
        or_na(spec.vis_file.as_deref().map(base_name)),
        or_na(spec.audio_offset),
        or_na(spec.num_dots),
        or_na(t.animation_start),
        or_na(t.animation_delay),
        or_na(t.audio_start),
        or_na(t.audio_delay),
        confidence,
        subj_response,
        or_na(record.response_correct.map(|c| if c { "True" } else { "False" })),
    ]
}

/// Writes the whole log as pretty JSON
pub fn write_json(path: &Path, records: &[TrialRecord]) -> Result<(), ExperimentError> {
    let file = File::create(path).map_err(|e| ExperimentError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), records)
        .map_err(|e| ExperimentError::io(path, std::io::Error::other(e)))
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| NA.to_string(), |v| v.to_string())
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn csv_line(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| escape_csv(f))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
