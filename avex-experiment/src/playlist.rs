//! Saved trial lists, so several sessions can share one trial pool.
//!
//! A playlist is a CSV file with one row per trial prototype. Stimulus files
//! are stored by base name and resolved against the configured media
//! subdirectories on load.

use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::factory::TrialCatalog;
use crate::results::escape_csv;
use avex_core::{BlockMap, BlockType, TrialSpec};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const HEADER: [&str; 5] = ["type", "audioFile", "visFile", "audioOffset", "numDots"];

/// Reads a playlist, returning the trials of every block type plus warnings
/// for rows whose stimulus files no longer exist.
pub fn read(
    path: &Path,
    config: &ExperimentConfig,
    data_dir: &Path,
) -> Result<(BlockMap<Vec<TrialSpec>>, Vec<String>), ExperimentError> {
    let text = std::fs::read_to_string(path).map_err(|e| ExperimentError::io(path, e))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let bad = |line: usize, reason: String| ExperimentError::Playlist {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or_else(|| bad(1, "empty playlist".into()))?;
    let header = split_csv_line(header);
    let mut columns = [0usize; 5];
    for (slot, name) in columns.iter_mut().zip(HEADER) {
        *slot = header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| bad(1, format!("missing column '{name}'")))?;
    }

    let audio_dir = data_dir.join(&config.audio_files.subdirectory);
    let vis_dir = data_dir.join(&config.animation_files.subdirectory);

    let mut trials = BlockMap::<Vec<TrialSpec>>::default();
    let mut warnings = Vec::new();

    for (index, line) in lines {
        let line_no = index + 1;
        let fields = split_csv_line(line);
        let cell = |col: usize| {
            fields
                .get(columns[col])
                .map(|s| s.trim())
                .filter(|s| !s.is_empty() && *s != "NA")
        };

        let ty_name = cell(0).ok_or_else(|| bad(line_no, "missing block type".into()))?;
        let ty = BlockType::parse(ty_name)
            .ok_or_else(|| bad(line_no, format!("unknown block type '{ty_name}'")))?;

        let mut spec = TrialSpec::default();
        let mut missing = None;

        if ty.has_audio() {
            let name = cell(1).ok_or_else(|| bad(line_no, "missing audioFile".into()))?;
            let file = audio_dir.join(name);
            if !file.exists() {
                missing = Some(file.clone());
            }
            spec.audio_file = Some(file);
            let offset = cell(3).ok_or_else(|| bad(line_no, "missing audioOffset".into()))?;
            spec.audio_offset = Some(
                offset
                    .parse()
                    .map_err(|_| bad(line_no, format!("invalid audioOffset '{offset}'")))?,
            );
        }
        if ty.has_animation() {
            let name = cell(2).ok_or_else(|| bad(line_no, "missing visFile".into()))?;
            let file = vis_dir.join(name);
            if !file.exists() {
                missing = missing.or_else(|| Some(file.clone()));
            }
            spec.vis_file = Some(file);
            let dots = cell(4).ok_or_else(|| bad(line_no, "missing numDots".into()))?;
            spec.num_dots = Some(
                dots.parse()
                    .map_err(|_| bad(line_no, format!("invalid numDots '{dots}'")))?,
            );
        }

        if let Some(file) = missing {
            let msg = format!(
                "playlist line {line_no}: {} not found, skipping trial",
                file.display()
            );
            warn!("{msg}");
            warnings.push(msg);
            continue;
        }
        trials[ty].push(spec);
    }

    Ok((trials, warnings))
}

/// Writes every trial of the catalog, block types in canonical order
pub fn write(path: &Path, catalog: &TrialCatalog) -> Result<(), ExperimentError> {
    let file = File::create(path).map_err(|e| ExperimentError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let io = |e| ExperimentError::io(path, e);

    writeln!(out, "{}", HEADER.join(",")).map_err(io)?;
    for prototype in catalog.iter() {
        for spec in prototype.trials.iter() {
            let row = [
                prototype.block_type.as_str().to_string(),
                base_name(spec.audio_file.as_ref()),
                base_name(spec.vis_file.as_ref()),
                spec.audio_offset.map(|o| o.to_string()).unwrap_or_default(),
                spec.num_dots.map(|d| d.to_string()).unwrap_or_default(),
            ];
            let row: Vec<String> = row.iter().map(|f| escape_csv(f)).collect();
            writeln!(out, "{}", row.join(",")).map_err(io)?;
        }
    }
    out.flush().map_err(io)
}

fn base_name(path: Option<&PathBuf>) -> String {
    path.and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Splits one CSV line, honouring double-quoted fields and `""` escapes
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
