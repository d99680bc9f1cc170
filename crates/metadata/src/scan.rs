//! Source-folder scanning: build the master table from raw image filenames.

use crate::MasterMetadata;
use regex::Regex;
use std::path::{Path, PathBuf};
use tomopipe_core::{PipelineError, ProjectConfig, Result};
use tracing::info;

/// Scan the project's source folder (and its immediate subfolders) for raw
/// images and derive each image's identity fields from its filename.
///
/// Fails with a configuration error when nothing matches, and with a
/// data-integrity error naming the offending file when an identity field
/// cannot be derived.
pub fn scan_source_folder(project: &ProjectConfig) -> Result<MasterMetadata> {
    let pattern = Regex::new(&format!(
        r"^{}_.+\.{}$",
        regex::escape(&project.file_prefix),
        regex::escape(project.filetype.extension())
    ))
    .map_err(|e| PipelineError::Configuration(format!("bad filename pattern: {e}")))?;

    let mut matches = collect_matching(&project.source_folder, &pattern)?;
    if matches.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "no files matching {}_*.{} found under {}",
            project.file_prefix,
            project.filetype.extension(),
            project.source_folder.display()
        )));
    }
    matches.sort();

    let mut table = MasterMetadata::default();
    for path in matches {
        let (series, image_idx, angle) = parse_identity(project, &path)?;
        table.push(path, series, image_idx, angle);
    }

    info!(
        images = table.len(),
        series = table.series_ids().len(),
        "scanned source folder"
    );
    Ok(table)
}

fn collect_matching(folder: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = std::fs::read_dir(folder).map_err(|e| {
        PipelineError::Configuration(format!(
            "source folder {} not readable: {e}",
            folder.display()
        ))
    })?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            // Tilt series are often grouped one subfolder per series.
            for sub in std::fs::read_dir(&path)? {
                let sub = sub?.path();
                if sub.is_file() && name_matches(&sub, pattern) {
                    found.push(sub);
                }
            }
        } else if name_matches(&path, pattern) {
            found.push(path);
        }
    }
    Ok(found)
}

fn name_matches(path: &Path, pattern: &Regex) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| pattern.is_match(n))
}

/// Derive (series, image index, tilt angle) from one filename, using the
/// positional fields declared in the project config.
fn parse_identity(project: &ProjectConfig, path: &Path) -> Result<(u32, u32, f64)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| integrity(path, "filename is not valid UTF-8"))?;

    // Bracketed fields count as their own underscore-separated field.
    let normalized = name.replace('[', "_");
    let fields: Vec<&str> = normalized.split('_').collect();
    let offset = project.file_prefix.split('_').count();

    let series = digit_field(&fields, project.series_field + offset)
        .ok_or_else(|| integrity(path, "failed to derive series number"))?;
    let image_idx = digit_field(&fields, project.index_field + offset)
        .ok_or_else(|| integrity(path, "failed to derive image index"))?;

    let angle_raw = fields
        .get(project.angle_field + offset)
        .ok_or_else(|| integrity(path, "failed to derive tilt angle"))?;
    let angle_text = angle_raw
        .trim_end_matches(&format!(".{}", project.filetype.extension()))
        .replace(']', "");
    let angle: f64 = angle_text
        .parse()
        .map_err(|_| integrity(path, "failed to derive tilt angle"))?;

    Ok((series, image_idx, angle))
}

fn digit_field(fields: &[&str], index: usize) -> Option<u32> {
    let digits: String = fields
        .get(index)?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn integrity(path: &Path, reason: &str) -> PipelineError {
    PipelineError::DataIntegrity {
        source_name: path.display().to_string(),
        reason: reason.to_string(),
    }
}
