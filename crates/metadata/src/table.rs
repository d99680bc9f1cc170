//! Column-oriented master metadata table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tomopipe_core::{PipelineError, Result, SeriesId};

/// Master metadata, stored as parallel columns of equal length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterMetadata {
    pub file_paths: Vec<PathBuf>,
    pub series: Vec<u32>,
    pub image_idx: Vec<u32>,
    pub angles: Vec<f64>,
}

/// One row of the master table.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterRow<'a> {
    pub path: &'a Path,
    pub series: SeriesId,
    pub image_idx: u32,
    pub angle: f64,
}

impl MasterMetadata {
    pub fn len(&self) -> usize {
        self.file_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
    }

    pub fn push(&mut self, path: PathBuf, series: u32, image_idx: u32, angle: f64) {
        self.file_paths.push(path);
        self.series.push(series);
        self.image_idx.push(image_idx);
        self.angles.push(angle);
    }

    fn check_columns(&self, source: &str) -> Result<()> {
        let n = self.file_paths.len();
        if self.series.len() != n || self.image_idx.len() != n || self.angles.len() != n {
            return Err(PipelineError::DataIntegrity {
                source_name: source.to_string(),
                reason: format!(
                    "column lengths differ: {} paths, {} series, {} indices, {} angles",
                    n,
                    self.series.len(),
                    self.image_idx.len(),
                    self.angles.len()
                ),
            });
        }
        Ok(())
    }

    pub fn rows(&self) -> impl Iterator<Item = MasterRow<'_>> {
        (0..self.len()).map(move |i| MasterRow {
            path: &self.file_paths[i],
            series: SeriesId::new(self.series[i]),
            image_idx: self.image_idx[i],
            angle: self.angles[i],
        })
    }

    /// Distinct series ids, ascending.
    pub fn series_ids(&self) -> Vec<SeriesId> {
        let mut ids: Vec<SeriesId> = self.series.iter().copied().map(SeriesId::new).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Tilt angles of one series, ascending, paired with the image paths at
    /// those angles.
    pub fn sorted_angles(&self, series: SeriesId) -> Vec<(f64, &Path)> {
        let mut rows: Vec<(f64, &Path)> = self
            .rows()
            .filter(|r| r.series == series)
            .map(|r| (r.angle, r.path))
            .collect();
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        rows
    }

    /// Load the master table from its JSON file. A missing file is a
    /// configuration error: the scan step has to run first.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "master metadata {} not readable (run the scan step first): {e}",
                path.display()
            ))
        })?;
        let table: MasterMetadata = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::DataIntegrity {
                source_name: path.display().to_string(),
                reason: format!("invalid JSON: {e}"),
            }
        })?;
        table.check_columns(&path.display().to_string())?;
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MasterMetadata {
        let mut table = MasterMetadata::default();
        table.push(PathBuf::from("raw/a_01_0001_0.0.tif"), 1, 1, 0.0);
        table.push(PathBuf::from("raw/a_01_0002_-3.0.tif"), 1, 2, -3.0);
        table.push(PathBuf::from("raw/a_02_0001_3.0.tif"), 2, 1, 3.0);
        table
    }

    #[test]
    fn series_ids_are_distinct_ascending() {
        assert_eq!(
            sample().series_ids(),
            vec![SeriesId::new(1), SeriesId::new(2)]
        );
    }

    #[test]
    fn sorted_angles_orders_by_tilt() {
        let table = sample();
        let angles: Vec<f64> = table
            .sorted_angles(SeriesId::new(1))
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        assert_eq!(angles, vec![-3.0, 0.0]);
    }

    #[test]
    fn load_rejects_uneven_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("md.json");
        std::fs::write(
            &path,
            r#"{"file_paths": ["a.tif"], "series": [1, 2], "image_idx": [1], "angles": [0.0]}"#,
        )
        .unwrap();
        let err = MasterMetadata::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity { .. }));
    }

    #[test]
    fn load_missing_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MasterMetadata::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("md.json");
        let table = sample();
        table.save(&path).unwrap();
        let loaded = MasterMetadata::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.series, table.series);
    }
}
