//! JSON file store for done tables.
//!
//! Tables live as parallel-column JSON files under `<root>/tables/`, with a
//! small per-table meta marker (version + updated_at) under `<root>/meta/`.
//! Checkpoints write to a temp file and rename into place so an interrupted
//! write can never corrupt the previous checkpoint.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tomopipe_core::{DoneRecord, DoneTable, SeriesId};
use tracing::{debug, warn};

use super::{MetadataStore, Result, StorageError};

/// File-based JSON store.
pub struct JsonMetadataStore {
    root: PathBuf,
}

/// Serialized shape of a done table: parallel columns of equal length.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DoneColumns {
    output: Vec<PathBuf>,
    series: Vec<u32>,
    sub_index: Vec<Option<u32>>,
}

impl From<&DoneTable> for DoneColumns {
    fn from(table: &DoneTable) -> Self {
        let mut columns = DoneColumns::default();
        for record in table.records() {
            columns.output.push(record.output.clone());
            columns.series.push(record.series.value());
            columns.sub_index.push(record.sub_index);
        }
        columns
    }
}

impl DoneColumns {
    fn into_records(self, table: &str) -> Result<Vec<DoneRecord>> {
        let n = self.output.len();
        if self.series.len() != n || self.sub_index.len() != n {
            return Err(StorageError::Corrupt {
                table: table.to_string(),
                reason: format!(
                    "column lengths differ: {} outputs, {} series, {} sub-indices",
                    n,
                    self.series.len(),
                    self.sub_index.len()
                ),
            });
        }
        Ok(self
            .output
            .into_iter()
            .zip(self.series)
            .zip(self.sub_index)
            .map(|((output, series), sub_index)| DoneRecord {
                output,
                series: SeriesId::new(series),
                sub_index,
            })
            .collect())
    }
}

impl JsonMetadataStore {
    /// Create a store rooted at `root`, creating the table and meta
    /// directories if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("tables")).await?;
        fs::create_dir_all(root.join("meta")).await?;
        Ok(Self { root })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join("tables").join(format!("{table}.json"))
    }

    fn meta_path(&self, table: &str) -> PathBuf {
        self.root.join("meta").join(format!("{table}.meta.json"))
    }

    /// Read and increment the per-table version marker.
    async fn bump_version(&self, table: &str) -> Result<u64> {
        let path = self.meta_path(table);
        let mut version = 0u64;
        if let Ok(raw) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn load_done(&self, table: &str) -> Result<DoneTable> {
        let path = self.table_path(table);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(table, "no done table on disk, starting empty");
                return Ok(DoneTable::new());
            }
            Err(e) => return Err(e.into()),
        };
        let columns: DoneColumns = serde_json::from_str(&raw)?;
        let (done, dropped) = DoneTable::from_records(columns.into_records(table)?);
        if dropped > 0 {
            warn!(table, dropped, "dropped duplicate rows while loading done table");
        }
        Ok(done)
    }

    async fn checkpoint(&mut self, table: &str, done: &DoneTable) -> Result<()> {
        let path = self.table_path(table);
        let tmp = self.root.join("tables").join(format!(".{table}.json.tmp"));

        let columns = DoneColumns::from(done);
        let json = serde_json::to_string_pretty(&columns)?;
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;

        let version = self.bump_version(table).await?;
        debug!(table, rows = done.len(), version, "checkpointed done table");
        Ok(())
    }
}
