//! Durable result storage
//!
//! Output layout:
//!
//! ```text
//! <output_dir>/config.yaml
//! <output_dir>/runs/<run_id>.json
//! <output_dir>/summary.json
//! <output_dir>/logs/matrix-execution.log
//! ```
//!
//! Every file is written to a hidden sibling and renamed into place, so a
//! crash never leaves a truncated document behind.

use crate::error::StoreError;
use chrono::Utc;
use matrix_core::{MatrixConfig, MatrixExecutionSummary, MatrixRunResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Writes results under an output directory
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Create store rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serialized matrix configuration
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// Directory of per-run results
    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    /// Result file of one run
    #[must_use]
    pub fn run_path(&self, result: &MatrixRunResult) -> PathBuf {
        self.runs_dir().join(format!("{}.json", result.run_id))
    }

    /// Execution summary
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    /// Human-readable execution log
    #[must_use]
    pub fn execution_log_path(&self) -> PathBuf {
        self.root.join("logs").join("matrix-execution.log")
    }

    /// Create the layout and write `config.yaml`
    ///
    /// # Errors
    /// Directory creation, serialization or write failures.
    pub async fn initialize(&self, config: &MatrixConfig) -> Result<(), StoreError> {
        for dir in [self.runs_dir(), self.root.join("logs")] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io_error(&dir, e))?;
        }
        let path = self.config_path();
        let text = serde_yaml::to_string(config).map_err(|e| StoreError::Serialize {
            path: path.clone(),
            message: e.to_string(),
        })?;
        atomic_write_bytes(&path, text.as_bytes()).await
    }

    /// Persist one run result
    ///
    /// # Errors
    /// Serialization or write failures.
    pub async fn save_result(&self, result: &MatrixRunResult) -> Result<PathBuf, StoreError> {
        let path = self.run_path(result);
        atomic_write_json_pretty(&path, result).await?;
        debug!(run_id = %result.run_id, path = %path.display(), "run result persisted");
        Ok(path)
    }

    /// Persist the execution summary
    ///
    /// # Errors
    /// Serialization or write failures.
    pub async fn save_summary(&self, summary: &MatrixExecutionSummary) -> Result<(), StoreError> {
        atomic_write_json_pretty(&self.summary_path(), summary).await
    }

    /// Persist the execution log text
    ///
    /// # Errors
    /// Write failures.
    pub async fn save_execution_log(&self, text: &str) -> Result<(), StoreError> {
        atomic_write_bytes(&self.execution_log_path(), text.as_bytes()).await
    }

    /// Read every persisted run result, ordered by start time
    ///
    /// Unparsable files are skipped with a warning. A missing `runs/`
    /// directory yields no results.
    ///
    /// # Errors
    /// Directory listing or read failures.
    pub async fn load_results(&self) -> Result<Vec<MatrixRunResult>, StoreError> {
        let dir = self.runs_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io_error(&dir, e)),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io_error(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| StoreError::io_error(&path, e))?;
            match serde_json::from_slice::<MatrixRunResult>(&bytes) {
                Ok(result) => results.push(result),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable run result"),
            }
        }
        results.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(results)
    }

    /// Read the persisted summary
    ///
    /// # Errors
    /// Read or parse failures.
    pub async fn load_summary(&self) -> Result<MatrixExecutionSummary, StoreError> {
        let path = self.summary_path();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::io_error(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Parse {
            path,
            message: e.to_string(),
        })
    }
}

async fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io_error(parent, e))?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(
        ".{name}.tmp.{}.{}",
        std::process::id(),
        Utc::now().timestamp_micros()
    ));

    let write = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await
    };
    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io_error(path, e));
    }
    Ok(())
}

async fn atomic_write_json_pretty<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    atomic_write_bytes(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use matrix_core::{RunId, RunMetrics};
    use std::collections::BTreeMap;

    fn result(id: &str, offset_ms: i64) -> MatrixRunResult {
        let start = Utc::now() + Duration::milliseconds(offset_ms);
        MatrixRunResult {
            run_id: RunId::from_string(id),
            combination_id: "combo-0".into(),
            repetition: 1,
            parameters: BTreeMap::new(),
            start_time: start,
            end_time: start,
            duration_ms: 0,
            success: true,
            scenario_result: None,
            error: None,
            metrics: RunMetrics::default(),
        }
    }

    #[tokio::test]
    async fn initialize_writes_config_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let config = MatrixConfig::new("demo", "scenario.yaml");

        store.initialize(&config).await.unwrap();
        assert!(store.runs_dir().is_dir());
        assert!(store.execution_log_path().parent().unwrap().is_dir());
        let text = std::fs::read_to_string(store.config_path()).unwrap();
        assert_eq!(MatrixConfig::from_yaml_str(&text).unwrap().name, "demo");
    }

    #[tokio::test]
    async fn results_round_trip_in_start_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        store.save_result(&result("late", 50)).await.unwrap();
        store.save_result(&result("early", 0)).await.unwrap();
        std::fs::write(store.runs_dir().join("junk.json"), "{").unwrap();

        let loaded = store.load_results().await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        store.save_result(&result("only", 0)).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(store.runs_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["only.json".to_string()]);
    }

    #[tokio::test]
    async fn missing_runs_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("never-created"));
        assert!(store.load_results().await.unwrap().is_empty());
        assert!(store.load_summary().await.is_err());
    }
}
