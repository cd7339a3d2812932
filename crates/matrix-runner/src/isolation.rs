//! Per-run filesystem sandboxes
//!
//! Each run owns a directory tree under the isolation root:
//!
//! ```text
//! <root>/<run_id>/
//!     temp/           scratch space
//!     state/store.db  state-store location
//!     logs/run.log    per-run log
//!     scenario.yaml   materialized scenario
//! ```
//!
//! The run id embeds a ULID, so no two runs share a tree, even across
//! process restarts.

use crate::error::IsolationError;
use matrix_core::{apply_overrides, ParameterOverride, RunId};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Allocates sandboxes under one root
#[derive(Debug, Clone)]
pub struct IsolationManager {
    root: PathBuf,
}

impl IsolationManager {
    /// Create manager rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Isolation root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sandbox paths for `run_id`, without touching the filesystem
    #[must_use]
    pub fn layout(&self, run_id: &RunId) -> IsolationContext {
        let root = self.root.join(run_id.as_str());
        IsolationContext {
            run_id: run_id.clone(),
            temp_dir: root.join("temp"),
            state_path: root.join("state").join("store.db"),
            log_path: root.join("logs").join("run.log"),
            scenario_path: root.join("scenario.yaml"),
            root,
            cleaned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allocate the directory tree for `run_id`
    ///
    /// A partially created tree is removed before the error is returned.
    ///
    /// # Errors
    /// [`IsolationError::CreateFailed`] if any directory cannot be created.
    pub async fn create_environment(&self, run_id: &RunId) -> Result<IsolationContext, IsolationError> {
        let context = self.layout(run_id);
        Self::allocate(&context).await?;
        Ok(context)
    }

    /// Create the directories of a context obtained from [`Self::layout`]
    ///
    /// # Errors
    /// [`IsolationError::CreateFailed`]; the partial tree is removed first.
    pub async fn allocate(context: &IsolationContext) -> Result<(), IsolationError> {
        let dirs = [
            context.temp_dir.clone(),
            context.root.join("state"),
            context.root.join("logs"),
        ];
        for dir in &dirs {
            if let Err(source) = tokio::fs::create_dir_all(dir).await {
                if let Err(e) = context.cleanup().await {
                    warn!(run_id = %context.run_id, error = %e, "failed to remove partial environment");
                }
                return Err(IsolationError::CreateFailed {
                    path: dir.clone(),
                    source,
                });
            }
        }

        debug!(run_id = %context.run_id, root = %context.root.display(), "isolated environment created");
        Ok(())
    }

    /// Apply `overrides` to `base` and write the variant as YAML to `path`
    ///
    /// Returns the materialized document.
    ///
    /// # Errors
    /// Override failures, serialization failures and write failures.
    pub async fn write_temporary_scenario(
        path: &Path,
        base: &Value,
        overrides: &[ParameterOverride],
    ) -> Result<Value, IsolationError> {
        let variant = apply_overrides(base, overrides)?;
        let text =
            serde_yaml::to_string(&variant).map_err(|e| IsolationError::Serialize(e.to_string()))?;
        tokio::fs::write(path, text)
            .await
            .map_err(|source| IsolationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(variant)
    }
}

/// Sandbox owned by exactly one run
///
/// Clones share the cleanup flag, so the tree is removed once no matter
/// which clone calls [`IsolationContext::cleanup`].
#[derive(Debug, Clone)]
pub struct IsolationContext {
    run_id: RunId,
    root: PathBuf,
    temp_dir: PathBuf,
    state_path: PathBuf,
    log_path: PathBuf,
    scenario_path: PathBuf,
    cleaned: Arc<AtomicBool>,
}

impl IsolationContext {
    /// Owning run
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Root of the sandbox tree
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory
    #[inline]
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// State-store location
    #[inline]
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Per-run log file
    #[inline]
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Materialized scenario file
    #[inline]
    #[must_use]
    pub fn scenario_path(&self) -> &Path {
        &self.scenario_path
    }

    /// Whether cleanup already ran
    #[inline]
    #[must_use]
    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    /// Materialize the variant into this sandbox
    ///
    /// # Errors
    /// See [`IsolationManager::write_temporary_scenario`].
    pub async fn write_scenario(
        &self,
        base: &Value,
        overrides: &[ParameterOverride],
    ) -> Result<Value, IsolationError> {
        IsolationManager::write_temporary_scenario(&self.scenario_path, base, overrides).await
    }

    /// Remove the sandbox tree
    ///
    /// Idempotent; a missing tree is not an error.
    ///
    /// # Errors
    /// Unexpected IO failures only. Callers log and swallow them.
    pub async fn cleanup(&self) -> Result<(), IsolationError> {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                debug!(run_id = %self.run_id, "isolated environment removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(IsolationError::Io {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::combination_to_overrides;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn layout_touches_nothing_until_allocated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IsolationManager::new(dir.path());
        let ctx = manager.layout(&RunId::from_string("combo-1-r2-xyz"));
        assert!(!ctx.root().exists());

        IsolationManager::allocate(&ctx).await.unwrap();
        assert!(ctx.temp_dir().is_dir());
        ctx.cleanup().await.unwrap();
        assert!(!ctx.root().exists());
    }

    #[tokio::test]
    async fn creates_layout_under_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IsolationManager::new(dir.path());
        let run_id = RunId::from_string("combo-0-r1-abc");

        let ctx = manager.create_environment(&run_id).await.unwrap();
        assert_eq!(ctx.root(), dir.path().join("combo-0-r1-abc"));
        assert!(ctx.temp_dir().is_dir());
        assert!(ctx.state_path().parent().unwrap().is_dir());
        assert!(ctx.log_path().parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_and_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IsolationManager::new(dir.path());
        let ctx = manager
            .create_environment(&RunId::from_string("r"))
            .await
            .unwrap();
        let clone = ctx.clone();

        ctx.cleanup().await.unwrap();
        assert!(!ctx.temp_dir().exists());
        assert!(clone.is_cleaned());
        clone.cleanup().await.unwrap();
        ctx.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_tolerates_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IsolationManager::new(dir.path())
            .create_environment(&RunId::from_string("gone"))
            .await
            .unwrap();
        std::fs::remove_dir_all(ctx.root()).unwrap();
        assert!(ctx.cleanup().await.is_ok());
    }

    #[tokio::test]
    async fn creation_fails_under_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let err = IsolationManager::new(&blocker)
            .create_environment(&RunId::from_string("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::CreateFailed { .. }));
    }

    #[tokio::test]
    async fn writes_overridden_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IsolationManager::new(dir.path())
            .create_environment(&RunId::from_string("w"))
            .await
            .unwrap();
        let base = json!({ "run": [{ "input": "hi" }], "model": "small" });
        let params = BTreeMap::from([("model".to_string(), json!("large"))]);

        let variant = ctx.write_scenario(&base, &combination_to_overrides(&params)).await.unwrap();
        assert_eq!(variant["model"], json!("large"));
        assert_eq!(base["model"], json!("small"));

        let on_disk: Value =
            serde_yaml::from_str(&std::fs::read_to_string(ctx.scenario_path()).unwrap()).unwrap();
        assert_eq!(on_disk, variant);
    }

    #[tokio::test]
    async fn unknown_parameter_path_fails_materialization() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IsolationManager::new(dir.path())
            .create_environment(&RunId::from_string("bad"))
            .await
            .unwrap();
        let params = BTreeMap::from([("missing.key".to_string(), json!(1))]);
        let err = ctx.write_scenario(&json!({}), &combination_to_overrides(&params)).await.unwrap_err();
        assert!(matches!(err, IsolationError::Materialize(_)));
    }
}
