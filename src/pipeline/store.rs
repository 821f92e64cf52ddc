//! Durable persistence for pipeline state.
//!
//! One pretty-printed JSON document per pipeline under
//! `<project>/.crucible/pipelines/<pipeline_id>.json`. Every write lands
//! in a temp file first and is moved into place with an atomic rename,
//! so a checkpoint is either fully visible or not there at all. The
//! resumability guarantee rests on this.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::state::PipelineState;
use crate::errors::PipelineError;

/// Load/save store for [`PipelineState`], keyed by pipeline id.
pub struct PipelineStore {
    dir: PathBuf,
}

impl PipelineStore {
    /// Create a store rooted at the given project directory.
    pub fn new(project_path: impl AsRef<Path>) -> Self {
        Self {
            dir: project_path.as_ref().join(".crucible").join("pipelines"),
        }
    }

    /// Persist a full snapshot. Returns the path written.
    pub fn save(&self, state: &PipelineState) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|source| PipelineError::Storage {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.record_path(&state.pipeline_id);
        let content = serde_json::to_string_pretty(state)?;

        // Temp file in the same directory so the rename stays on one filesystem.
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|source| PipelineError::Storage {
                path: self.dir.clone(),
                source,
            })?;
        tmp.write_all(content.as_bytes())
            .map_err(|source| PipelineError::Storage {
                path: path.clone(),
                source,
            })?;
        tmp.persist(&path).map_err(|e| PipelineError::Storage {
            path: path.clone(),
            source: e.error,
        })?;

        debug!(pipeline_id = %state.pipeline_id, status = ?state.status, "checkpoint written");
        Ok(path)
    }

    /// Load a pipeline by id. `Ok(None)` when no record exists.
    pub fn load(&self, pipeline_id: &str) -> Result<Option<PipelineState>, PipelineError> {
        let path = self.record_path(pipeline_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|source| PipelineError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Delete a record. Returns whether it existed.
    pub fn delete(&self, pipeline_id: &str) -> Result<bool, PipelineError> {
        let path = self.record_path(pipeline_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| PipelineError::Storage { path, source })?;
        Ok(true)
    }

    /// Ids of every stored pipeline, sorted.
    pub fn list_ids(&self) -> Result<Vec<String>, PipelineError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| PipelineError::Storage {
            path: self.dir.clone(),
            source,
        })?;
        let mut ids: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|s| s.to_string_lossy().to_string())
                } else {
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn record_path(&self, pipeline_id: &str) -> PathBuf {
        self.dir.join(format!("{pipeline_id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::PipelineStatus;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn make_store() -> (PipelineStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (PipelineStore::new(dir.path()), dir)
    }

    fn sample_state() -> PipelineState {
        PipelineState::new(
            "migrate the schema",
            "fix",
            vec!["intake".to_string(), "green".to_string()],
            HashMap::new(),
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (store, _dir) = make_store();
        let state = sample_state();
        let path = store.save(&state).unwrap();
        assert!(path.exists());

        let loaded = store.load(&state.pipeline_id).unwrap().unwrap();
        assert_eq!(loaded.pipeline_id, state.pipeline_id);
        assert_eq!(loaded.request, "migrate the schema");
        assert_eq!(loaded.status, PipelineStatus::Pending);
    }

    #[test]
    fn test_load_absent_is_none() {
        let (store, _dir) = make_store();
        assert!(store.load("PL-20260101-ffffffff").unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let (store, _dir) = make_store();
        let mut state = sample_state();
        store.save(&state).unwrap();

        state.status = PipelineStatus::Running;
        state.current_stage = "green".to_string();
        store.save(&state).unwrap();

        let loaded = store.load(&state.pipeline_id).unwrap().unwrap();
        assert_eq!(loaded.status, PipelineStatus::Running);
        assert_eq!(loaded.current_stage, "green");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (store, dir) = make_store();
        store.save(&sample_state()).unwrap();

        let pipelines_dir = dir.path().join(".crucible/pipelines");
        let non_json: Vec<_> = std::fs::read_dir(&pipelines_dir)
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().is_none_or(|ext| ext != "json"))
            .collect();
        assert!(non_json.is_empty());
    }

    #[test]
    fn test_list_and_delete() {
        let (store, _dir) = make_store();
        let a = sample_state();
        let b = sample_state();
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let ids = store.list_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.pipeline_id));

        assert!(store.delete(&a.pipeline_id).unwrap());
        assert!(!store.delete(&a.pipeline_id).unwrap());
        assert_eq!(store.list_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_store_survives_restart() {
        let dir = tempdir().unwrap();
        let state = sample_state();
        {
            let store = PipelineStore::new(dir.path());
            store.save(&state).unwrap();
        }
        let store = PipelineStore::new(dir.path());
        let loaded = store.load(&state.pipeline_id).unwrap().unwrap();
        assert_eq!(loaded.pipeline_id, state.pipeline_id);
    }
}
