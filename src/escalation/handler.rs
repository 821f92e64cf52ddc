//! Persistence and lifecycle for escalation records.
//!
//! One JSON document per escalation under
//! `<project>/.crucible/escalations/<escalation_id>.json`. Writes go
//! through a temp file and an atomic rename so a crash never leaves a
//! half-written record behind.

use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::types::{Escalation, EscalationStatus, generate_escalation_id};
use crate::errors::PipelineError;

/// Stores, queries, and resolves escalation records.
pub struct EscalationHandler {
    dir: PathBuf,
}

impl EscalationHandler {
    /// Create a handler rooted at the given project directory.
    pub fn new(project_path: impl AsRef<Path>) -> Self {
        Self {
            dir: project_path.as_ref().join(".crucible").join("escalations"),
        }
    }

    /// Persist a new escalation, assigning an id if it has none.
    /// Returns the escalation id.
    pub fn create(&self, mut escalation: Escalation) -> Result<String, PipelineError> {
        if escalation.escalation_id.is_empty() {
            escalation.escalation_id = generate_escalation_id();
        }
        self.save(&escalation)?;
        debug!(
            escalation_id = %escalation.escalation_id,
            pipeline_id = %escalation.pipeline_id,
            stage = %escalation.stage_name,
            "escalation created"
        );
        Ok(escalation.escalation_id)
    }

    /// Load a single escalation, failing typed if it does not exist.
    pub fn get(&self, escalation_id: &str) -> Result<Escalation, PipelineError> {
        let path = self.record_path(escalation_id);
        if !path.exists() {
            return Err(PipelineError::EscalationNotFound {
                id: escalation_id.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|source| PipelineError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Mark a pending escalation resolved, storing the human's response.
    pub fn resolve(
        &self,
        escalation_id: &str,
        response: Value,
    ) -> Result<Escalation, PipelineError> {
        self.close(escalation_id, EscalationStatus::Resolved, response)
    }

    /// Mark a pending escalation rejected, storing the rejection reason.
    pub fn reject(&self, escalation_id: &str, reason: &str) -> Result<Escalation, PipelineError> {
        self.close(
            escalation_id,
            EscalationStatus::Rejected,
            Value::String(reason.to_string()),
        )
    }

    /// Mark a pending escalation expired. For callers that time out
    /// approvals instead of waiting indefinitely.
    pub fn expire(&self, escalation_id: &str) -> Result<Escalation, PipelineError> {
        self.close(escalation_id, EscalationStatus::Expired, Value::Null)
    }

    fn close(
        &self,
        escalation_id: &str,
        status: EscalationStatus,
        response: Value,
    ) -> Result<Escalation, PipelineError> {
        let mut escalation = self.get(escalation_id)?;
        if !escalation.status.is_pending() {
            return Err(PipelineError::EscalationNotPending {
                id: escalation_id.to_string(),
                status: escalation.status,
            });
        }
        escalation.status = status;
        if !response.is_null() {
            escalation.response = Some(response);
        }
        escalation.resolved_at = Some(Utc::now());
        self.save(&escalation)?;
        debug!(escalation_id, ?status, "escalation closed");
        Ok(escalation)
    }

    /// All pending escalations, optionally filtered to one pipeline,
    /// oldest first.
    pub fn get_pending(&self, pipeline_id: Option<&str>) -> Result<Vec<Escalation>, PipelineError> {
        let mut pending: Vec<Escalation> = self
            .scan()?
            .into_iter()
            .filter(|e| e.status.is_pending())
            .filter(|e| pipeline_id.is_none_or(|id| e.pipeline_id == id))
            .collect();
        pending.sort_by_key(|e| e.created_at);
        Ok(pending)
    }

    /// Every escalation ever raised for a pipeline, any status, oldest first.
    pub fn get_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<Escalation>, PipelineError> {
        let mut records: Vec<Escalation> = self
            .scan()?
            .into_iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .collect();
        records.sort_by_key(|e| e.created_at);
        Ok(records)
    }

    /// Delete a record. Returns whether it existed.
    pub fn delete(&self, escalation_id: &str) -> Result<bool, PipelineError> {
        let path = self.record_path(escalation_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| PipelineError::Storage { path, source })?;
        Ok(true)
    }

    fn record_path(&self, escalation_id: &str) -> PathBuf {
        self.dir.join(format!("{escalation_id}.json"))
    }

    fn save(&self, escalation: &Escalation) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|source| PipelineError::Storage {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.record_path(&escalation.escalation_id);
        let content = serde_json::to_string_pretty(escalation)?;

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
            path,
            source: e.error,
        })?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<Escalation>, PipelineError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| PipelineError::Storage {
            path: self.dir.clone(),
            source,
        })?;
        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|source| PipelineError::Storage {
                path: path.clone(),
                source,
            })?;
            records.push(serde_json::from_str(&content)?);
        }
        Ok(records)
    }
}
