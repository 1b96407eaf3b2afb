//! Named-workflow persistence: plain JSON files in a directory.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{WorkflowError, WorkflowResult};

/// Directory-backed store of saved workflow descriptions, keyed by name.
pub struct WorkflowStore {
    dir: PathBuf,
}

/// Listing entry for a saved workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> WorkflowResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(WorkflowStore { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(name)))
    }

    pub async fn save(&self, name: &str, workflow: &Value) -> WorkflowResult<()> {
        let body = serde_json::to_vec_pretty(workflow)
            .map_err(|e| WorkflowError::StoreError(e.to_string()))?;
        tokio::fs::write(self.path_for(name), body).await?;
        Ok(())
    }

    pub async fn load(&self, name: &str) -> WorkflowResult<Value> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(WorkflowError::StoreError(format!(
                "Workflow '{}' not found",
                name
            )));
        }
        let body = tokio::fs::read(path).await?;
        serde_json::from_slice(&body).map_err(|e| WorkflowError::StoreError(e.to_string()))
    }

    pub async fn delete(&self, name: &str) -> WorkflowResult<()> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(WorkflowError::StoreError(format!(
                "Workflow '{}' not found",
                name
            )));
        }
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    /// All saved workflows, most recently modified first.
    pub async fn list(&self) -> WorkflowResult<Vec<WorkflowEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            entries.push(WorkflowEntry {
                name: stem.to_string(),
                last_modified: modified,
            });
        }
        entries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(entries)
    }
}
