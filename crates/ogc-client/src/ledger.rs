//! Per-retrieval record of identifiers that could not be fetched.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use ogc_common::{ObjectId, OgcResult};

/// Attempt history of one missing identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Fetch attempts that did not return the identifier.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
}

/// Missing identifiers of a single top-level retrieval call.
///
/// Identifiers enter when a fetch does not return them and leave as soon as a
/// later fetch does.
#[derive(Debug, Default)]
pub struct FailureLedger {
    entries: BTreeMap<ObjectId, LedgerEntry>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a failed attempt for `id`.
    pub fn record_missing(&mut self, id: ObjectId, error: Option<&str>) {
        let entry = self.entries.entry(id).or_insert(LedgerEntry {
            attempts: 0,
            last_error: None,
            last_attempt: None,
        });
        entry.attempts += 1;
        entry.last_attempt = Some(Utc::now());
        if let Some(error) = error {
            entry.last_error = Some(error.to_string());
        }
    }

    /// Track `id` as missing without counting an attempt, for batches that
    /// never ran.
    pub fn record_unattempted(&mut self, id: ObjectId, reason: &str) {
        self.entries.entry(id).or_insert(LedgerEntry {
            attempts: 0,
            last_error: Some(reason.to_string()),
            last_attempt: None,
        });
    }

    /// Drop `id` after a successful fetch.
    pub fn resolve(&mut self, id: &ObjectId) {
        self.entries.remove(id);
    }

    pub fn get(&self, id: &ObjectId) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }

    /// Identifiers still missing, sorted.
    pub fn unresolved(&self) -> BTreeSet<ObjectId> {
        self.entries.keys().cloned().collect()
    }

    /// Identifiers whose failed attempts exceed `retry_budget`.
    pub fn exhausted(&self, retry_budget: u32) -> BTreeSet<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.attempts > retry_budget)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write unresolved identifiers, one per line, to
    /// `<dir>/failed_ids_<request_id>.txt`. The file is created or truncated.
    pub async fn persist(&self, dir: &Path, request_id: Uuid) -> OgcResult<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("failed_ids_{}.txt", request_id));

        let mut content = String::new();
        for id in self.entries.keys() {
            content.push_str(&id.to_string());
            content.push('\n');
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}
