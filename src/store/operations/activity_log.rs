use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: String,
    pub subject: String,
    /// `None` for runs that had nothing to do (job disabled, wrong hour).
    pub status: Option<ActivityStatus>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub reference_doctype: Option<String>,
    pub reference_name: Option<String>,
}

impl ActivityLogEntry {
    pub fn new(subject: &str, status: Option<ActivityStatus>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            status,
            content: content.into(),
            timestamp: Utc::now(),
            reference_doctype: None,
            reference_name: None,
        }
    }

    pub fn with_reference(mut self, doctype: &str, name: &str) -> Self {
        self.reference_doctype = Some(doctype.to_string());
        self.reference_name = Some(name.to_string());
        self
    }
}

impl Store {
    pub fn insert_activity(&self, entry: &ActivityLogEntry) -> Result<(), StoreError> {
        let key = keys::activity_key(entry.timestamp.timestamp_millis(), &entry.id);
        self.activity_log
            .insert(key.as_bytes(), Self::serialize(entry)?)?;
        Ok(())
    }

    /// Newest first.
    pub fn list_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let mut entries = Vec::new();
        for item in self.activity_log.iter() {
            if entries.len() >= limit {
                break;
            }
            let (_, raw) = match item {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            match Self::deserialize::<ActivityLogEntry>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(error) => tracing::warn!(error = %error, "Skipping unreadable activity entry"),
            }
        }
        Ok(entries)
    }
}
