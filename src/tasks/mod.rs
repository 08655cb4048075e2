pub mod firestore;
pub mod memory;
pub mod recorder;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

// ─── Generic documents ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

pub type Document = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Document,
}

/// `field == value`, the only filter the dashboard issues.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: FieldValue,
}

impl FieldFilter {
    pub fn equals(field: &str, value: FieldValue) -> Self {
        Self {
            field: field.to_string(),
            value,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field) == Some(&self.value)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores `doc` under a store-assigned id and returns that id.
    async fn create(&self, collection: &str, doc: Document) -> Result<String, StoreError>;

    async fn query(
        &self,
        collection: &str,
        filter: &FieldFilter,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Spanish labels come from older records of the operator form
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "baja" => Ok(Priority::Low),
            "medium" | "media" => Ok(Priority::Medium),
            "high" | "alta" => Ok(Priority::High),
            other => Err(format!(
                "Unknown priority '{}' (expected Low, Medium or High)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("Unknown task status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(
            "description".to_string(),
            FieldValue::String(self.description.clone()),
        );
        doc.insert(
            "priority".to_string(),
            FieldValue::String(self.priority.as_str().to_string()),
        );
        doc.insert(
            "status".to_string(),
            FieldValue::String(self.status.as_str().to_string()),
        );
        doc.insert(
            "created_at".to_string(),
            self.created_at
                .map(FieldValue::Timestamp)
                .unwrap_or(FieldValue::Null),
        );
        doc
    }

    pub fn from_document(doc: &StoredDocument) -> Result<Self, String> {
        let field = |name: &str| doc.fields.get(name).and_then(FieldValue::as_str);

        let description = field("description")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| format!("task {} has no description", doc.id))?;
        let priority: Priority = field("priority")
            .ok_or_else(|| format!("task {} has no priority", doc.id))?
            .parse()?;
        let status: TaskStatus = field("status")
            .ok_or_else(|| format!("task {} has no status", doc.id))?
            .parse()?;

        Ok(Task {
            id: doc.id.clone(),
            description: description.to_string(),
            priority,
            status,
            created_at: doc
                .fields
                .get("created_at")
                .and_then(FieldValue::as_timestamp),
        })
    }
}
