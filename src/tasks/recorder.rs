use chrono::Utc;

use super::{DocumentStore, FieldFilter, FieldValue, Priority, Task, TaskStatus};
use crate::error::StoreError;

pub struct TaskRecorder<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
}

impl<'a> TaskRecorder<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    /// Writes a new pending task. An empty description is a silent no-op and
    /// returns `Ok(None)`.
    pub async fn submit_task(
        &self,
        description: &str,
        priority: Priority,
    ) -> Result<Option<String>, StoreError> {
        if description.is_empty() {
            return Ok(None);
        }

        let task = Task {
            id: String::new(),
            description: description.to_string(),
            priority,
            status: TaskStatus::Pending,
            created_at: Some(Utc::now()),
        };

        let id = self
            .store
            .create(&self.collection, task.to_document())
            .await?;
        log::info!("Task added to '{}' with id {}", self.collection, id);
        Ok(Some(id))
    }

    /// Pending tasks in store order. Documents that don't decode as tasks are
    /// skipped.
    pub async fn list_pending_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let filter = FieldFilter::equals(
            "status",
            FieldValue::String(TaskStatus::Pending.as_str().to_string()),
        );

        let docs = self.store.query(&self.collection, &filter).await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match Task::from_document(doc) {
                Ok(task) => Some(task),
                Err(e) => {
                    log::warn!("Skipping document: {}", e);
                    None
                }
            })
            .collect())
    }
}
