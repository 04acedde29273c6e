use chrono::Utc;
use crewboard_shared::{collections, Profile, Task, TaskStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{Patch, Query, RecordStore};
use crate::error::{StoreError, StoreResult};

/// Typed access to the record store.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn RecordStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Documents that fail to decode are logged and skipped.
    pub async fn list_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> StoreResult<Vec<T>> {
        let records = self.store.list(collection, query).await?;
        let mut items = Vec::with_capacity(records.len());

        for record in records {
            match serde_json::from_value::<T>(record) {
                Ok(item) => items.push(item),
                Err(e) => warn!(collection, error = %e, "Skipping undecodable record"),
            }
        }

        Ok(items)
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: Uuid,
    ) -> StoreResult<Option<T>> {
        match self.store.get(collection, id).await? {
            Some(record) => serde_json::from_value(record)
                .map(Some)
                .map_err(|e| StoreError::decode(collection, e)),
            None => Ok(None),
        }
    }

    pub async fn insert_as<T: Serialize>(&self, collection: &str, item: &T) -> StoreResult<()> {
        self.store
            .insert(collection, serde_json::to_value(item)?)
            .await?;
        Ok(())
    }

    // ===== Tasks =====

    pub async fn task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        self.get_as(collections::TASKS, id).await
    }

    pub async fn require_task(&self, id: Uuid) -> StoreResult<Task> {
        self.task(id)
            .await?
            .ok_or_else(|| StoreError::not_found(collections::TASKS, id))
    }

    /// Every task whose status is not `done`.
    pub async fn open_tasks(&self) -> StoreResult<Vec<Task>> {
        let query = Query::new().ne("status", TaskStatus::Done.as_str());
        self.list_as(collections::TASKS, &query).await
    }

    pub async fn open_tasks_for(&self, member_id: Uuid) -> StoreResult<Vec<Task>> {
        let query = Query::new()
            .array_contains("assigned_to", member_id.to_string())
            .ne("status", TaskStatus::Done.as_str());
        self.list_as(collections::TASKS, &query).await
    }

    pub async fn backlog_tasks_for(&self, member_id: Uuid, limit: usize) -> StoreResult<Vec<Task>> {
        let query = Query::new()
            .array_contains("assigned_to", member_id.to_string())
            .eq("status", TaskStatus::Backlog.as_str())
            .limit(limit);
        self.list_as(collections::TASKS, &query).await
    }

    /// Merge `patch` into the task and stamp `updated_at`.
    pub async fn update_task(&self, id: Uuid, mut patch: Patch) -> StoreResult<()> {
        patch.insert("updated_at".to_string(), serde_json::to_value(Utc::now())?);
        self.store.update(collections::TASKS, id, patch).await?;
        Ok(())
    }

    pub async fn set_task_field(&self, id: Uuid, field: &str, value: Value) -> StoreResult<()> {
        let mut patch = Patch::new();
        patch.insert(field.to_string(), value);
        self.update_task(id, patch).await
    }

    pub async fn set_assignees(&self, id: Uuid, assignees: &[Uuid]) -> StoreResult<()> {
        self.set_task_field(id, "assigned_to", serde_json::to_value(assignees)?)
            .await
    }

    // ===== Profiles =====

    pub async fn profiles(&self, role: Option<&str>) -> StoreResult<Vec<Profile>> {
        let query = match role {
            Some(role) => Query::new().eq("role", role),
            None => Query::new(),
        };
        self.list_as(collections::PROFILES, &query).await
    }

    pub async fn profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        self.get_as(collections::PROFILES, id).await
    }
}
