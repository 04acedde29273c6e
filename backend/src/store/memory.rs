use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crewboard_shared::{collections, Escalation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{compare_fields, prepare_record, Patch, Query, Record, RecordStore, SortDirection};
use crate::error::{StoreError, StoreResult};

/// In-process record store. Documents keep insertion order within a collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful insert/update calls since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed documents without counting them as writes.
    pub async fn seed(&self, collection: &str, records: Vec<Record>) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        for record in records {
            let (_, record) = prepare_record(record)?;
            docs.push(record);
        }
        Ok(())
    }

    fn record_id(record: &Record) -> Option<Uuid> {
        record
            .get("id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>> {
        let guard = self.collections.read().await;
        let mut records: Vec<Record> = guard
            .get(collection)
            .map(|docs| docs.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            records.sort_by(|a, b| {
                let ordering = compare_fields(a.get(field), b.get(field));
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            records.truncate(limit);
        }

        Ok(records)
    }

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Record>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|r| Self::record_id(r) == Some(id)))
            .cloned())
    }

    async fn insert(&self, collection: &str, record: Record) -> StoreResult<Record> {
        let (id, record) = prepare_record(record)?;
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();

        if docs.iter().any(|r| Self::record_id(r) == Some(id)) {
            return Err(StoreError::InvalidRecord(format!(
                "{} record {} already exists",
                collection, id
            )));
        }

        docs.push(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Patch) -> StoreResult<Record> {
        let mut guard = self.collections.write().await;
        let record = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|r| Self::record_id(r) == Some(id)))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        if let Some(object) = record.as_object_mut() {
            for (key, value) in patch {
                if key != "id" {
                    object.insert(key, value);
                }
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn insert_escalation_if_absent(
        &self,
        escalation: &Escalation,
        window: Duration,
    ) -> StoreResult<bool> {
        let cutoff = escalation
            .created_at
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let task_id = escalation.task_id.to_string();

        // Check and insert under one write lock.
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collections::ESCALATIONS.to_string()).or_default();

        let recent = docs.iter().any(|r| {
            r.get("task_id").and_then(Value::as_str) == Some(task_id.as_str())
                && r.get("rule_id").and_then(Value::as_str) == Some(escalation.rule_id.as_str())
                && r.get("created_at")
                    .and_then(Value::as_str)
                    .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
                    .map(|created| created > cutoff)
                    .unwrap_or(false)
        });

        if recent {
            return Ok(false);
        }

        docs.push(serde_json::to_value(escalation)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
