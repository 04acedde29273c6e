// Record Store - generic document access over the shared collections
//
// The automation core never talks to a database directly. Everything goes
// through `RecordStore`, which reads and writes JSON documents keyed by
// collection and id. `Repository` layers typed access on top.

pub mod memory;
pub mod postgres;
pub mod repository;

use async_trait::async_trait;
use chrono::Duration;
use crewboard_shared::Escalation;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::Repository;

/// A stored document. Always a JSON object carrying an `id`.
pub type Record = Value;

/// Partial update, merged into the stored document key by key.
pub type Patch = Map<String, Value>;

/// Filter on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Also matches documents where the field is absent.
    Ne(String, Value),
    /// Field is an array holding the value.
    ArrayContains(String, Value),
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq(field, value) => record.get(field) == Some(value),
            Filter::Ne(field, value) => record.get(field) != Some(value),
            Filter::ArrayContains(field, value) => record
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Filtered list query. Filters are AND-ed.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Ne(field.to_string(), value.into()));
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>>;

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Record>>;

    /// Insert a document, assigning an id when it has none. Returns the stored document.
    async fn insert(&self, collection: &str, record: Record) -> StoreResult<Record>;

    /// Merge `patch` into the document. Returns the merged document.
    async fn update(&self, collection: &str, id: Uuid, patch: Patch) -> StoreResult<Record>;

    /// Atomically insert the escalation unless one for the same (task_id, rule_id)
    /// was created within `window` before `escalation.created_at`.
    /// Returns `true` when the record was inserted.
    async fn insert_escalation_if_absent(
        &self,
        escalation: &Escalation,
        window: Duration,
    ) -> StoreResult<bool>;
}

/// Normalize a document for insertion: must be an object; gets an id if missing.
pub(crate) fn prepare_record(mut record: Record) -> StoreResult<(Uuid, Record)> {
    let object = record
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidRecord("record must be a JSON object".to_string()))?;

    let id = match object.get("id") {
        Some(Value::String(raw)) => Uuid::parse_str(raw)
            .map_err(|e| StoreError::InvalidRecord(format!("invalid id '{}': {}", raw, e)))?,
        Some(Value::Null) | None => {
            let id = Uuid::new_v4();
            object.insert("id".to_string(), Value::String(id.to_string()));
            id
        }
        Some(other) => {
            return Err(StoreError::InvalidRecord(format!("invalid id {}", other)));
        }
    };

    Ok((id, record))
}

/// Ordering used for `order_by`: numbers numerically, strings lexically,
/// documents missing the field sort last.
pub(crate) fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, Some(_)) => Ordering::Greater,
        (Some(_), Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
