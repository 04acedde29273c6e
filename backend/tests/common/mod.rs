// Common test utilities that are shared across integration tests
use crewboard_backend::store::Query;
use crewboard_backend::{Automation, AutomationConfig, MemoryStore, RecordStore};
use crewboard_shared::{Profile, Task};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub automation: Automation,
}

impl Harness {
    pub fn new() -> Self {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let automation = Automation::new(store.clone(), &AutomationConfig::default());
        Self { store, automation }
    }

    pub async fn seed<T: Serialize>(&self, collection: &str, items: &[T]) {
        let records = items
            .iter()
            .map(|item| serde_json::to_value(item).unwrap())
            .collect();
        self.store.seed(collection, records).await.unwrap();
    }

    pub async fn all(&self, collection: &str) -> Vec<Value> {
        self.store.list(collection, &Query::new()).await.unwrap()
    }

    pub async fn task(&self, id: Uuid) -> Task {
        self.automation.repository().require_task(id).await.unwrap()
    }
}

pub fn profile(name: &str, role: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: None,
        role: role.to_string(),
        hourly_rate: None,
        skills: Vec::new(),
        availability: None,
    }
}
