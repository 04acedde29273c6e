use crewboard_shared::{collections, Escalation, Notification, NotificationKind, Profile, Task};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::automation::Automation;
use crate::config::AutomationConfig;
use crate::store::{MemoryStore, Query, RecordStore, Repository};

/// Automation core over a fresh in-memory store.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub automation: Automation,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(AutomationConfig::default())
    }

    pub fn with_config(config: AutomationConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let automation = Automation::new(store.clone(), &config);
        Self { store, automation }
    }

    pub fn repo(&self) -> &Repository {
        self.automation.repository()
    }

    pub async fn seed<T: Serialize>(&self, collection: &str, items: &[T]) {
        let records = items
            .iter()
            .map(|item| serde_json::to_value(item).expect("fixture serializes"))
            .collect();
        self.store.seed(collection, records).await.expect("seed succeeds");
    }

    pub async fn seed_tasks(&self, tasks: &[Task]) {
        self.seed(collections::TASKS, tasks).await;
    }

    pub async fn seed_profiles(&self, profiles: &[Profile]) {
        self.seed(collections::PROFILES, profiles).await;
    }

    pub async fn task(&self, id: Uuid) -> Task {
        self.repo().require_task(id).await.expect("task exists")
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.repo()
            .list_as(collections::NOTIFICATIONS, &Query::new())
            .await
            .expect("notifications readable")
    }

    pub async fn notifications_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.notifications()
            .await
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    pub async fn escalations(&self) -> Vec<Escalation> {
        self.repo()
            .list_as(collections::ESCALATIONS, &Query::new())
            .await
            .expect("escalations readable")
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .list(collection, &Query::new())
            .await
            .map(|records| records.len())
            .unwrap_or_default()
    }
}
