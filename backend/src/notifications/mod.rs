// Notifications - in-app notification records for automation side effects
//
// Delivery and display belong to the surrounding application; the core only
// writes notification records. Creation never fails outward: callers inspect
// the returned outcome.

use async_trait::async_trait;
use chrono::Utc;
use crewboard_shared::{collections, Notification, NotificationKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::store::RecordStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn create_notification(&self, notification: NewNotification) -> NotificationOutcome;
}

/// Send the same notification to each user. Failures are isolated per
/// recipient; returns how many were created.
pub async fn notify_users(
    notifier: &dyn Notifier,
    user_ids: &[Uuid],
    kind: NotificationKind,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> usize {
    let mut delivered = 0;

    for user_id in user_ids {
        let notification = NewNotification::new(*user_id, kind, title, message)
            .with_link(link.map(str::to_string));

        let outcome = notifier.create_notification(notification).await;
        if outcome.success {
            delivered += 1;
        } else {
            error!(
                user_id = %user_id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Failed to create notification"
            );
        }
    }

    delivered
}

/// Writes notification records into the `notifications` collection.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn RecordStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn create_notification(&self, notification: NewNotification) -> NotificationOutcome {
        let record = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            link: notification.link,
            read: false,
            created_at: Utc::now(),
        };

        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => return NotificationOutcome::failed(e.to_string()),
        };

        match self.store.insert(collections::NOTIFICATIONS, value).await {
            Ok(_) => {
                debug!(user_id = %record.user_id, title = %record.title, "Notification created");
                NotificationOutcome::ok()
            }
            Err(e) => NotificationOutcome::failed(e.to_string()),
        }
    }
}
