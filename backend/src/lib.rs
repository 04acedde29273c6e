//! Task automation core: workflow rules, escalations and workload balancing
//! over a shared record store.

pub mod automation;
pub mod config;
pub mod database;
pub mod error;
pub mod escalation;
pub mod jobs;
pub mod notifications;
pub mod store;
pub mod workflows;
pub mod workload;

pub use automation::Automation;
pub use config::{AutomationConfig, Config};
pub use error::{ActionError, ConfigError, StoreError};
pub use store::{MemoryStore, PgStore, RecordStore, Repository};

#[cfg(test)]
mod tests;
