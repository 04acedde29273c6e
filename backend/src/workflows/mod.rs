// Workflow Automation Engine
//
// Rule engine reacting to task lifecycle events: fetch enabled rules for a
// trigger, evaluate their conditions against the event data, and dispatch
// the actions of every matching rule.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod presets;
pub mod triggers;

pub use actions::{ActionKind, ActionOutcome, RuleAction};
pub use conditions::{Condition, ConditionOperator};
pub use engine::{WorkflowEngine, WorkflowRule, WorkflowRunSummary};
pub use executor::{ActionDispatcher, ExecutionContext};
pub use triggers::{EventPayload, TriggerEvent, TriggerType};
