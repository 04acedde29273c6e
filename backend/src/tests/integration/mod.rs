pub mod deadlines;
pub mod workflow_engine;
pub mod workload;
