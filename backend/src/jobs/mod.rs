// Background Jobs
//
// Periodic drivers for the automation core. Jobs are scheduled using
// tokio-cron-scheduler and call the public scan entry points on a timer.

pub mod deadline_monitor;
pub mod scheduler;

pub use deadline_monitor::{DeadlineMonitor, DeadlineScanReport};
pub use scheduler::{
    execute_job, AutomationJob, JobConfig, JobError, JobExecutionLog, JobResult, JobScheduler,
    JobStatus,
};
