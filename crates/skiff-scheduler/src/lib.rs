//! Scheduler runtime for the background orchestration subsystem.
//!
//! Owns the set of periodic tasks (metrics collection, retry sweep, KPI
//! snapshot, image staleness, backup, cleanup, health log), sequences
//! startup against the upstream API, runs the event-bus listener backing
//! webhook dispatch, and tears everything down idempotently on shutdown.
//! One task's failure never aborts another task or the process.

pub mod runtime;
pub mod startup;
pub mod tasks;

pub use runtime::Scheduler;
pub use startup::{verify_upstream, warm_cache};
pub use tasks::{register_standard_tasks, TaskConfig, TaskContext};
