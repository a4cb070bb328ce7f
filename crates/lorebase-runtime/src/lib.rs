//! Lorebase Runtime — background maintenance of the document index.

pub mod scheduler;

pub use scheduler::{RefreshScheduler, SchedulerStatus};
