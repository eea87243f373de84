//! SLA monitor: a process-lifetime task that red-flags overdue issues once an hour.

mod monitor;
mod schedule;

pub use monitor::{MonitorError, SlaMonitor, SweepReport, DEFAULT_MAX_SWEEP};
pub use schedule::{next_top_of_hour, spawn, MonitorHandle};
