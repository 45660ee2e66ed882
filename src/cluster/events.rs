//! Scheduler events and the observer seam.
//!
//! Progress display and logging hang off these events instead of reaching
//! into scheduler state, so there is no process-wide logging singleton and
//! reporters only ever see what the loop tells them.

use std::time::Duration;

use crate::units::{format_duration, format_memory};

#[derive(Debug, Clone)]
pub enum ClusterEvent {
    RunStarted {
        total_jobs: usize,
        cpu_budget: u32,
        memory_budget_mb: u64,
    },
    JobStarted {
        job_id: String,
        command_summary: String,
    },
    JobFinished {
        job_id: String,
        command_summary: String,
        success: bool,
        runtime: Duration,
        peak_memory_mb: f64,
    },
    RunFinished {
        completed: usize,
        failed: usize,
        runtime: Duration,
    },
}

/// Injected observer invoked by the scheduling loop on admit/complete/run
/// boundaries. Implementations must be cheap; they run on the loop itself.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &ClusterEvent);
}

/// Default observer: renders events as tracing log lines.
pub struct LogObserver;

impl EventObserver for LogObserver {
    fn on_event(&self, event: &ClusterEvent) {
        match event {
            ClusterEvent::RunStarted {
                total_jobs,
                cpu_budget,
                memory_budget_mb,
            } => {
                tracing::info!(
                    total_jobs,
                    cpu_budget,
                    memory_budget = %format_memory(*memory_budget_mb as f64),
                    "Starting execution"
                );
            }
            ClusterEvent::JobStarted {
                job_id,
                command_summary,
            } => {
                tracing::info!(job_id = %job_id, command = %command_summary, "Job started");
            }
            ClusterEvent::JobFinished {
                job_id,
                command_summary,
                success,
                runtime,
                peak_memory_mb,
            } => {
                tracing::info!(
                    job_id = %job_id,
                    command = %command_summary,
                    success,
                    runtime = %format_duration(runtime.as_secs_f64()),
                    peak_memory = %format_memory(*peak_memory_mb),
                    "Job finished"
                );
            }
            ClusterEvent::RunFinished {
                completed,
                failed,
                runtime,
            } => {
                tracing::info!(
                    completed,
                    failed,
                    runtime = %format_duration(runtime.as_secs_f64()),
                    "Execution completed"
                );
            }
        }
    }
}
