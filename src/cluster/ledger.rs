use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Snapshot of currently reserved resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub cpu_in_use: u32,
    pub memory_in_use_mb: u64,
    pub active_jobs: usize,
}

/// Shared counters of reserved CPU slots and memory.
///
/// Credits declared demand, not measured usage. Admissions and releases come
/// exclusively from the scheduling loop in matched pairs, so the counters
/// never exceed the budgets the loop checks against before admitting.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    cpu_in_use: AtomicU32,
    memory_in_use_mb: AtomicU64,
    active_jobs: AtomicUsize,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve resources for one dispatched job.
    pub fn admit(&self, cpu: u32, memory_mb: Option<u64>) {
        self.cpu_in_use.fetch_add(cpu, Ordering::SeqCst);
        if let Some(mb) = memory_mb {
            self.memory_in_use_mb.fetch_add(mb, Ordering::SeqCst);
        }
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    /// Return resources for one harvested job. Saturating, so a spurious
    /// double release cannot drive the counters negative.
    pub fn release(&self, cpu: u32, memory_mb: Option<u64>) {
        let _ = self
            .cpu_in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(cpu))
            });
        if let Some(mb) = memory_mb {
            let _ = self
                .memory_in_use_mb
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                    Some(v.saturating_sub(mb))
                });
        }
        let _ = self
            .active_jobs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub fn snapshot(&self) -> ResourceUsage {
        ResourceUsage {
            cpu_in_use: self.cpu_in_use.load(Ordering::SeqCst),
            memory_in_use_mb: self.memory_in_use_mb.load(Ordering::SeqCst),
            active_jobs: self.active_jobs.load(Ordering::SeqCst),
        }
    }
}
