//! Sampling-based peak-memory measurement for running jobs.
//!
//! One lightweight task per job samples resident memory of the job's process
//! plus all live descendants at a fixed interval and tracks the peak. This is
//! best-effort by design: allocations that come and go between samples are
//! undercounted, and lookups racing a process exit are simply dropped from
//! that sample.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_SAMPLING_INTERVAL;

/// Bounded wait for a sampler to observe cancellation before the runner
/// gives up on it.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Latest snapshot for one job.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySample {
    pub current_mb: f64,
    pub peak_mb: f64,
}

/// Handle to one job's sampling task. Dropping it without calling
/// [`SamplerHandle::stop`] leaves the task to exit on its own when the
/// process disappears.
pub struct SamplerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Ask the sampler to stop and wait for it, bounded by a small grace
    /// period so a slow sampler never delays job completion.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = tokio::time::timeout(STOP_GRACE, self.task).await;
    }
}

/// Tracks peak resident memory per running job, keyed by job id.
#[derive(Debug)]
pub struct MemoryMonitor {
    sampling_interval: Duration,
    samples: Arc<Mutex<HashMap<String, MemorySample>>>,
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLING_INTERVAL)
    }
}

impl MemoryMonitor {
    pub fn new(sampling_interval: Duration) -> Self {
        Self {
            sampling_interval,
            samples: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn the sampling task for a freshly started process.
    ///
    /// The task runs until cancelled or until the root pid can no longer be
    /// found, whichever comes first. Sampling errors never surface anywhere;
    /// the job outcome does not depend on instrumentation.
    pub fn start_sampling(&self, job_id: &str, pid: u32) -> SamplerHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let samples = Arc::clone(&self.samples);
        let job_id = job_id.to_string();
        let interval = self.sampling_interval;

        let task = tokio::spawn(async move {
            let mut system = System::new();
            let root = Pid::from_u32(pid);
            let mut peak_mb: f64 = 0.0;

            // First sample lands right away, so even jobs shorter than one
            // interval report a peak.
            loop {
                system.refresh_processes_specifics(
                    ProcessesToUpdate::All,
                    true,
                    ProcessRefreshKind::nothing().with_memory(),
                );

                let Some(current_mb) = tree_memory_mb(&system, root) else {
                    // Root already exited; the final peak stays published.
                    break;
                };
                peak_mb = peak_mb.max(current_mb);

                if let Ok(mut map) = samples.lock() {
                    map.insert(
                        job_id.clone(),
                        MemorySample {
                            current_mb,
                            peak_mb,
                        },
                    );
                }

                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        SamplerHandle { token, task }
    }

    /// Peak resident memory observed for a job, in MB. 0 if never sampled.
    pub fn peak_memory_mb(&self, job_id: &str) -> f64 {
        self.samples
            .lock()
            .map(|map| map.get(job_id).map(|s| s.peak_mb).unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    /// Latest snapshot for a job, if one was ever published.
    pub fn sample(&self, job_id: &str) -> Option<MemorySample> {
        self.samples.lock().ok()?.get(job_id).copied()
    }

    /// Evict a finished job's entry.
    pub fn cleanup(&self, job_id: &str) {
        if let Ok(mut map) = self.samples.lock() {
            map.remove(job_id);
        }
    }
}

/// Resident memory of `root` plus all live descendants, in MB.
///
/// Returns `None` when the root process itself is gone. Children that exit
/// between the refresh and this walk just drop out of the sum.
fn tree_memory_mb(system: &System, root: Pid) -> Option<f64> {
    let root_proc = system.process(root)?;
    let mut total_bytes = root_proc.memory();

    let mut tree: HashSet<Pid> = HashSet::new();
    tree.insert(root);

    // Expand the descendant set until it stops growing. Process tables are
    // small enough that the quadratic worst case does not matter here.
    let mut grew = true;
    while grew {
        grew = false;
        for (pid, process) in system.processes() {
            if tree.contains(pid) {
                continue;
            }
            if let Some(parent) = process.parent() {
                if tree.contains(&parent) {
                    tree.insert(*pid);
                    total_bytes += process.memory();
                    grew = true;
                }
            }
        }
    }

    Some(total_bytes as f64 / (1024.0 * 1024.0))
}
