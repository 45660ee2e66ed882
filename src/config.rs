use std::time::Duration;

use crate::error::Result;
use crate::units;

/// Default pause between scheduling ticks when nothing was dispatched or
/// harvested.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default interval between memory samples for a running job.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(500);

/// Immutable per-cluster configuration: resource budgets and reporting knobs.
///
/// Budgets are resolved at construction time. Anything left unspecified is
/// filled in from the machine: all detected CPUs and 90% of currently
/// available memory.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Total CPU slot budget.
    pub cpus: u32,
    /// Total memory budget in MB.
    pub memory_mb: u64,
    /// Emit per-job log lines through tracing.
    pub verbose: bool,
    /// Show a progress bar during execution.
    pub progress: bool,
    /// Scheduling loop poll interval.
    pub poll_interval: Duration,
    /// Memory sampling interval.
    pub sampling_interval: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::detect()
    }
}

impl ClusterConfig {
    /// Build a configuration sized to this machine.
    pub fn detect() -> Self {
        let (cpus, available_mb) = units::system_resources();
        Self {
            cpus,
            // Leave headroom for the rest of the system
            memory_mb: available_mb * 9 / 10,
            verbose: true,
            progress: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
        }
    }

    /// Set the CPU budget to an explicit core count.
    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = cpus.max(1);
        self
    }

    /// Set the CPU budget from a spec string ("4" or "50%").
    pub fn with_cpu_spec(mut self, spec: &str) -> Result<Self> {
        let (total, _) = units::system_resources();
        self.cpus = units::parse_cpus(spec, total)?;
        Ok(self)
    }

    /// Set the memory budget in MB.
    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Set the memory budget from a spec string ("16G", "2048M").
    pub fn with_memory(mut self, spec: &str) -> Result<Self> {
        self.memory_mb = units::parse_memory(spec)?;
        Ok(self)
    }

    /// Disable per-job log lines.
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Disable the progress bar.
    pub fn no_progress(mut self) -> Self {
        self.progress = false;
        self
    }
}
