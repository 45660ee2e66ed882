//! memsched - memory-aware batch execution of subprocess jobs.
//!
//! Runs many independent external commands against one machine's finite CPU
//! and memory budget. Jobs declare what they need; the scheduler admits them
//! first-fit in enqueue order whenever the declared demands fit the free
//! capacity, and measures the peak resident memory each one actually used.
//!
//! ```no_run
//! use memsched::{ClusterConfig, Cluster, JobSpec};
//!
//! # async fn demo() -> memsched::Result<()> {
//! let cluster = Cluster::new(ClusterConfig::detect().with_cpus(6).with_memory("16G")?);
//!
//! cluster
//!     .append(JobSpec::new(["samtools", "sort", "a.bam"]).cpu(2).memory("1G"))
//!     .await?;
//! cluster
//!     .append(JobSpec::new(["gzip", "reads.fastq"]).memory("100M"))
//!     .await?;
//!
//! let stats = cluster.run(None).await?;
//! println!("{} completed, {} failed", stats.jobs.completed, stats.jobs.failed);
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod progress;
pub mod shutdown;
pub mod units;
pub mod worker;

pub use cluster::events::{ClusterEvent, EventObserver, LogObserver};
pub use cluster::job::{JobDescriptor, JobResult, JobSpec};
pub use cluster::ledger::{ResourceLedger, ResourceUsage};
pub use cluster::queue::{JobQueue, QueueStats};
pub use cluster::{Cluster, ClusterStats, RunStats};
pub use config::ClusterConfig;
pub use error::{Error, Result};
pub use progress::ProgressReporter;

/// Create a cluster sized to this machine (all CPUs, 90% of available
/// memory).
pub fn cluster() -> Cluster {
    Cluster::new(ClusterConfig::detect())
}

/// Shorthand for starting a job spec from a command.
pub fn job<I, S>(cmd: I) -> JobSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    JobSpec::new(cmd)
}
