//! Job execution engine.
//!
//! - [`JobRunner`]: runs one job to completion — spawn, concurrent memory
//!   sampling, timeout enforcement, output collection.
//! - [`MemoryMonitor`]: per-job background sampling of peak resident memory
//!   across the job's whole process tree.
//!
//! The scheduling loop dispatches each job onto its own worker task; that
//! task is blocked for the job's full runtime plus sampler teardown, and
//! nothing here ever stalls the loop itself.

pub mod memory;
pub mod runner;

pub use memory::{MemoryMonitor, MemorySample};
pub use runner::JobRunner;
