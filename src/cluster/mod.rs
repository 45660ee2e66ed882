//! The cluster: job submission surface and the resource-aware scheduling
//! loop that drives everything else.

pub mod events;
pub mod job;
pub mod ledger;
pub mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use crate::worker::{JobRunner, MemoryMonitor};

use events::{ClusterEvent, EventObserver, LogObserver};
use job::{JobDescriptor, JobResult, JobSpec};
use ledger::{ResourceLedger, ResourceUsage};
use queue::{JobQueue, QueueStats};

/// Budget and wall-clock summary for one cluster instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterStats {
    pub cpu_budget: u32,
    pub memory_budget_mb: u64,
    pub runtime_secs: f64,
}

/// Aggregate statistics snapshot: budgets, per-collection job counts, and
/// currently reserved resources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunStats {
    pub cluster: ClusterStats,
    pub jobs: QueueStats,
    pub resources: ResourceUsage,
}

#[derive(Debug, Default)]
struct RunTiming {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// A single-machine compute cluster: enqueue jobs, then `run` them under the
/// configured CPU and memory budgets, or `profile` them sequentially to
/// measure what they actually use.
///
/// Queue and ledger are scoped to one instance; nothing is shared across
/// clusters.
pub struct Cluster {
    config: ClusterConfig,
    queue: Arc<RwLock<JobQueue>>,
    ledger: Arc<ResourceLedger>,
    monitor: Arc<MemoryMonitor>,
    observers: Vec<Arc<dyn EventObserver>>,
    running: AtomicBool,
    shutdown: CancellationToken,
    timing: Mutex<RunTiming>,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Self {
        let mut observers: Vec<Arc<dyn EventObserver>> = Vec::new();
        if config.verbose {
            observers.push(Arc::new(LogObserver));
        }
        if config.progress {
            observers.push(Arc::new(ProgressReporter::new()));
        }

        Self {
            monitor: Arc::new(MemoryMonitor::new(config.sampling_interval)),
            queue: Arc::new(RwLock::new(JobQueue::new())),
            ledger: Arc::new(ResourceLedger::new()),
            observers,
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            timing: Mutex::new(RunTiming::default()),
            config,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Register an additional observer for scheduler events.
    pub fn add_observer(&mut self, observer: Arc<dyn EventObserver>) {
        self.observers.push(observer);
    }

    /// Token that, when cancelled, makes a running loop stop admitting new
    /// jobs and return once in-flight work has been harvested.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Enqueue one job. Returns the assigned id.
    pub async fn append(&self, spec: JobSpec) -> Result<String> {
        self.queue.write().await.add(spec)
    }

    /// Enqueue several jobs. Fails on the first invalid spec; earlier jobs
    /// in the batch stay enqueued.
    pub async fn extend<I>(&self, specs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = JobSpec>,
    {
        let mut queue = self.queue.write().await;
        specs.into_iter().map(|spec| queue.add(spec)).collect()
    }

    pub async fn completed_jobs(&self) -> Vec<JobResult> {
        self.queue.read().await.completed_jobs().to_vec()
    }

    pub async fn failed_jobs(&self) -> Vec<JobResult> {
        self.queue.read().await.failed_jobs().to_vec()
    }

    /// Statistics snapshot. After a run has finished this is stable: calling
    /// it repeatedly with no further mutation returns identical values.
    pub async fn stats(&self) -> RunStats {
        let jobs = self.queue.read().await.stats();
        let timing = self.timing.lock().await;
        let runtime_secs = match (timing.elapsed, timing.started) {
            (Some(elapsed), _) => elapsed.as_secs_f64(),
            (None, Some(started)) => started.elapsed().as_secs_f64(),
            (None, None) => 0.0,
        };
        RunStats {
            cluster: ClusterStats {
                cpu_budget: self.config.cpus,
                memory_budget_mb: self.config.memory_mb,
                runtime_secs,
            },
            jobs,
            resources: self.ledger.snapshot(),
        }
    }

    /// Run all queued jobs with resource-aware scheduling and return the
    /// final statistics. The run itself succeeds regardless of individual
    /// job outcomes; failures land in the failed collection.
    ///
    /// `max_workers` caps concurrent jobs; it is clamped to the CPU budget.
    /// Calling this while a run or profile is already in progress fails fast
    /// with [`Error::AlreadyRunning`].
    pub async fn run(&self, max_workers: Option<usize>) -> Result<RunStats> {
        self.begin().await?;
        self.execute_jobs(max_workers).await;
        self.end().await;
        Ok(self.stats().await)
    }

    /// Run queued jobs strictly one at a time, ignoring memory constraints,
    /// so memory measurements are not contaminated by neighbors. Useful for
    /// discovering what `m` values to declare.
    ///
    /// Jobs whose CPU demand exceeds the budget are left pending.
    pub async fn profile(&self) -> Result<Vec<JobResult>> {
        self.begin().await?;
        let results = self.profile_jobs().await;
        self.end().await;
        Ok(results)
    }

    async fn begin(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }
        let mut timing = self.timing.lock().await;
        timing.started = Some(Instant::now());
        timing.elapsed = None;
        Ok(())
    }

    async fn end(&self) {
        let mut timing = self.timing.lock().await;
        if let Some(started) = timing.started {
            timing.elapsed = Some(started.elapsed());
        }
        drop(timing);
        self.running.store(false, Ordering::SeqCst);
    }

    /// The scheduling loop. Each tick: harvest finished dispatches, then
    /// dispatch admissible jobs while worker slots are free, then sleep the
    /// poll interval if the tick was idle. Admission checks and ledger
    /// updates all happen on this one task, so in-use counters can never
    /// exceed the budgets at the instant of admission.
    async fn execute_jobs(&self, max_workers: Option<usize>) {
        let cpu_budget = self.config.cpus;
        let memory_budget = self.config.memory_mb;
        let worker_cap = max_workers
            .unwrap_or(cpu_budget as usize)
            .min(cpu_budget as usize)
            .max(1);

        let total_jobs = self.queue.read().await.stats().pending;
        let run_started = Instant::now();
        self.emit(&ClusterEvent::RunStarted {
            total_jobs,
            cpu_budget,
            memory_budget_mb: memory_budget,
        });

        let mut in_flight: Vec<(JobDescriptor, JoinHandle<JobResult>)> = Vec::new();

        loop {
            let mut progressed = false;

            // Harvest whatever finished since the last tick. Completion
            // order is unrelated to dispatch order.
            let mut i = 0;
            while i < in_flight.len() {
                if in_flight[i].1.is_finished() {
                    let (desc, handle) = in_flight.swap_remove(i);
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::error!(job_id = %desc.id, error = %e, "Worker task failed");
                            synthetic_failure(&desc, format!("worker task failed: {e}"))
                        }
                    };
                    self.ledger.release(desc.cpu_demand, desc.memory_demand);
                    self.record_result(&desc, result).await;
                    progressed = true;
                } else {
                    i += 1;
                }
            }

            // Dispatch first-fit by enqueue order until nothing fits or no
            // worker slot is free.
            if !self.shutdown.is_cancelled() {
                while in_flight.len() < worker_cap {
                    let usage = self.ledger.snapshot();
                    let free_cpu = cpu_budget.saturating_sub(usage.cpu_in_use);
                    let free_memory = memory_budget.saturating_sub(usage.memory_in_use_mb);

                    // Remove-and-reinsert under one guard so a concurrent
                    // stats() never sees the job in no collection.
                    let desc = {
                        let mut queue = self.queue.write().await;
                        let Some(desc) = queue.next_admissible(free_cpu, free_memory) else {
                            break;
                        };
                        self.ledger.admit(desc.cpu_demand, desc.memory_demand);
                        queue.mark_running(desc.clone());
                        desc
                    };
                    self.emit(&ClusterEvent::JobStarted {
                        job_id: desc.id.clone(),
                        command_summary: desc.command_summary(),
                    });

                    let runner = JobRunner::new(Arc::clone(&self.monitor));
                    let dispatch = desc.clone();
                    let handle = tokio::spawn(async move { dispatch_job(runner, dispatch).await });
                    in_flight.push((desc, handle));
                    progressed = true;
                }
            }

            if in_flight.is_empty() {
                let pending = self.queue.read().await.stats().pending;
                if pending == 0 || self.shutdown.is_cancelled() {
                    break;
                }
                if !progressed {
                    // Nothing running and nothing admissible at full free
                    // capacity: the remaining pending jobs can never fit.
                    // Fail them rather than spin forever.
                    let infeasible = self
                        .queue
                        .write()
                        .await
                        .drain_infeasible(cpu_budget, memory_budget);
                    for desc in infeasible {
                        tracing::warn!(
                            job_id = %desc.id,
                            cpu_demand = desc.cpu_demand,
                            memory_demand = ?desc.memory_demand,
                            "Job demands exceed the cluster budget, marking failed"
                        );
                        let result = synthetic_failure(
                            &desc,
                            "job demands exceed the cluster budget".to_string(),
                        );
                        self.record_result(&desc, result).await;
                    }
                    continue;
                }
            }

            if !progressed {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        let jobs = self.queue.read().await.stats();
        self.emit(&ClusterEvent::RunFinished {
            completed: jobs.completed,
            failed: jobs.failed,
            runtime: run_started.elapsed(),
        });
    }

    async fn profile_jobs(&self) -> Vec<JobResult> {
        let cpu_budget = self.config.cpus;
        let total_jobs = self.queue.read().await.stats().pending;
        let run_started = Instant::now();
        self.emit(&ClusterEvent::RunStarted {
            total_jobs,
            cpu_budget,
            memory_budget_mb: self.config.memory_mb,
        });

        let runner = JobRunner::new(Arc::clone(&self.monitor));
        let mut results = Vec::new();

        while !self.shutdown.is_cancelled() {
            let desc = {
                let mut queue = self.queue.write().await;
                let Some(desc) = queue.next_profilable(cpu_budget) else {
                    break;
                };
                queue.mark_running(desc.clone());
                desc
            };
            self.emit(&ClusterEvent::JobStarted {
                job_id: desc.id.clone(),
                command_summary: desc.command_summary(),
            });

            let result = runner.execute(&desc).await;
            self.record_result(&desc, result.clone()).await;
            results.push(result);
        }

        let jobs = self.queue.read().await.stats();
        self.emit(&ClusterEvent::RunFinished {
            completed: jobs.completed,
            failed: jobs.failed,
            runtime: run_started.elapsed(),
        });
        results
    }

    async fn record_result(&self, desc: &JobDescriptor, result: JobResult) {
        let event = ClusterEvent::JobFinished {
            job_id: result.job_id.clone(),
            command_summary: desc.command_summary(),
            success: result.success,
            runtime: Duration::from_secs_f64(result.runtime.max(0.0)),
            peak_memory_mb: result.peak_memory_mb,
        };
        self.queue.write().await.mark_completed(result);
        self.emit(&event);
    }

    fn emit(&self, event: &ClusterEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

async fn dispatch_job(runner: JobRunner, desc: JobDescriptor) -> JobResult {
    runner.execute(&desc).await
}

/// Result for a job that never produced one itself: worker panic or demands
/// that can never fit the budget.
fn synthetic_failure(desc: &JobDescriptor, error: String) -> JobResult {
    let now = Utc::now();
    JobResult {
        job_id: desc.id.clone(),
        command: desc.command.clone(),
        exit_code: -1,
        stdout: String::new(),
        stderr: String::new(),
        runtime: 0.0,
        peak_memory_mb: 0.0,
        cpu_used: desc.cpu_demand,
        start_time: now,
        end_time: now,
        success: false,
        error: Some(error),
    }
}
