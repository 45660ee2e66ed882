use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;

use crate::cluster::job::{JobDescriptor, JobResult, JobSpec};
use crate::error::{Error, Result};
use crate::units;

/// Per-collection job counts, taken under the same lock as mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Holds jobs through their lifecycle: pending (FIFO) → running →
/// completed/failed. A job lives in exactly one collection at a time and the
/// transitions are one-way.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: VecDeque<JobDescriptor>,
    running: HashMap<String, JobDescriptor>,
    completed: Vec<JobResult>,
    failed: Vec<JobResult>,
    job_counter: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize a submission, then append it to pending.
    /// Returns the (possibly generated) job id.
    pub fn add(&mut self, spec: JobSpec) -> Result<String> {
        if spec.cmd.is_empty() || spec.cmd[0].trim().is_empty() {
            return Err(Error::Validation("job command must not be empty".to_string()));
        }

        let cpu_demand = spec.p.unwrap_or(1);
        if cpu_demand == 0 {
            return Err(Error::Validation("cpu demand must be at least 1".to_string()));
        }

        let memory_demand = match spec.m.as_deref() {
            Some(m) => Some(units::parse_memory(m).map_err(|e| Error::Validation(e.to_string()))?),
            None => None,
        };

        let timeout = match spec.timeout {
            Some(secs) if secs > 0.0 => Some(Duration::from_secs_f64(secs)),
            Some(secs) => {
                return Err(Error::Validation(format!(
                    "timeout must be positive, got {secs}"
                )))
            }
            None => None,
        };

        let id = match spec.id {
            Some(id) => id,
            None => {
                self.job_counter += 1;
                format!("job_{:04}", self.job_counter)
            }
        };

        self.pending.push_back(JobDescriptor {
            id: id.clone(),
            command: spec.cmd,
            cpu_demand,
            memory_demand,
            working_dir: spec.cwd,
            env: spec.env,
            timeout,
        });
        Ok(id)
    }

    /// Remove and return the first pending job (in enqueue order) whose
    /// demands fit the free capacity.
    ///
    /// This is first-fit, not best-fit: a large job that never fits can be
    /// starved indefinitely by smaller always-fitting jobs. Documented
    /// limitation, kept for predictable FIFO behavior.
    pub fn next_admissible(&mut self, free_cpu: u32, free_memory_mb: u64) -> Option<JobDescriptor> {
        let position = self.pending.iter().position(|job| {
            job.cpu_demand <= free_cpu && job.memory_demand.is_none_or(|mb| mb <= free_memory_mb)
        })?;
        self.pending.remove(position)
    }

    /// Profiling variant: gate only on CPU demand, ignore memory entirely.
    pub fn next_profilable(&mut self, cpu_budget: u32) -> Option<JobDescriptor> {
        let position = self
            .pending
            .iter()
            .position(|job| job.cpu_demand <= cpu_budget)?;
        self.pending.remove(position)
    }

    /// Remove every pending job that could never fit the given budgets and
    /// return them. Called when the loop would otherwise spin forever on
    /// infeasible work.
    pub fn drain_infeasible(&mut self, cpu_budget: u32, memory_budget_mb: u64) -> Vec<JobDescriptor> {
        let mut infeasible = Vec::new();
        self.pending.retain(|job| {
            let fits = job.cpu_demand <= cpu_budget
                && job.memory_demand.is_none_or(|mb| mb <= memory_budget_mb);
            if !fits {
                infeasible.push(job.clone());
            }
            fits
        });
        infeasible
    }

    pub fn mark_running(&mut self, job: JobDescriptor) {
        self.running.insert(job.id.clone(), job);
    }

    /// Record a result, routing it into completed or failed by its success
    /// flag and dropping the running entry.
    pub fn mark_completed(&mut self, result: JobResult) {
        self.running.remove(&result.job_id);
        if result.success {
            self.completed.push(result);
        } else {
            self.failed.push(result);
        }
    }

    pub fn stats(&self) -> QueueStats {
        let (pending, running) = (self.pending.len(), self.running.len());
        let (completed, failed) = (self.completed.len(), self.failed.len());
        QueueStats {
            pending,
            running,
            completed,
            failed,
            total: pending + running + completed + failed,
        }
    }

    pub fn completed_jobs(&self) -> &[JobResult] {
        &self.completed
    }

    pub fn failed_jobs(&self) -> &[JobResult] {
        &self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn spec(cmd: &[&str]) -> JobSpec {
        JobSpec::new(cmd.iter().copied())
    }

    fn result_for(id: &str, success: bool) -> JobResult {
        JobResult {
            job_id: id.to_string(),
            command: vec!["true".to_string()],
            exit_code: if success { 0 } else { 1 },
            stdout: String::new(),
            stderr: String::new(),
            runtime: 0.0,
            peak_memory_mb: 0.0,
            cpu_used: 1,
            start_time: Utc::now(),
            end_time: Utc::now(),
            success,
            error: None,
        }
    }

    #[test]
    fn add_generates_sequential_ids() {
        let mut queue = JobQueue::new();
        assert_eq!(queue.add(spec(&["true"])).unwrap(), "job_0001");
        assert_eq!(queue.add(spec(&["true"])).unwrap(), "job_0002");
    }

    #[test]
    fn add_keeps_caller_id() {
        let mut queue = JobQueue::new();
        let id = queue.add(spec(&["true"]).with_id("align-chr1")).unwrap();
        assert_eq!(id, "align-chr1");
    }

    #[test]
    fn add_rejects_empty_command() {
        let mut queue = JobQueue::new();
        assert!(matches!(
            queue.add(JobSpec::new(Vec::<String>::new())),
            Err(Error::Validation(_))
        ));
        assert!(queue.add(spec(&[""])).is_err());
    }

    #[test]
    fn add_rejects_zero_cpu_and_bad_memory_and_bad_timeout() {
        let mut queue = JobQueue::new();
        assert!(queue.add(spec(&["true"]).cpu(0)).is_err());
        assert!(queue.add(spec(&["true"]).memory("lots")).is_err());
        assert!(queue.add(spec(&["true"]).with_timeout(-1.0)).is_err());
        assert_eq!(queue.stats().pending, 0);
    }

    #[test]
    fn add_normalizes_defaults() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["true"])).unwrap();
        let job = queue.next_admissible(8, 1024).unwrap();
        assert_eq!(job.cpu_demand, 1);
        assert!(job.memory_demand.is_none());
        assert!(job.timeout.is_none());
    }

    #[test]
    fn next_admissible_is_first_fit_by_enqueue_order() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["big"]).cpu(4)).unwrap();
        queue.add(spec(&["small"]).cpu(1)).unwrap();

        // Only one CPU free: the big job is skipped, the small one dispatches.
        let job = queue.next_admissible(1, 1024).unwrap();
        assert_eq!(job.command, vec!["small"]);
        assert_eq!(queue.stats().pending, 1);

        // Full capacity: the big job now goes first.
        let job = queue.next_admissible(4, 1024).unwrap();
        assert_eq!(job.command, vec!["big"]);
    }

    #[test]
    fn next_admissible_respects_memory_gate() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["hungry"]).memory("2G")).unwrap();
        assert!(queue.next_admissible(8, 1024).is_none());
        assert!(queue.next_admissible(8, 2048).is_some());
    }

    #[test]
    fn unset_memory_is_unconstrained() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["true"])).unwrap();
        assert!(queue.next_admissible(1, 0).is_some());
    }

    #[test]
    fn next_profilable_ignores_memory() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["hungry"]).memory("64G")).unwrap();
        queue.add(spec(&["wide"]).cpu(16)).unwrap();

        assert_eq!(queue.next_profilable(4).unwrap().command, vec!["hungry"]);
        // cpu gate still applies
        assert!(queue.next_profilable(4).is_none());
    }

    #[test]
    fn drain_infeasible_pulls_oversized_jobs() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["fits"])).unwrap();
        queue.add(spec(&["wide"]).cpu(64)).unwrap();
        queue.add(spec(&["hungry"]).memory("1T")).unwrap();

        let infeasible = queue.drain_infeasible(8, 16 * 1024);
        assert_eq!(infeasible.len(), 2);
        assert_eq!(queue.stats().pending, 1);
    }

    #[test]
    fn mark_completed_routes_by_success() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["true"]).with_id("a")).unwrap();
        queue.add(spec(&["false"]).with_id("b")).unwrap();

        let a = queue.next_admissible(8, 1024).unwrap();
        queue.mark_running(a);
        let b = queue.next_admissible(8, 1024).unwrap();
        queue.mark_running(b);
        assert_eq!(queue.stats().running, 2);

        queue.mark_completed(result_for("a", true));
        queue.mark_completed(result_for("b", false));

        let stats = queue.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn stats_counts_every_collection() {
        let mut queue = JobQueue::new();
        queue.add(spec(&["one"])).unwrap();
        queue.add(spec(&["two"])).unwrap();
        let job = queue.next_admissible(8, 1024).unwrap();
        queue.mark_running(job);

        let stats = queue.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.total, 2);
    }
}
