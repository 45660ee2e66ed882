use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::cluster::job::{JobDescriptor, JobResult};
use crate::worker::memory::MemoryMonitor;

/// Sentinel exit code for jobs that never produced a real one: launch
/// failures and forced termination on timeout.
const SENTINEL_EXIT_CODE: i32 = -1;

/// Executes one job to completion: spawns the process, samples memory
/// alongside it, enforces the timeout, and collects output and timing.
#[derive(Clone)]
pub struct JobRunner {
    monitor: Arc<MemoryMonitor>,
}

impl JobRunner {
    pub fn new(monitor: Arc<MemoryMonitor>) -> Self {
        Self { monitor }
    }

    /// Run the job and return its result. Per-job failures (launch errors,
    /// timeouts, nonzero exits) are captured in the result, never raised.
    pub async fn execute(&self, job: &JobDescriptor) -> JobResult {
        let start_time = Utc::now();
        let started = Instant::now();

        let mut command = Command::new(&job.command[0]);
        command
            .args(&job.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &job.working_dir {
            command.current_dir(dir);
        }
        if let Some(env) = &job.env {
            // Overrides layer on top of the inherited environment
            command.envs(env);
        }
        // Own process group so a timeout can take the whole tree down
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to launch job");
                return JobResult {
                    job_id: job.id.clone(),
                    command: job.command.clone(),
                    exit_code: SENTINEL_EXIT_CODE,
                    stdout: String::new(),
                    stderr: String::new(),
                    runtime: started.elapsed().as_secs_f64(),
                    peak_memory_mb: 0.0,
                    cpu_used: job.cpu_demand,
                    start_time,
                    end_time: Utc::now(),
                    success: false,
                    error: Some(e.to_string()),
                };
            }
        };

        let sampler = child
            .id()
            .map(|pid| self.monitor.start_sampling(&job.id, pid));

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // Read both pipes while waiting so a chatty process can't fill a
        // pipe buffer and deadlock against us.
        let wait = async {
            let (status, (), ()) = tokio::join!(
                child.wait(),
                read_pipe(&mut stdout_pipe, &mut stdout_buf),
                read_pipe(&mut stderr_pipe, &mut stderr_buf),
            );
            status
        };

        let wait_result = match job.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(res) => Some(res),
                Err(_) => None,
            },
            None => Some(wait.await),
        };

        if wait_result.is_none() {
            tracing::warn!(job_id = %job.id, "Job hit its timeout, killing process tree");
            kill_tree(&mut child).await;
            // Writers are gone; drain whatever already made it into the pipes
            read_pipe(&mut stdout_pipe, &mut stdout_buf).await;
            read_pipe(&mut stderr_pipe, &mut stderr_buf).await;
        }

        if let Some(sampler) = sampler {
            sampler.stop().await;
        }
        let peak_memory_mb = self.monitor.peak_memory_mb(&job.id);
        self.monitor.cleanup(&job.id);

        let (exit_code, success, error) = match wait_result {
            Some(Ok(status)) => (
                status.code().unwrap_or(SENTINEL_EXIT_CODE),
                status.success(),
                None,
            ),
            Some(Err(e)) => (
                SENTINEL_EXIT_CODE,
                false,
                Some(format!("failed to wait for process: {e}")),
            ),
            None => {
                let secs = job.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
                (
                    SENTINEL_EXIT_CODE,
                    false,
                    Some(format!("timed out after {secs}s")),
                )
            }
        };

        let end_time = Utc::now();
        let result = JobResult {
            job_id: job.id.clone(),
            command: job.command.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
            stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
            runtime: started.elapsed().as_secs_f64(),
            peak_memory_mb,
            cpu_used: job.cpu_demand,
            start_time,
            end_time,
            success,
            error,
        };

        tracing::debug!(
            job_id = %result.job_id,
            exit_code = result.exit_code,
            success = result.success,
            "Job process finished"
        );
        result
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: &mut Option<R>, buf: &mut Vec<u8>) {
    if let Some(reader) = pipe {
        let _ = reader.read_to_end(buf).await;
    }
}

/// Forcibly terminate the child and everything it spawned.
async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child leads its own process group; a negative pid signals
        // every member.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    // Kills the direct child on non-unix targets and reaps it everywhere
    let _ = child.kill().await;
}
