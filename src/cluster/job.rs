use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submission form of a job: the raw record a caller hands to the cluster.
///
/// Resource fields are specs, not resolved values ("1G" rather than 1024);
/// they are validated and normalized into a [`JobDescriptor`] at enqueue.
/// Works both as a plain record (e.g. deserialized from a JSON job file) and
/// as a fluent builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Command and arguments.
    pub cmd: Vec<String>,
    /// CPU slots needed (default 1).
    #[serde(default)]
    pub p: Option<u32>,
    /// Memory requirement spec, e.g. "512M", "1G" (default unconstrained).
    #[serde(default)]
    pub m: Option<String>,
    /// Caller-chosen id (auto-generated when absent).
    #[serde(default)]
    pub id: Option<String>,
    /// Working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Environment overrides layered on the inherited environment.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl JobSpec {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            p: None,
            m: None,
            id: None,
            cwd: None,
            env: None,
            timeout: None,
        }
    }

    /// Set the CPU slot requirement.
    pub fn cpu(mut self, cores: u32) -> Self {
        self.p = Some(cores);
        self
    }

    /// Set the memory requirement spec.
    pub fn memory(mut self, spec: impl Into<String>) -> Self {
        self.m = Some(spec.into());
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cwd = Some(path.into());
        self
    }

    /// Set environment overrides.
    pub fn environment(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Set a caller-chosen job id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Normalized, validated job description. Immutable once admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub command: Vec<String>,
    pub cpu_demand: u32,
    /// Declared memory demand in MB; `None` means unconstrained.
    pub memory_demand: Option<u64>,
    pub working_dir: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
    pub timeout: Option<Duration>,
}

impl JobDescriptor {
    /// Short command rendering for log lines: first three words.
    pub fn command_summary(&self) -> String {
        let mut summary = self.command.iter().take(3).cloned().collect::<Vec<_>>().join(" ");
        if self.command.len() > 3 {
            summary.push_str(" ...");
        }
        summary
    }
}

/// Outcome of one executed job. Created once by the runner, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub command: Vec<String>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock runtime in seconds.
    pub runtime: f64,
    /// Peak resident memory over the process tree, MB. 0 if never sampled.
    pub peak_memory_mb: f64,
    pub cpu_used: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl JobResult {
    /// Suggested memory spec for scheduling this job next time: measured
    /// peak plus a 20% buffer, floored at 50M for jobs too light to sample.
    pub fn recommended_memory(&self) -> String {
        if self.peak_memory_mb > 0.0 {
            crate::units::format_memory(self.peak_memory_mb * 1.2)
        } else {
            "50M".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluent_builder_sets_fields() {
        let spec = JobSpec::new(["sleep", "1"])
            .cpu(2)
            .memory("1G")
            .working_dir("/tmp")
            .with_timeout(30.0)
            .with_id("my-job");

        assert_eq!(spec.cmd, vec!["sleep", "1"]);
        assert_eq!(spec.p, Some(2));
        assert_eq!(spec.m.as_deref(), Some("1G"));
        assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.timeout, Some(30.0));
        assert_eq!(spec.id.as_deref(), Some("my-job"));
    }

    #[test]
    fn plain_record_deserializes_with_defaults() {
        let spec: JobSpec = serde_json::from_str(r#"{"cmd": ["echo", "hi"]}"#).unwrap();
        assert_eq!(spec.cmd, vec!["echo", "hi"]);
        assert!(spec.p.is_none());
        assert!(spec.m.is_none());
        assert!(spec.timeout.is_none());
    }

    #[test]
    fn command_summary_truncates() {
        let desc = JobDescriptor {
            id: "j".to_string(),
            command: ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect(),
            cpu_demand: 1,
            memory_demand: None,
            working_dir: None,
            env: None,
            timeout: None,
        };
        assert_eq!(desc.command_summary(), "a b c ...");
    }

}
