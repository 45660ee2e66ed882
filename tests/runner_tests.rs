use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use memsched::worker::{JobRunner, MemoryMonitor};
use memsched::JobDescriptor;

fn descriptor(cmd: &[&str]) -> JobDescriptor {
    JobDescriptor {
        id: "test-job".to_string(),
        command: cmd.iter().map(|s| s.to_string()).collect(),
        cpu_demand: 1,
        memory_demand: None,
        working_dir: None,
        env: None,
        timeout: None,
    }
}

fn test_runner() -> JobRunner {
    JobRunner::new(Arc::new(MemoryMonitor::default()))
}

#[tokio::test]
async fn execute_simple_command() {
    let runner = test_runner();
    let result = runner.execute(&descriptor(&["echo", "hello"])).await;

    assert_eq!(result.job_id, "test-job");
    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hello\n");
    assert!(result.stderr.is_empty());
    assert!(result.error.is_none());
    assert!(result.end_time >= result.start_time);
}

#[tokio::test]
async fn nonzero_exit_is_a_failed_result_not_an_error() {
    let runner = test_runner();
    let result = runner.execute(&descriptor(&["false"])).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    // A process that ran and chose to fail carries no error message
    assert!(result.error.is_none());
}

#[tokio::test]
async fn stderr_is_captured_separately() {
    let runner = test_runner();
    let result = runner
        .execute(&descriptor(&["sh", "-c", "echo out; echo err >&2; exit 3"]))
        .await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
}

#[tokio::test]
async fn missing_command_is_a_launch_failure() {
    let runner = test_runner();
    let result = runner
        .execute(&descriptor(&["definitely_not_a_command_12345"]))
        .await;

    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(result.error.is_some());
    assert_eq!(result.peak_memory_mb, 0.0);
}

#[tokio::test]
async fn working_directory_is_honored() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let canonical = dir.path().canonicalize().expect("canonicalize temp dir");

    let mut desc = descriptor(&["pwd"]);
    desc.working_dir = Some(dir.path().to_path_buf());

    let result = test_runner().execute(&desc).await;
    assert!(result.success);
    assert_eq!(result.stdout.trim(), canonical.to_string_lossy());
}

#[tokio::test]
async fn env_overrides_layer_on_inherited_environment() {
    let mut desc = descriptor(&["sh", "-c", "echo $MEMSCHED_TEST_VAR:$PATH"]);
    let mut env = HashMap::new();
    env.insert("MEMSCHED_TEST_VAR".to_string(), "forty-two".to_string());
    desc.env = Some(env);

    let result = test_runner().execute(&desc).await;
    assert!(result.success);
    assert!(result.stdout.starts_with("forty-two:"));
    // PATH came from the inherited environment, not the override map
    assert!(result.stdout.trim().len() > "forty-two:".len());
}

#[tokio::test]
async fn timeout_kills_the_job() {
    let runner = test_runner();
    let mut desc = descriptor(&["sleep", "5"]);
    desc.timeout = Some(Duration::from_millis(200));

    let result = runner.execute(&desc).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    let error = result.error.expect("timeout error message");
    assert!(error.contains("timed out"), "unexpected error: {error}");
    assert!(
        result.runtime >= 0.15 && result.runtime < 1.5,
        "runtime was {}",
        result.runtime
    );
}

#[tokio::test]
async fn timeout_drains_output_produced_before_the_kill() {
    let runner = test_runner();
    let mut desc = descriptor(&["sh", "-c", "echo started; sleep 5"]);
    desc.timeout = Some(Duration::from_millis(300));

    let result = runner.execute(&desc).await;

    assert!(!result.success);
    assert_eq!(result.stdout, "started\n");
}

#[tokio::test]
async fn timeout_kills_descendants_too() {
    let runner = test_runner();
    // The shell spawns a grandchild sleep; the group kill must reach it.
    let mut desc = descriptor(&["sh", "-c", "sleep 30 & wait"]);
    desc.timeout = Some(Duration::from_millis(300));

    let result = runner.execute(&desc).await;

    assert!(!result.success);
    assert!(result.runtime < 2.0, "runtime was {}", result.runtime);
}

#[tokio::test]
async fn peak_memory_roughly_tracks_a_50mb_job() {
    // Needs an interpreter that can hold a known-size allocation
    if std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_err()
    {
        return;
    }

    let monitor = Arc::new(MemoryMonitor::new(Duration::from_millis(100)));
    let runner = JobRunner::new(Arc::clone(&monitor));

    let desc = descriptor(&[
        "python3",
        "-c",
        "import time; b = bytearray(50 * 1024 * 1024); time.sleep(2)",
    ]);
    let result = runner.execute(&desc).await;

    assert!(result.success, "stderr: {}", result.stderr);
    assert!(
        result.peak_memory_mb >= 25.0 && result.peak_memory_mb <= 150.0,
        "peak was {:.1}MB",
        result.peak_memory_mb
    );
}

#[tokio::test]
async fn runtime_and_cpu_used_are_recorded() {
    let mut desc = descriptor(&["sleep", "0.3"]);
    desc.cpu_demand = 2;

    let result = test_runner().execute(&desc).await;

    assert!(result.success);
    assert_eq!(result.cpu_used, 2);
    assert!(result.runtime >= 0.25, "runtime was {}", result.runtime);
}
