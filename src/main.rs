use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use memsched::units::{format_duration, format_memory};
use memsched::{shutdown, Cluster, ClusterConfig, JobResult, JobSpec, RunStats};

#[derive(Parser, Debug)]
#[command(name = "memsched")]
#[command(version)]
#[command(about = "A local resource-aware job scheduler for batch subprocess workloads")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a job file with resource-aware parallel scheduling
    Run(RunArgs),

    /// Run jobs one at a time to measure their real memory usage
    Profile(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to a JSON file containing an array of job records.
    /// Each record: {"cmd": [...], "p": 2, "m": "1G", "timeout": 300, ...}
    #[arg(long)]
    jobs: PathBuf,

    /// CPU budget: a core count or a percentage of the machine ("8", "50%").
    /// Defaults to all detected CPUs.
    #[arg(long)]
    cpus: Option<String>,

    /// Memory budget ("16G", "2048M"; a bare number is MB).
    /// Defaults to 90% of available memory.
    #[arg(long)]
    memory: Option<String>,

    /// Cap on concurrently running jobs (defaults to the CPU budget)
    #[arg(long)]
    workers: Option<usize>,

    /// Suppress per-job log lines
    #[arg(long)]
    quiet: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run(run_args) => run_jobs(run_args, false).await,
        Commands::Profile(run_args) => run_jobs(run_args, true).await,
    }
}

async fn run_jobs(args: RunArgs, profiling: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClusterConfig::detect();
    if let Some(cpus) = &args.cpus {
        config = config.with_cpu_spec(cpus)?;
    }
    if let Some(memory) = &args.memory {
        config = config.with_memory(memory)?;
    }
    if args.quiet {
        config = config.quiet();
    }
    if args.no_progress {
        config = config.no_progress();
    }

    let contents = std::fs::read_to_string(&args.jobs)?;
    let specs: Vec<JobSpec> = serde_json::from_str(&contents)?;

    let cluster = Cluster::new(config);
    shutdown::install_shutdown_handler(cluster.shutdown_token());
    cluster.extend(specs).await?;

    if profiling {
        let results = cluster.profile().await?;
        print_profile_summary(&results);
    } else {
        let stats = cluster.run(args.workers).await?;
        print_summary(&cluster, &stats).await;
    }
    // The run completing is independent of individual job outcomes
    Ok(())
}

async fn print_summary(cluster: &Cluster, stats: &RunStats) {
    println!();
    println!("{}", "=".repeat(60));
    println!("EXECUTION SUMMARY");
    println!("{}", "=".repeat(60));
    println!(
        "Cluster: {} CPUs, {} memory",
        stats.cluster.cpu_budget,
        format_memory(stats.cluster.memory_budget_mb as f64)
    );
    println!("Runtime: {}", format_duration(stats.cluster.runtime_secs));
    println!();
    println!("Jobs: {} total", stats.jobs.total);
    println!("  completed: {}", stats.jobs.completed);
    println!("  failed:    {}", stats.jobs.failed);

    let completed = cluster.completed_jobs().await;
    if !completed.is_empty() {
        let total_runtime: f64 = completed.iter().map(|r| r.runtime).sum();
        let peak = completed
            .iter()
            .map(|r| r.peak_memory_mb)
            .fold(0.0_f64, f64::max);
        println!();
        println!("Performance:");
        println!(
            "  average runtime: {}",
            format_duration(total_runtime / completed.len() as f64)
        );
        println!("  total job time:  {}", format_duration(total_runtime));
        if peak > 0.0 {
            println!("  peak memory:     {}", format_memory(peak));
        }
    }

    let failed = cluster.failed_jobs().await;
    if !failed.is_empty() {
        println!();
        println!("Failed jobs:");
        for result in failed.iter().take(5) {
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| format!("exit code {}", result.exit_code));
            println!("  {}: {}", result.job_id, reason);
        }
        if failed.len() > 5 {
            println!("  ... and {} more", failed.len() - 5);
        }
    }
    println!("{}", "=".repeat(60));
}

fn print_profile_summary(results: &[JobResult]) {
    println!();
    println!("{}", "=".repeat(60));
    println!("PROFILING SUMMARY");
    println!("{}", "=".repeat(60));

    let successful: Vec<&JobResult> = results.iter().filter(|r| r.success).collect();
    println!("Jobs profiled: {}", results.len());
    println!("Successful:    {}", successful.len());
    println!("Failed:        {}", results.len() - successful.len());

    if !successful.is_empty() {
        println!();
        println!("Recommended memory settings (measured peak + 20% buffer):");
        for result in &successful {
            println!(
                "  {}: \"m\": \"{}\"  (measured {}, ran {})",
                result.job_id,
                result.recommended_memory(),
                format_memory(result.peak_memory_mb),
                format_duration(result.runtime)
            );
        }
    }

    for result in results.iter().filter(|r| !r.success) {
        if let Some(error) = &result.error {
            println!("  {} failed: {}", result.job_id, error);
        }
    }
    println!("{}", "=".repeat(60));
}
