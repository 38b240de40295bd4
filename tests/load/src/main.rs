//! Concurrency stress tool for the resource registry.
//!
//! Runs one of the registry stress scenarios against the in-memory store or
//! a `PostgreSQL` database and prints a latency report:
//!
//! - `clients`: every worker creates distinct clients; all must be listed
//! - `realm-roles`, `client-roles`: distinct role creates, read back by name
//!   and listed exactly once
//! - `contention`: every worker creates the same names; one winner per name

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context};
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use indicatif::{ProgressBar, ProgressStyle};
use kc_core::Config;
use kc_model::{Attributes, Realm, ResourceScope, ResourceType};
use kc_registry::{
    run_stress, ContendedCreateTask, CreateClientsTask, CreateRolesTask, StressConfig,
    StressReport, StressTask,
};
use kc_server::{Node, NodeRegistry};
use uuid::Uuid;

/// Concurrency stress tool for the Keycloak resource registry
#[derive(Parser, Debug)]
#[command(name = "registry-stress")]
#[command(about = "Concurrent create/read verification for the resource registry")]
struct Args {
    /// Number of concurrent workers
    #[arg(short, long, default_value = "3")]
    workers: usize,

    /// Iterations per worker
    #[arg(short, long, default_value = "10")]
    iterations: usize,

    /// Run workers one at a time
    #[arg(long)]
    serialized: bool,

    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "clients")]
    scenario: Scenario,

    /// PostgreSQL URL; the in-memory store is used when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Clients,
    RealmRoles,
    ClientRoles,
    Contention,
}

/// Advances the progress bar after every iteration.
struct Progress<T> {
    inner: Arc<T>,
    bar: ProgressBar,
}

#[async_trait]
impl<T: StressTask> StressTask for Progress<T> {
    async fn run(&self, worker: usize, iteration: usize) -> anyhow::Result<()> {
        let result = self.inner.run(worker, iteration).await;
        self.bar.inc(1);
        result
    }
}

async fn run_with_progress<T: StressTask>(
    config: StressConfig,
    task: Arc<T>,
) -> anyhow::Result<StressReport> {
    let bar = ProgressBar::new((config.workers * config.iterations) as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let progress = Arc::new(Progress {
        inner: task,
        bar: bar.clone(),
    });
    let result = run_stress(config, progress).await;
    bar.finish_and_clear();
    Ok(result?)
}

fn print_report(scenario: Scenario, report: &StressReport) -> anyhow::Result<()> {
    let mut histogram = Histogram::<u64>::new(3)?;
    for latency in &report.latencies {
        histogram.record(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX))?;
    }
    let ms = |us: u64| Duration::from_micros(us).as_secs_f64() * 1000.0;

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("                   REGISTRY STRESS RESULTS");
    println!("═══════════════════════════════════════════════════════════════\n");
    println!("Summary:");
    println!("  Scenario:            {scenario:?}");
    println!("  Workers:             {}", report.config.workers);
    println!("  Iterations/worker:   {}", report.config.iterations);
    println!("  Serialized:          {}", report.config.serialized);
    println!("  Completed:           {}", report.completed);
    println!("  Total duration:      {:.2}s", report.elapsed.as_secs_f64());
    println!("  Iterations/second:   {:.2}", report.throughput());

    if !histogram.is_empty() {
        println!("\nLatency (milliseconds):");
        println!("  Min:                 {:.2}ms", ms(histogram.min()));
        println!("  Mean:                {:.2}ms", histogram.mean() / 1000.0);
        println!("  p50 (median):        {:.2}ms", ms(histogram.value_at_quantile(0.50)));
        println!("  p90:                 {:.2}ms", ms(histogram.value_at_quantile(0.90)));
        println!("  p99:                 {:.2}ms", ms(histogram.value_at_quantile(0.99)));
        println!("  Max:                 {:.2}ms", ms(histogram.max()));
    }
    println!("\n═══════════════════════════════════════════════════════════════\n");
    Ok(())
}

async fn run_scenario(
    registry: Arc<NodeRegistry>,
    realm_id: Uuid,
    args: &Args,
) -> anyhow::Result<StressReport> {
    let config = StressConfig {
        workers: args.workers,
        iterations: args.iterations,
        serialized: args.serialized,
    };
    let expected = args.workers * args.iterations;

    match args.scenario {
        Scenario::Clients => {
            let task = Arc::new(CreateClientsTask::new(Arc::clone(&registry), realm_id));
            let report = run_with_progress(config, task).await?;
            let listed = registry
                .list_resources(&ResourceScope::realm(realm_id), ResourceType::Client)
                .await?;
            ensure!(
                listed.len() == expected,
                "expected {expected} clients, found {}",
                listed.len()
            );
            Ok(report)
        }
        Scenario::RealmRoles => {
            let task = Arc::new(CreateRolesTask::realm_roles(Arc::clone(&registry), realm_id));
            let report = run_with_progress(config, task).await?;
            let listed = registry
                .list_resources(&ResourceScope::realm(realm_id), ResourceType::Role)
                .await?;
            ensure!(
                listed.len() == expected,
                "expected {expected} realm roles, found {}",
                listed.len()
            );
            Ok(report)
        }
        Scenario::ClientRoles => {
            let client = registry
                .create_resource(
                    ResourceScope::realm(realm_id),
                    ResourceType::Client,
                    "stress-client",
                    Attributes::new(),
                )
                .await
                .context("creating the owning client")?;
            let task = Arc::new(CreateRolesTask::client_roles(
                Arc::clone(&registry),
                realm_id,
                client.id,
            ));
            let report = run_with_progress(config, task).await?;
            let listed = registry
                .list_resources(&ResourceScope::client(realm_id, client.id), ResourceType::Role)
                .await?;
            ensure!(
                listed.len() == expected,
                "expected {expected} client roles, found {}",
                listed.len()
            );
            Ok(report)
        }
        Scenario::Contention => {
            let task = Arc::new(ContendedCreateTask::new(
                Arc::clone(&registry),
                realm_id,
                "shared",
            ));
            let report = run_with_progress(config, Arc::clone(&task)).await?;
            println!(
                "  Created: {}  Conflicts: {}",
                task.created(),
                task.conflicts()
            );
            ensure!(
                task.created() == args.iterations,
                "expected one winner per name, got {} creates for {} names",
                task.created(),
                args.iterations
            );
            ensure!(
                task.conflicts() == expected - args.iterations,
                "expected {} conflicts, got {}",
                expected - args.iterations,
                task.conflicts()
            );
            Ok(report)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "info,kc_registry=debug" } else { "warn" };
    kc_core::init_tracing(default_filter)?;

    let mut config = Config::from_env()?;
    config.database.url.clone_from(&args.database_url);

    println!("Keycloak Registry Stress");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Scenario:        {:?}", args.scenario);
    println!("  Workers:         {}", args.workers);
    println!("  Iterations:      {}", args.iterations);
    println!(
        "  Store:           {}",
        if args.database_url.is_some() { "postgres" } else { "memory" }
    );
    println!("═══════════════════════════════════════════════════════════════\n");

    let node = Node::build(&config).await?;
    let registry = Arc::clone(node.registry());
    let realm = registry
        .create_realm(Realm::new(format!("stress-{}", Uuid::new_v4().simple())))
        .await?;

    let outcome = run_scenario(Arc::clone(&registry), realm.id, &args).await;

    // Drop the scratch realm whatever the outcome.
    if let Err(e) = registry.delete_realm(realm.id).await {
        eprintln!("failed to delete realm {}: {e}", realm.name);
    }

    let report = outcome?;
    print_report(args.scenario, &report)?;
    Ok(())
}
