//! `datapillar-job` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the REST control surface (§6).
//! - `worker`   — start one worker process: cluster membership, lease
//!                heartbeat, N scheduler shards, the executor runtime, and
//!                the shard receiver (§4.3-§4.7).
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow DAG definition file.

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use cluster::{ClusterCoordinator, InProcessMembership, LeaseManager};
use config::AppConfig;
use dag::DagEdge;
use engine::{ExecutorConfig, WorkflowExecutor};
use nodes::HandlerRegistry;
use scheduler::{ExecutorRuntime, RuntimeConfig, SchedulerConfig, SchedulerInstance, ShardReceiver, SystemClock};
use transport::{InProcessTransport, Transport};

#[derive(Parser)]
#[command(name = "datapillar-job", about = "Distributed DAG workflow scheduler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP control surface.
    Serve {
        #[command(flatten)]
        config: AppConfig,
    },
    /// Start a worker process: cluster membership, scheduler shards,
    /// executor runtime, shard receiver.
    Worker {
        #[command(flatten)]
        config: AppConfig,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow DAG definition file (`{"nodes": [...], "edges": [...]}`).
    Validate {
        /// Path to the workflow DAG JSON file.
        path: std::path::PathBuf,
    },
}

/// On-disk shape a `validate`d workflow definition takes — just enough to
/// drive `dag::validate`, not the full `Workflow`/`Job` persistence model.
#[derive(serde::Deserialize)]
struct DagFile {
    nodes: Vec<String>,
    edges: Vec<DagEdge>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            info!(bind = %config.bind_addr, "starting API server");
            let pool = db::pool::create_pool(&config.database_url, 10)
                .await
                .expect("failed to connect to database");
            let transport: Arc<dyn Transport> =
                Arc::new(InProcessTransport::new(config.transport_channel_capacity));
            let dag_source = Arc::new(db::PgDagSource::new(pool.clone()));
            let executor = Arc::new(WorkflowExecutor::new(
                pool.clone(),
                dag_source,
                transport,
                ExecutorConfig {
                    bucket_count: config.bucket_count,
                    ..Default::default()
                },
            ));
            api::serve(&config.bind_addr, pool, executor).await.unwrap();
        }
        Command::Worker { config } => run_worker(config).await,
        Command::Migrate { database_url } => {
            info!("running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .expect("failed to connect to database");
            db::pool::run_migrations(&pool).await.expect("migration failed");
            info!("migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));

            let dag_file: DagFile =
                serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid JSON: {e}"));

            match dag::validate(&dag_file.nodes, &dag_file.edges) {
                Ok(order) => {
                    println!("workflow is valid, execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Starts every long-running piece one worker process owns, and blocks
/// until `ctrl_c`. A real deployment's `HandlerRegistry` is populated by the
/// embedding application before calling in; this binary starts with an
/// empty one (unregistered `handler_type`s fail permanently, per §7).
async fn run_worker(config: AppConfig) {
    info!(worker_id = %config.worker_id, "starting worker");

    let pool = db::pool::create_pool(&config.database_url, 10)
        .await
        .expect("failed to connect to database");

    let transport: Arc<dyn Transport> =
        Arc::new(InProcessTransport::new(config.transport_channel_capacity));
    let membership = Arc::new(InProcessMembership::new(vec![config.worker_id.clone()]));
    let coordinator = Arc::new(
        ClusterCoordinator::new(Arc::clone(&membership), config.worker_id.clone(), config.bucket_count)
            .await,
    );

    let lease_manager = Arc::new(LeaseManager::new(
        pool.clone(),
        config.worker_id.clone(),
        Duration::from_millis(config.heartbeat_interval_ms),
    ));

    let dag_source = Arc::new(db::PgDagSource::new(pool.clone()));
    let executor = Arc::new(WorkflowExecutor::new(
        pool.clone(),
        dag_source,
        Arc::clone(&transport),
        ExecutorConfig {
            bucket_count: config.bucket_count,
            retry_jitter: config.retry_jitter,
            ..Default::default()
        },
    ));

    let registry = Arc::new(HandlerRegistry::new());
    let clock = Arc::new(SystemClock);
    let membership_trait: Arc<dyn cluster::ClusterMembership> = Arc::clone(&membership);

    let runtime = Arc::new(ExecutorRuntime::new(
        pool.clone(),
        Arc::clone(&registry),
        Arc::clone(&transport),
        Arc::clone(&executor),
        clock.clone(),
        Some(membership_trait),
        RuntimeConfig {
            retry_jitter: config.retry_jitter,
            worker_id: config.worker_id.clone(),
        },
    ));

    let shutdown = CancellationToken::new();

    let rebalance = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .run(|handoff| {
                    tracing::info!(
                        gained = ?handoff.gained,
                        lost = ?handoff.lost,
                        "ring rebuilt after membership change"
                    );
                })
                .await;
        })
    };

    let heartbeat = {
        let coordinator = Arc::clone(&coordinator);
        let lease_manager = Arc::clone(&lease_manager);
        let interval = Duration::from_millis(config.heartbeat_interval_ms);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let buckets = coordinator.owned_buckets();
                let lost = lease_manager.refresh_all(&buckets).await;
                if !lost.is_empty() {
                    tracing::warn!(?lost, "lost bucket leases this heartbeat");
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    };

    let receiver = Arc::new(ShardReceiver::new(
        config.worker_id.clone(),
        pool.clone(),
        Arc::clone(&registry),
        Arc::clone(&transport),
    ));
    let receiver_task = tokio::spawn(Arc::clone(&receiver).run());
    let kill_listener_task = tokio::spawn(Arc::clone(&runtime).listen_for_kills());

    let mut instance_tasks = Vec::new();
    for shard_index in 0..config.scheduler_shard_count {
        let instance = SchedulerInstance::new(
            pool.clone(),
            Arc::clone(&coordinator),
            Arc::clone(&transport),
            Arc::clone(&runtime),
            clock.clone(),
            SchedulerConfig {
                shard_index,
                shard_count: config.scheduler_shard_count,
                bucket_count: config.bucket_count,
                ..Default::default()
            },
        );
        let shutdown = shutdown.clone();
        instance_tasks.push(tokio::spawn(async move { instance.run(shutdown).await }));
    }

    info!(shards = config.scheduler_shard_count, "worker ready");

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("shutdown signal received, draining");
    shutdown.cancel();

    let _ = heartbeat.await;
    for task in instance_tasks {
        let _ = task.await;
    }
    receiver_task.abort();
    kill_listener_task.abort();
    rebalance.abort();
}
