//! Process-level configuration: bucket count `B`, scheduler shard count `N`,
//! vnodes-per-worker, lease TTL and heartbeat interval are process-level,
//! not per-workflow. Read from the environment via `clap`'s `env` feature.

use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "WORKER_ID")]
    pub worker_id: String,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Hash bucket count `B` jobs are partitioned into (§4.1).
    #[arg(long, env = "BUCKET_COUNT", default_value_t = 1024)]
    pub bucket_count: i32,

    /// Scheduler shards per worker, `N` (§4.5).
    #[arg(long, env = "SCHEDULER_SHARD_COUNT", default_value_t = 4)]
    pub scheduler_shard_count: usize,

    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 2000)]
    pub heartbeat_interval_ms: u64,

    /// Virtual nodes per worker on the consistent-hash ring (§4.3).
    #[arg(long, env = "VNODES_PER_WORKER", default_value_t = 160)]
    pub vnodes_per_worker: usize,

    /// Capacity of the at-least-once control-message dedup cache (§4.4).
    #[arg(long, env = "DEDUP_LRU_CAPACITY", default_value_t = 65536)]
    pub dedup_lru_capacity: usize,

    /// +/- fraction of jitter applied to automatic retry backoff (§7).
    #[arg(long, env = "RETRY_JITTER", default_value_t = 0.1)]
    pub retry_jitter: f64,

    /// Broadcast channel capacity per topic/worker inbox.
    #[arg(long, env = "TRANSPORT_CHANNEL_CAPACITY", default_value_t = 4096)]
    pub transport_channel_capacity: usize,
}
