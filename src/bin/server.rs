//! ringkv Server Binary
//!
//! Starts one ringkv node: engine, coordinator and HTTP server.

use std::sync::Arc;

use clap::Parser;
use ringkv::cluster::{Coordinator, ReplicaFactor};
use ringkv::network::Server;
use ringkv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// ringkv Server
#[derive(Parser, Debug)]
#[command(name = "ringkv-server")]
#[command(about = "Replicated LSM key-value store node")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./ringkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// URL other nodes use to reach this one (defaults to http://<listen>)
    #[arg(short, long)]
    advertise: Option<String>,

    /// URL of a cluster node; repeat for every node, this one included
    #[arg(short, long = "node")]
    nodes: Vec<String>,

    /// Default replica factor as ack/from (defaults to a majority)
    #[arg(short, long)]
    replicas: Option<String>,

    /// How long to wait for replicas, in milliseconds
    #[arg(long, default_value = "1000")]
    replica_timeout_ms: u64,

    /// Threads serving replica calls
    #[arg(short, long, default_value = "8")]
    worker_threads: usize,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// MemTable size limit in KB before flush
    #[arg(long, default_value = "4096")]
    memtable_kb: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ringkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ringkv server v{}", ringkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    if let Err(e) = run(args) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn run(args: Args) -> ringkv::Result<()> {
    let advertise = args
        .advertise
        .unwrap_or_else(|| format!("http://{}", args.listen));

    // Build config from args
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .advertise_url(advertise)
        .cluster_nodes(args.nodes)
        .replica_timeout_ms(args.replica_timeout_ms)
        .worker_threads(args.worker_threads)
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_kb * 1024);
    if let Some(replicas) = args.replicas {
        builder = builder.replica_factor(replicas.parse::<ReplicaFactor>()?);
    }
    let config = builder.build();

    let engine = Arc::new(Engine::open(config.clone())?);
    tracing::info!("Engine initialized successfully");

    let coordinator = Arc::new(Coordinator::open(Arc::clone(&engine), &config)?);
    let server = Server::bind(&config, coordinator)?;

    server.run()?;
    engine.close()
}
