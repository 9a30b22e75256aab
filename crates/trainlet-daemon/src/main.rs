//! trainlet daemon
//!
//! Runs a training agent and the visualization board in one process: the
//! agent polls the queue and executes claimed runs while the board serves
//! per-run visualization sessions.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use trainlet_agent::heartbeat::heartbeat_loop;
use trainlet_agent::{AgentManager, CommandExecutor, TrainingExecutor};
use trainlet_board::{HandlerCache, LogdirBackendFactory};
use trainlet_core::{detect_gpus, AgentRecord, GpuDevice, GpuRecord, TrainletConfig};
use trainlet_store::{MemoryStore, ResourceStore};

/// trainlet daemon - queue-driven GPU training orchestrator
#[derive(Parser, Debug)]
#[command(name = "trainletd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent UUID to serve runs for (defaults to a GPU-derived id)
    #[arg(long)]
    agent_id: Option<Uuid>,

    /// Trainer command executed per claimed run
    #[arg(long)]
    trainer: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    info!("Starting trainlet daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => TrainletConfig::from_file(path).expect("Failed to load config"),
        None => TrainletConfig::default(),
    };
    if let Some(trainer) = args.trainer {
        config.agent.trainer_command = Some(trainer);
    }

    let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());

    // Discover and register this agent's GPU pool
    let mut devices = detect_gpus();
    if devices.is_empty() {
        devices.push(GpuDevice::fallback(0));
    }
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let primary = &devices[0];
    let agent_id = args
        .agent_id
        .unwrap_or_else(|| derive_agent_id(primary, &host));
    let agent_name = match &primary.uuid {
        Some(gpu_uuid) => format!("gpu:{}", gpu_uuid),
        None => format!("gpu:idx-{}", primary.index),
    };

    store
        .register_agent(AgentRecord::new(agent_id, agent_name, host).with_gpu_labels(primary))
        .expect("Failed to register agent");
    for device in &devices {
        store
            .upsert_gpu(GpuRecord::from_device(agent_id, device))
            .expect("Failed to register GPU");
    }
    let gpu_indices: Vec<u32> = devices.iter().map(|d| d.index).collect();
    info!(agent_id = %agent_id, gpus = ?gpu_indices, "Registered agent");

    // Agent runtime: manager loop plus an independent heartbeat loop
    let executor: Arc<dyn TrainingExecutor> = Arc::new(CommandExecutor::new(
        config
            .agent
            .trainer_command
            .clone()
            .unwrap_or_else(|| PathBuf::from("train")),
        config.agent.trainer_args.clone(),
    ));
    let manager = Arc::new(AgentManager::new(
        agent_id,
        config.agent.clone(),
        Arc::clone(&store),
        executor,
    ));
    let shutdown = manager.shutdown_handle();

    tokio::spawn(heartbeat_loop(
        Arc::clone(&store),
        agent_id,
        gpu_indices,
        config.agent.heartbeat_interval(),
        Arc::clone(&shutdown),
    ));
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run_forever().await });
    }

    // Board: session cache plus the eviction sweeper
    let cache = Arc::new(HandlerCache::new(
        Arc::new(LogdirBackendFactory),
        config.board.idle_timeout(),
        config.board.sweep_interval(),
    ));
    tokio::spawn(Arc::clone(&cache).run_sweeper(Arc::clone(&shutdown)));

    let mut board_router = trainlet_board::create_router(Arc::clone(&store), cache, String::new());
    if config.board.cors_enabled {
        board_router = board_router.layer(cors_layer(&config.board.cors_origins));
    }
    let agent_router = trainlet_agent::create_router(Arc::clone(&manager));

    let agent_addr: SocketAddr = format!("{}:{}", config.agent.bind_address, config.agent.port)
        .parse()
        .expect("Invalid agent address");
    let board_addr: SocketAddr = format!("{}:{}", config.board.bind_address, config.board.port)
        .parse()
        .expect("Invalid board address");

    info!("Agent API listening on {}", agent_addr);
    info!("Board listening on {}", board_addr);

    let agent_listener = tokio::net::TcpListener::bind(agent_addr)
        .await
        .expect("Failed to bind agent address");
    let board_listener = tokio::net::TcpListener::bind(board_addr)
        .await
        .expect("Failed to bind board address");

    let agent_server =
        tokio::spawn(async move { axum::serve(agent_listener, agent_router).await });
    let board_server =
        tokio::spawn(async move { axum::serve(board_listener, board_router).await });

    let (agent_result, board_result) = tokio::join!(agent_server, board_server);
    agent_result
        .expect("Agent server panicked")
        .expect("Agent server error");
    board_result
        .expect("Board server panicked")
        .expect("Board server error");
}

/// Stable agent id derived from the primary GPU identity, or from the host
/// and device index when the GPU has no UUID
fn derive_agent_id(device: &GpuDevice, host: &str) -> Uuid {
    let seed = match &device.uuid {
        Some(gpu_uuid) => format!("gpu:{}", gpu_uuid),
        None => format!("host:{}:gpu-idx:{}", host, device.index),
    };
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes())
}

fn cors_layer(origins: &[String]) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};

    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<axum::http::HeaderValue> =
        origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
