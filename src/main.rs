//! minicloud - container host agents behind a round-robin router
//!
//! `minicloud agent` runs a host agent on the local Docker engine.
//! `minicloud router` runs the router in front of a list of agents.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use minicloud::api::{create_agent_app, create_router_app};
use minicloud::config::AppConfig;
use minicloud::container::spawn_reaper;
use minicloud::logging::init_logging;
use minicloud::router::RouterState;
use minicloud::runtime::DockerRuntime;
use minicloud::AgentState;

#[derive(Parser)]
#[command(name = "minicloud")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tiny multi-tenant cloud of container host agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a host agent
    Agent {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Docker socket path
        #[arg(long)]
        docker_socket: Option<String>,
    },

    /// Run the router
    Router {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Agent base URL; repeat for each agent, in rotation order
        #[arg(short, long = "agent")]
        agents: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level)?;

    // Initialize metrics system
    minicloud::metrics::init_metrics();

    match cli.command {
        Commands::Agent {
            host,
            port,
            docker_socket,
        } => {
            if let Some(host) = host {
                config.agent.host = host;
            }
            if let Some(port) = port {
                config.agent.port = port;
            }
            if docker_socket.is_some() {
                config.agent.docker_socket = docker_socket;
            }
            run_agent(config).await
        }
        Commands::Router { host, port, agents } => {
            if let Some(host) = host {
                config.router.host = host;
            }
            if let Some(port) = port {
                config.router.port = port;
            }
            if !agents.is_empty() {
                config.router.agents = agents;
            }
            run_router(config).await
        }
    }
}

async fn run_agent(config: AppConfig) -> Result<()> {
    config.validate_agent()?;
    let agent = config.agent;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        image = %agent.image,
        "Starting minicloud agent"
    );

    let runtime = DockerRuntime::connect(&agent)?;
    match runtime.version().await {
        Ok(version) => info!(docker_version = %version, "Connected to Docker engine"),
        Err(e) => warn!(error = %e, "Docker engine not reachable yet"),
    }

    let addr: SocketAddr = format!("{}:{}", agent.host, agent.port)
        .parse()
        .context("Invalid agent bind address")?;
    let reaper_interval = Duration::from_secs(agent.reaper_interval_secs);

    let state = Arc::new(AgentState::new(agent, Arc::new(runtime)));
    let reaper = spawn_reaper(state.units.clone(), reaper_interval);

    serve(addr, create_agent_app(state)).await?;

    reaper.abort();
    info!("minicloud agent stopped");
    Ok(())
}

async fn run_router(config: AppConfig) -> Result<()> {
    config.validate_router()?;
    let router = config.router;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        agents = ?router.agents,
        "Starting minicloud router"
    );

    let addr: SocketAddr = format!("{}:{}", router.host, router.port)
        .parse()
        .context("Invalid router bind address")?;
    let state = Arc::new(RouterState::new(router)?);

    serve(addr, create_router_app(state)).await?;

    info!("minicloud router stopped");
    Ok(())
}

/// Attach the shared middleware and serve until a shutdown signal
async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening on");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
