//! bhs-daemon entry point.
//!
//! Thin on purpose: parse the CLI, load config, set up tracing, wire the
//! feeder and serve the status API. Handlers live in `routes.rs`, shared
//! state in `state.rs`, feeder assembly in `wiring.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use bhs_config::load_feeder_config;
use bhs_daemon::{routes, state, wiring};
use clap::{Parser, Subcommand};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "bhs-daemon")]
#[command(about = "Blockhash archive feeder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the feeder and serve the status API
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Validate config, print its hash and window, and exit
    CheckConfig {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    match cli.cmd {
        Commands::CheckConfig { config_paths } => check_config(&config_paths),
        Commands::Run { config_paths } => {
            init_tracing();
            run(&config_paths).await
        }
    }
}

fn check_config(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let (loaded, cfg) = load_feeder_config(&path_refs)?;
    let w = cfg.window_params();

    println!("config_hash={}", loaded.config_hash);
    println!(
        "wait_blocks={} lookback_blocks={} poll_period_secs={} run_timeout_secs={}",
        w.wait_blocks, w.lookback_blocks, cfg.feeder.poll_period_secs, cfg.feeder.run_timeout_secs
    );
    for warning in cfg.window_warnings() {
        println!("warning: {warning}");
    }
    Ok(())
}

async fn run(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let (loaded, cfg) = load_feeder_config(&path_refs)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let shared = Arc::new(state::AppState::for_config(
        &loaded.config_hash,
        cfg.window_params(),
        cfg.poll_period(),
    ));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let wiring::FeederStack {
        mut service,
        submitter,
    } = wiring::build_feeder(&cfg).await?;
    service.start(shared.report_sink())?;
    shared.set_state("running").await;

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8898)));
    info!("bhs-daemon listening on http://{}", addr);

    let shutdown_state = Arc::clone(&shared);
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c; shutting down");
        }
        info!("shutdown requested; stopping feeder");
        if let Err(e) = service.stop().await {
            error!(error = %e, "feeder did not stop cleanly");
        }
        shutdown_state.set_state("stopped").await;
    };

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server crashed")?;

    submitter.abort();
    info!("bhs-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("BHS_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
