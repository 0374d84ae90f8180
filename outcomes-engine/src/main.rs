//! outcomes-engine - program outcome aggregation service
//!
//! `serve` (default) exposes the engine over HTTP. The other subcommands
//! run a single recompute or audit against the database and print the
//! result as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use outcomes_common::config::{
    database_path, load_http_port, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV,
};
use outcomes_common::db::{init_database, OfferingId, StudentId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outcomes_engine::{build_router, AppState};

/// Command-line arguments for outcomes-engine
#[derive(Parser, Debug)]
#[command(name = "outcomes-engine")]
#[command(about = "Program outcome aggregation service")]
#[command(version)]
struct Args {
    /// Root folder holding outcomes.db
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (defaults to config, then the settings table)
        #[arg(short, long, env = "OUTCOMES_PORT")]
        port: Option<u16>,
    },
    /// Recompute and persist one student's program outcomes
    Recompute {
        #[arg(long)]
        student: i64,
    },
    /// Recompute and persist every enrolled student of an offering
    RecomputeOffering {
        #[arg(long)]
        offering: i64,
    },
    /// Print the weight configuration audit of an offering
    Audit {
        #[arg(long)]
        offering: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default();

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("outcomes_engine={0},outcomes_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    // Build identification first, before any database work
    info!(
        "Starting outcomes-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, Some(&config));
    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let state = AppState::new(pool.clone());

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            let port = match port.or(config.server.port) {
                Some(port) => port,
                None => load_http_port(&pool).await?,
            };
            let host: std::net::IpAddr = config
                .server
                .host
                .parse()
                .with_context(|| format!("Invalid server host: {}", config.server.host))?;
            serve(state, SocketAddr::new(host, port)).await?;
        }
        Command::Recompute { student } => {
            let student = state.engine.student(StudentId(student)).await?;
            let saved = state
                .engine
                .compute_and_save_student_program_outcomes(&student)
                .await?;
            let outcomes: Vec<_> = saved
                .report
                .outcomes
                .iter()
                .map(|(id, result)| serde_json::json!({ "program_outcome_id": id, "result": result }))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "student_id": student.id,
                    "rows_written": saved.rows_written,
                    "program_outcomes": outcomes,
                }))?
            );
        }
        Command::RecomputeOffering { offering } => {
            let summary = state.engine.recompute_offering(OfferingId(offering)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Audit { offering } => {
            let audit = state.engine.audit_offering_weights(OfferingId(offering)).await?;
            println!("{}", serde_json::to_string_pretty(&audit)?);
        }
    }

    Ok(())
}

async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("outcomes-engine listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
