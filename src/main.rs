use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use classroom_engine::recording::upload_persisted;
use classroom_engine::{Config, FileSegmentStore, HttpSessionBackend, SegmentStore, StaticCredentials};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Inspect and finish recordings left in local segment storage
#[derive(Debug, Parser)]
#[command(name = "classroom-engine", version)]
struct Cli {
    /// Config file, without extension
    #[arg(short, long, default_value = "config/classroom-engine")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List sessions that still have persisted segments
    Pending,
    /// Show segment count, size and restored duration for one session
    Inspect { session_id: String },
    /// Assemble and upload a half-finished recording, purging it on success
    Upload {
        session_id: String,
        /// Environment variable holding the bearer token
        #[arg(long, default_value = "CLASSROOM_TOKEN")]
        token_env: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let store = FileSegmentStore::open(cfg.recording.segments_dir()?)
        .await
        .context("Failed to open segment store")?;

    match cli.command {
        Command::Pending => {
            let sessions = store.pending_sessions().await?;
            if sessions.is_empty() {
                println!("No pending recordings");
            }
            for session_id in sessions {
                let count = store.segment_count(&session_id).await?;
                let duration = store.get_duration(&session_id).await?;
                println!("{}\t{} segments\t{:.1}s", session_id, count, duration);
            }
        }
        Command::Inspect { session_id } => {
            let segments = store.list_in_order(&session_id).await?;
            if segments.is_empty() {
                bail!("No persisted segments for session {}", session_id);
            }
            let bytes: usize = segments.iter().map(|s| s.data.len()).sum();
            let first = segments.first().map(|s| s.sequence).unwrap_or_default();
            let last = segments.last().map(|s| s.sequence).unwrap_or_default();
            println!("session:   {}", session_id);
            println!("segments:  {} (sequence {}..={})", segments.len(), first, last);
            println!("bytes:     {}", bytes);
            println!("duration:  {:.1}s", store.get_duration(&session_id).await?);
        }
        Command::Upload {
            session_id,
            token_env,
        } => {
            let credentials = Arc::new(StaticCredentials::from_env(&token_env));
            let backend = HttpSessionBackend::new(&cfg.backend, credentials)?;
            let duration = store.get_duration(&session_id).await?;

            let receipt = upload_persisted(
                &store,
                &backend,
                &session_id,
                duration,
                &cfg.recording.upload_policy(),
            )
            .await
            .with_context(|| format!("Upload of {} failed; segments kept", session_id))?;

            println!("Uploaded {} ({:.1}s): {}", session_id, duration, receipt.recording_url);
        }
    }

    Ok(())
}
