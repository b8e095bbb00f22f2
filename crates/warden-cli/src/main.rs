mod shell;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use warden_core::{CommandEncoder, FaceEncoder, MissingEncoder};
use warden_hub::{spawn_engine, Hub, HubConfig, SystemClock};
use warden_hw::V4lCamera;

#[derive(Parser)]
#[command(name = "warden", about = "Warden access-control hub")]
struct Cli {
    /// Config file (overrides WARDEN_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive operator session (default)
    Shell,
    /// Register a face from the camera
    Enroll {
        #[arg(short, long)]
        label: String,
        /// Admin password
        #[arg(long, env = "WARDEN_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },
    /// List enrolled labels
    List,
    /// Print the status panel as JSON
    Status,
    /// Copy the access ledger to a file
    ExportLog {
        #[arg(short, long, default_value = "security_logs.csv")]
        out: PathBuf,
    },
    /// Remove every enrolled face
    Clear {
        /// Admin password
        #[arg(long, env = "WARDEN_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<HubConfig> {
    let config = match path {
        Some(path) => HubConfig::load_from(&path, |key| std::env::var(key).ok()),
        None => HubConfig::load(),
    };
    config.context("loading configuration")
}

fn build_hub(config: &HubConfig) -> Result<Hub> {
    let camera = V4lCamera::new(
        config.camera_device.clone(),
        config.camera_width,
        config.camera_height,
        config.warmup_frames,
    );

    let encoder: Box<dyn FaceEncoder> = if config.encoder_command.is_empty() {
        tracing::warn!("no encoder_command configured; face scans will fail");
        Box::new(MissingEncoder)
    } else {
        let mut encoder = CommandEncoder::from_argv(&config.encoder_command)?
            .with_timeout(Duration::from_secs(config.encoder_timeout_secs));
        if let Some(dim) = config.embedding_dim {
            encoder = encoder.with_expected_dim(dim);
        }
        tracing::info!(command = ?config.encoder_command, "using external face encoder");
        Box::new(encoder)
    };

    Ok(Hub::new(config, Box::new(camera), encoder, Arc::new(SystemClock))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let hub = build_hub(&config)?;
    let handle = spawn_engine(hub)?;

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => shell::run_shell(handle).await?,
        Commands::Enroll { label, admin_password } => {
            println!("Enrolling {label}: look at the camera");
            let outcome = handle.enroll(&label, &admin_password).await?;
            println!("{outcome:?}");
        }
        Commands::List => {
            let labels = handle.call(|hub| hub.enrolled_labels()).await?;
            if labels.is_empty() {
                println!("No faces enrolled");
            }
            for label in labels {
                println!("{label}");
            }
        }
        Commands::Status => {
            let panel = handle.call(Hub::status).await?;
            println!("{}", serde_json::to_string_pretty(&panel)?);
        }
        Commands::ExportLog { out } => {
            let target = out.clone();
            let bytes = handle.call(move |hub| hub.export_ledger(&target)).await??;
            println!("Exported {bytes} bytes to {}", out.display());
        }
        Commands::Clear { admin_password } => {
            let removed = handle.call(move |hub| hub.clear_store(&admin_password)).await??;
            println!("Removed {removed} identities");
        }
    }

    Ok(())
}
