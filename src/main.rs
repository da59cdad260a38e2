use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use vigil::backend::{CameraVideo, OnnxInference, SharedCanvas};
use vigil::config::{self, Config};
use vigil::{
    DescriptorLoader, DetectOptions, FaceInference, LifecycleManager, Matcher, RosterClient,
    SessionInputs, SessionSettings, VideoSource,
};
use vigil_vision::ModelPaths;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(
    version,
    about = "Intermittent face identification over a live proctoring feed"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the camera and overlay identified faces until interrupted
    Run {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Write the last overlay to this PNG before stopping
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Fetch the known-faces roster and report usable reference images
    Roster,
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Run { seconds, save } => runtime.block_on(run(&cfg, seconds, save)),
        Commands::Roster => runtime.block_on(roster(&cfg)),
        Commands::Config => open_config(),
    }
}

fn load_inference(cfg: &Config) -> Result<OnnxInference> {
    let paths = ModelPaths::in_dir(&cfg.model_dir);
    OnnxInference::load(&paths, &cfg.detector)
}

async fn build_matcher(cfg: &Config, inference: &dyn FaceInference) -> Result<Matcher> {
    let client = RosterClient::new(&cfg.roster_url, cfg.request_timeout())?;
    info!("Loading known faces from {}", client.roster_url());
    let sets = DescriptorLoader::new(&client, inference).load().await;
    Ok(Matcher::new(sets, cfg.threshold))
}

async fn run(cfg: &Config, seconds: Option<u64>, save: Option<PathBuf>) -> Result<()> {
    let inference: Option<Arc<dyn FaceInference>> = match load_inference(cfg) {
        Ok(inference) => Some(Arc::new(inference)),
        Err(e) => {
            warn!("Face model not ready: {:#}", e);
            None
        }
    };

    let matcher = match &inference {
        Some(inference) => Some(Arc::new(build_matcher(cfg, inference.as_ref()).await?)),
        None => None,
    };

    info!("Opening camera: {}", cfg.camera);
    let video: Option<Arc<dyn VideoSource>> =
        match CameraVideo::open(&cfg.camera, cfg.display_size()) {
            Ok(video) => Some(Arc::new(video)),
            Err(e) => {
                warn!("Camera not ready: {:#}", e);
                None
            }
        };

    let canvas = SharedCanvas::new(cfg.display_size());
    let settings = SessionSettings {
        schedule: cfg.schedule,
        detect: DetectOptions {
            min_confidence: cfg.detector.score_threshold,
            ..DetectOptions::default()
        },
        ..SessionSettings::default()
    };
    let mut manager = LifecycleManager::new(Box::new(canvas.clone()), settings);

    let inputs = SessionInputs {
        video,
        inference,
        matcher,
    };
    if !manager.reconcile(inputs).await {
        anyhow::bail!("Not ready: missing {}", manager.readiness().missing().join(", "));
    }

    info!("Press Ctrl+C to stop.");
    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl+C")?,
        _ = deadline => {}
    }

    if let Some(path) = &save {
        canvas.save(path)?;
        info!("Overlay written to {}", path.display());
    }

    if let Some(stats) = manager.teardown().await {
        info!(
            "{} detection attempts, {} overlays drawn, {} failures",
            stats.attempts, stats.draws, stats.failures
        );
    }
    Ok(())
}

async fn roster(cfg: &Config) -> Result<()> {
    let inference = load_inference(cfg)?;
    let client = RosterClient::new(&cfg.roster_url, cfg.request_timeout())?;
    info!("Fetching roster from {}", client.roster_url());

    let (sets, summary) = DescriptorLoader::new(&client, &inference)
        .load_with_summary()
        .await;

    for set in &sets {
        info!("{}: {} descriptor(s)", set.label(), set.descriptors().len());
    }
    info!(
        "{} of {} identities usable; {} images rejected, {} without a face, {} with several faces",
        summary.identities_loaded,
        summary.identities,
        summary.images_rejected,
        summary.no_face,
        summary.multiple_faces
    );
    let failed = summary.connectivity_failures
        + summary.cross_origin_failures
        + summary.status_failures
        + summary.decode_failures;
    if failed > 0 {
        warn!(
            "{} images failed: {} connectivity, {} cross-origin, {} http status, {} decode",
            failed,
            summary.connectivity_failures,
            summary.cross_origin_failures,
            summary.status_failures,
            summary.decode_failures
        );
    }
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
