//! `nclip`: turn the day's most newsworthy police report into a vertical video.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nclip_models::VisualKind;
use nclip_pipeline::{NarrationMode, Pipeline, PipelineConfig, PipelineContext};

#[derive(Debug, Parser)]
#[command(name = "nclip", version, about = "Generate a short vertical news video from scraped police reports")]
struct Cli {
    /// JSON file with scraped reports ({title, summary, body, url})
    #[arg(long, env = "NCLIP_REPORTS")]
    reports: PathBuf,

    /// Reuse cached reports, segments and media from the previous run
    #[arg(long)]
    reuse: bool,

    /// Video model: pixverse, minimax, luma, ltx-video or hunyuan
    #[arg(long)]
    model: Option<String>,

    /// Output directory (cache and final video)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Generate video clips or still images
    #[arg(long)]
    visual_kind: Option<VisualKind>,

    /// per_segment or single_track
    #[arg(long)]
    narration: Option<NarrationMode>,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nclip=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("invalid environment configuration")?;
    config.reuse_existing = cli.reuse;
    if let Some(model) = &cli.model {
        config.video_model = model.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(kind) = cli.visual_kind {
        config.visual_kind = kind;
    }
    if let Some(mode) = cli.narration {
        config.narration = mode;
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    info!("Pipeline config: {:?}", config);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctx = PipelineContext::from_config(config, &cli.reports, cancel_rx)
        .context("failed to set up pipeline")?;
    let pipeline = Pipeline::new(ctx);

    let manifest = tokio::select! {
        result = pipeline.run() => result.context("run failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, stopping");
            cancel_tx.send(true).ok();
            anyhow::bail!("interrupted");
        }
    };

    println!("Video: {}", manifest.output.display());
    println!(
        "Duration: {:.2}s, segments: {} included, {} skipped",
        manifest.total_duration,
        manifest.placements.len(),
        manifest.skipped.len()
    );
    for skipped in &manifest.skipped {
        println!("  segment {}: {}", skipped.segment, skipped.reason);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
