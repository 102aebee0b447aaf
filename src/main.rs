use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facelens::config::{self, Config};
use facelens::features_log::FeatureLog;
use facelens::processor::FrameProcessor;
use facelens::server::{self, AppState};
use facelens::Pipeline;
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facelens")]
#[command(
    version,
    about = "Live webcam frame analysis - face landmarks, facial geometry and classification"
)]
struct Cli {
    /// Config file (defaults to $FACELENS_CONFIG or ./facelens.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the WebSocket endpoint and the demo page
    Serve,
    /// Analyze a single image file and print the result as JSON
    Analyze {
        /// Image to analyze
        image: PathBuf,
        /// Do not append to the feature log
        #[arg(long)]
        no_log: bool,
    },
    /// Print the effective configuration
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
    let cfg = config::load_effective(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(serve(cfg))
        }
        Commands::Analyze { image, no_log } => analyze(&cfg, &image, no_log),
        Commands::Config => print_config(&cfg, config::config_path(cli.config.as_deref())),
    }
}

fn build_processor(cfg: &Config, log_features: bool) -> Result<FrameProcessor> {
    cfg.validate()?;

    info!("Loading models...");
    let pipeline = Pipeline::new(&cfg.model_paths()?, cfg.pipeline_config())
        .context("Failed to initialize analysis pipeline")?;

    let log = log_features.then(|| FeatureLog::new(&cfg.output.csv_path));

    FrameProcessor::new(
        Box::new(pipeline),
        log,
        &cfg.output.output_dir,
        cfg.output.save_frames,
    )
}

async fn serve(cfg: Config) -> Result<()> {
    let processor = build_processor(&cfg, true)?;
    let state = AppState::new(processor);

    if !cfg.server.static_dir.join("index.html").exists() {
        warn!(
            "No index.html in {}, the demo page will not be served",
            cfg.server.static_dir.display()
        );
    }

    let app = server::build_router(state, &cfg.server.static_dir)
        .layer(server::cors_layer(&cfg.server.cors_origin)?);

    let addr = SocketAddr::new(cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    info!("Feature log: {}", cfg.output.csv_path.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server crashed")?;

    info!("Shutdown complete");
    Ok(())
}

fn analyze(cfg: &Config, image_path: &Path, no_log: bool) -> Result<()> {
    let img = image::open(image_path)
        .with_context(|| format!("Failed to open image {}", image_path.display()))?;
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut processor = build_processor(cfg, !no_log)?;
    let report = processor.process_image(&img)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_config(cfg: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        info!("Config file: {}", path.display());
    } else {
        info!("Config file: {} (not found, using defaults)", path.display());
    }
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
}
