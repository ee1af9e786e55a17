use clap::{Parser, Subcommand};
use imgserve::config::{self, ServerConfig};
use imgserve::http::{self, AppState};
use imgserve::server::build_server;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "imgserve")]
#[command(about = "HTTP image server with on-the-fly crop, rotate, resize and re-encode")]
#[command(long_about = "\
HTTP image server with on-the-fly crop, rotate, resize and re-encode

Images are read from a source directory and transformed according to the
request URL. The path (or the `source` query parameter) names the file;
the query string describes the transform:

  /photo.jpg?width=400                       resize, keep aspect ratio
  /photo.jpg?width=200&height=200&mode=fill  cover 200x200, center crop
  /photo.jpg?crop=100x100@top-left           anchored crop window
  /photo.jpg?crop=10,10|210,110              explicit crop rectangle
  /photo.jpg?angle=90&format=png             rotate counter-clockwise, re-encode
  /photo.jpg?quality=70                      JPEG quality 1-100
  /anim.gif?width=100                        every frame of an animated GIF

Other parameters: crop_anchor, background (RRGGBB[AA]), interpolation,
resampling, gamma (true/false).

Settings are read from an optional TOML file (--config); flags override it.
Run 'imgserve gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Listen address, host:port or :port [default: :8080]
    #[arg(long)]
    http: Option<String>,

    /// Cache budget in bytes, 0 disables the cache [default: 134217728]
    #[arg(long)]
    cache: Option<u64>,

    /// Source image directory [default: upload]
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Maximum output width in pixels [default: 2048]
    #[arg(long)]
    maxw: Option<u32>,

    /// Maximum output height in pixels [default: 2048]
    #[arg(long)]
    maxh: Option<u32>,

    /// Images processed at the same time [default: 2 x CPU cores]
    #[arg(long)]
    concurrency: Option<usize>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print a stock config file with all options documented
    GenConfig,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    fn resolve_config(&self) -> Result<ServerConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(listen) = &self.http {
            config.listen = listen.clone();
        }
        if let Some(cache) = self.cache {
            config.cache_size = cache;
        }
        if let Some(dir) = &self.dir {
            config.source_dir = dir.clone();
        }
        if let Some(max_width) = self.maxw {
            config.max_width = max_width;
        }
        if let Some(max_height) = self.maxh {
            config.max_height = max_height;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = Some(concurrency);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::GenConfig) = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = cli.resolve_config()?;
    let addr = config.listen_addr()?;
    if !config.source_dir.is_dir() {
        warn!(dir = %config.source_dir.display(), "source directory does not exist yet");
    }

    let state = AppState::new(build_server(&config), &config);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        address = %addr,
        source_dir = %config.source_dir.display(),
        cache_bytes = config.cache_size,
        max_width = config.max_width,
        max_height = config.max_height,
        concurrency = config.effective_concurrency(),
        gamma_correction = config.gamma_correction,
        "imgserve listening"
    );

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
