//! livecheck terminal client entry point.
//!
//! ```text
//! livecheck                         Connect with defaults
//! livecheck --config <path>         Use custom config TOML
//! livecheck --frames ./recording    Replay JPEG stills as the camera
//! livecheck --gen-config            Dump default config and exit
//! ```
//!
//! Keys (type and press enter): `r` restart, `d` download, `q` quit.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use livecheck_core::{
    DirectoryFrameSource, FrameSource, StillFrameSource, WsConnector, resolve_endpoint,
};

use livecheck_client::config::ClientConfig;
use livecheck_client::render::render;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "livecheck", about = "Real-time liveliness verification client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "livecheck.toml")]
    config: PathBuf,

    /// WebSocket endpoint (overrides config). Example: wss://verify.example.com/ws
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Page origin the endpoint is derived from (overrides config).
    #[arg(short, long)]
    origin: Option<String>,

    /// Directory of JPEG stills to use as the camera (overrides config).
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(endpoint) = cli.endpoint {
        config.network.endpoint = endpoint;
    }
    if let Some(origin) = cli.origin {
        config.network.origin = origin;
    }
    if let Some(frames) = cli.frames {
        config.capture.frames_dir = frames.display().to_string();
    }

    init_tracing(&config)?;
    info!("livecheck v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Camera ───────────────────────────────────────────────

    let source: Arc<dyn FrameSource> = match config.frames_dir() {
        Some(dir) => {
            let frames =
                tokio::task::spawn_blocking(move || DirectoryFrameSource::open(&dir)).await??;
            Arc::new(frames)
        }
        None => {
            warn!("no frames directory configured; nothing will be sent");
            Arc::new(StillFrameSource::empty())
        }
    };

    // ── 2. Start the client ─────────────────────────────────────

    let url = resolve_endpoint(config.endpoint(), &config.network.origin)?;
    let connector = WsConnector::new(url);
    info!("service endpoint: {}", connector.url());
    let client = livecheck_core::spawn(connector, source, config.settings());
    let mut views = client.view_receiver();
    let download_dir = PathBuf::from(&config.download.dir);

    // ── 3. Event loop ───────────────────────────────────────────

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    println!("{}\n", render(&views.borrow_and_update(), &config.display));

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = render(&views.borrow_and_update(), &config.display);
                println!("{text}\n");
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "r" | "restart" => {
                        if let Err(e) = client.restart().await {
                            error!("restart failed: {e}");
                        }
                    }
                    "d" | "download" => match client.download(&download_dir).await {
                        Ok(path) => println!("saved {}", path.display()),
                        Err(e) => println!("download failed: {e}"),
                    },
                    "q" | "quit" => break,
                    "" => {}
                    other => println!("unknown command {other:?}; use r, d or q"),
                },
                // stdin closed; keep running until ctrl-c.
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin error: {e}");
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    client.shutdown().await;
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &ClientConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.log_file() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}
