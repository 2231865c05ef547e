//! `miniyou-worker` -- command-line front end for the MiniYou stylizer.
//!
//! Submits portrait stylization jobs to a ComfyUI backend, waits for them
//! to finish and writes the resulting PNG to disk.
//!
//! # Environment variables
//!
//! | Variable               | Default                       | Description                         |
//! |------------------------|-------------------------------|-------------------------------------|
//! | `COMFYUI_URL`          | `http://localhost:8188`       | ComfyUI HTTP base URL               |
//! | `GENERATION_MODE`      | `live`                        | `live` or `demo` (local placeholder)|
//! | `POLL_INTERVAL_MS`     | `2000`                        | Delay between status requests       |
//! | `POLL_TIMEOUT_SECS`    | `60`                          | Ceiling on waiting for one job      |
//! | `REQUEST_TIMEOUT_SECS` | `30`                          | Per-HTTP-request timeout            |
//! | `CHECKPOINT_NAME`      | `sd_v1-5-pruned-emaonly.ckpt` | Model checkpoint to load            |
//! | `IMAGE_SIZE`           | `512`                         | Output width and height             |
//! | `HISTORY_CAPACITY`     | `50`                          | Generation records kept in memory   |

use clap::Parser;
use miniyou_worker::commands::{self, Cli};
use miniyou_worker::config::WorkerConfig;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "miniyou_worker=info,miniyou_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        comfyui_url = %config.comfyui_url,
        mode = %config.mode,
        "Starting miniyou-worker",
    );

    if let Err(e) = commands::run(cli.command, &config).await {
        tracing::error!(error = format!("{e:#}"), "Command failed");
        std::process::exit(1);
    }
}
