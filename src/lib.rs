//! Loopback Recorder - system audio to MP3 through FFmpeg.
//!
//! The library drives an external FFmpeg process: it builds the capture
//! arguments for the host platform, supervises the encoder, stops it
//! gracefully and decides whether the recording succeeded.

pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod encoder;
pub mod recorder;
pub mod utils;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run the command-line application
pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loopback_recorder_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Loopback Recorder v{}", env!("CARGO_PKG_VERSION"));

    let cli = cli::Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(cli::execute(cli))
}
