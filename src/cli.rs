//! Command-line host
//!
//! A minimal host for the recorder: record until Ctrl+C or a time limit,
//! or print the encoder's device listing. Results are printed as JSON.

use crate::capture::DeviceSelector;
use crate::commands::recording::{
    default_output_name, list_audio_devices, recording_events, start_recording, stop_recording,
    RecorderState,
};
use crate::config::RecorderConfig;
use crate::recorder::RecordingEvent;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "loopback-recorder")]
#[command(about = "Record system audio to MP3 through FFmpeg")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// FFmpeg binary to use instead of the resolved one
    #[arg(long, global = true)]
    pub encoder: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record system audio until Ctrl+C or the duration elapses
    Record {
        /// Output file (defaults to recording-<timestamp>.mp3)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// AVFoundation audio device index (macOS)
        #[arg(long, conflicts_with = "fallback_device")]
        device: Option<u32>,

        /// DirectShow fallback candidate index (Windows)
        #[arg(long)]
        fallback_device: Option<usize>,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Print the capture devices FFmpeg reports
    Devices,
}

impl Cli {
    /// Build the recorder configuration: file, then environment, then flags
    pub fn recorder_config(&self) -> Result<RecorderConfig> {
        let config = match &self.config {
            Some(path) => RecorderConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RecorderConfig::default(),
        };

        let mut config = config.with_env_overrides();
        if let Some(encoder) = &self.encoder {
            config.encoder_path = Some(encoder.clone());
        }

        Ok(config)
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.recorder_config()?;
    let state = RecorderState::new(&config);

    match cli.command {
        Commands::Devices => {
            let response = list_audio_devices(&state).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if let Some(error) = response.error {
                bail!(error.message);
            }
            Ok(())
        }
        Commands::Record {
            output,
            device,
            fallback_device,
            duration,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from(default_output_name()));
            let selector = device
                .map(DeviceSelector::Index)
                .or(fallback_device.map(DeviceSelector::Fallback));

            record(&state, output, selector, duration.map(Duration::from_secs)).await
        }
    }
}

async fn record(
    state: &RecorderState,
    output: PathBuf,
    selector: Option<DeviceSelector>,
    duration: Option<Duration>,
) -> Result<()> {
    let mut events = recording_events(state);

    let response = start_recording(state, Some(output), selector);
    if let Some(error) = response.error {
        bail!(error.message);
    }
    if let Some(path) = &response.path {
        eprintln!("Recording to {} (Ctrl+C to stop)", path.display());
    }
    if let Some(fallback) = &response.fallback {
        eprintln!(
            "Using fallback device {}/{}: {}",
            fallback.index + 1,
            fallback.total,
            fallback.device_name
        );
        if let Some(next) = fallback.next_index() {
            eprintln!("If this device does not work, retry with --fallback-device {}", next);
        }
    }

    let outcome = match wait_for_stop_request(&mut events, duration).await? {
        Some(event) => event,
        None => {
            let response = stop_recording(state);
            if let Some(error) = response.error {
                tracing::warn!("Stop was not accepted: {}", error.message);
            }
            next_terminal_event(&mut events).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        RecordingEvent::Error { message } => bail!(message),
        RecordingEvent::Warning { message, .. } => {
            eprintln!("{}", message);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Wait for Ctrl+C or the time limit
///
/// Returns the terminal event instead if the session ends on its own first.
async fn wait_for_stop_request(
    events: &mut broadcast::Receiver<RecordingEvent>,
    duration: Option<Duration>,
) -> Result<Option<RecordingEvent>> {
    let limit = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(limit);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                tracing::info!("Ctrl+C received, stopping");
                return Ok(None);
            }
            _ = &mut limit => {
                tracing::info!("Duration reached, stopping");
                return Ok(None);
            }
            event = recv_event(events) => {
                let event = event?;
                if event.is_terminal() {
                    return Ok(Some(event));
                }
            }
        }
    }
}

async fn next_terminal_event(
    events: &mut broadcast::Receiver<RecordingEvent>,
) -> Result<RecordingEvent> {
    loop {
        let event = recv_event(events).await?;
        if event.is_terminal() {
            return Ok(event);
        }
    }
}

async fn recv_event(events: &mut broadcast::Receiver<RecordingEvent>) -> Result<RecordingEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Ok(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} recording events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => bail!("Recording event channel closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_record_command() {
        let cli = Cli::parse_from([
            "loopback-recorder",
            "record",
            "--output",
            "/tmp/out.mp3",
            "--device",
            "2",
            "--duration",
            "5",
        ]);

        match cli.command {
            Commands::Record {
                output,
                device,
                fallback_device,
                duration,
            } => {
                assert_eq!(output, Some(PathBuf::from("/tmp/out.mp3")));
                assert_eq!(device, Some(2));
                assert_eq!(fallback_device, None);
                assert_eq!(duration, Some(5));
            }
            Commands::Devices => panic!("expected record"),
        }
    }

    #[test]
    fn test_device_and_fallback_conflict() {
        let result = Cli::try_parse_from([
            "loopback-recorder",
            "record",
            "--device",
            "1",
            "--fallback-device",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_encoder_flag_overrides_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{"encoderPath":"/from/file","gracePeriodMs":750}"#).unwrap();

        let cli = Cli::parse_from([
            "loopback-recorder",
            "--config",
            path.to_str().unwrap(),
            "--encoder",
            "/from/flag",
            "devices",
        ]);

        let config = cli.recorder_config().unwrap();
        assert_eq!(config.encoder_path, Some(PathBuf::from("/from/flag")));
        assert_eq!(config.grace_period_ms, 750);
    }
}
