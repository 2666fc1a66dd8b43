//! Recording session manager
//!
//! Owns the single recording slot. Starting reserves the slot before the
//! encoder is spawned, so at most one encoder process exists at a time.

use super::classifier::{classify, FsProbe, TerminationReport};
use super::process::{spawn_encoder, supervise, ControlMessage, ProcessExit, SupervisorContext};
use super::state::{
    RecordingEvent, RecordingSession, SessionState, TerminationOutcome, TerminationReason,
};
use crate::capture::{CapturePlatform, DeviceSelector};
use crate::config::RecorderConfig;
use crate::encoder::{
    build_recording_args, list_devices, DeviceListing, EncoderLocator, FallbackSelection,
};
use crate::utils::error::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

struct ActiveSession {
    session: RecordingSession,
    /// Channel to the supervisor, set once the encoder is running
    control: Option<mpsc::UnboundedSender<ControlMessage>>,
    /// Stop requested while the encoder was still being spawned
    stop_pending: bool,
}

type SessionSlot = Arc<Mutex<Option<ActiveSession>>>;

/// A session whose encoder was spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRecording {
    pub output_path: PathBuf,
    /// DirectShow candidate in use, so a failed attempt can move to the next one
    pub fallback: Option<FallbackSelection>,
}

/// Manages the lifecycle of the recording session
///
/// Construct one per application and share it; the slot and the event
/// channel are what make the single-session guarantee hold.
pub struct RecordingManager {
    platform: CapturePlatform,
    locator: EncoderLocator,
    grace_period: Duration,
    slot: SessionSlot,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingManager {
    pub fn new(config: &RecorderConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            platform: config.platform(),
            locator: EncoderLocator::from_config(config),
            grace_period: config.grace_period(),
            slot: Arc::new(Mutex::new(None)),
            event_tx,
        }
    }

    pub fn platform(&self) -> &CapturePlatform {
        &self.platform
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Current session state, Idle when there is no session
    pub fn state(&self) -> SessionState {
        self.slot
            .lock()
            .as_ref()
            .map(|active| active.session.state())
            .unwrap_or_default()
    }

    /// True from the moment a start is accepted until the outcome is known
    pub fn is_recording(&self) -> bool {
        self.state().is_active()
    }

    /// Output file of the current session
    pub fn output_path(&self) -> Option<PathBuf> {
        self.slot
            .lock()
            .as_ref()
            .map(|active| active.session.output_path().clone())
    }

    /// Start a recording into `output_path`
    ///
    /// Must be called from within a Tokio runtime. Returns once the encoder
    /// has been spawned; the outcome arrives later as a terminal event.
    pub fn start(
        &self,
        output_path: PathBuf,
        device: Option<DeviceSelector>,
    ) -> RecorderResult<StartedRecording> {
        let session_id = {
            let mut slot = self.slot.lock();
            if let Some(active) = slot.as_ref() {
                tracing::warn!(
                    "Start rejected, session {} is {:?}",
                    active.session.id,
                    active.session.state()
                );
                return Err(RecorderError::AlreadyActive);
            }

            let session = RecordingSession::new(output_path.clone(), device);
            let session_id = session.id;
            *slot = Some(ActiveSession {
                session,
                control: None,
                stop_pending: false,
            });
            session_id
        };

        match self.launch(session_id, &output_path, device) {
            Ok(fallback) => Ok(StartedRecording {
                output_path,
                fallback,
            }),
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.release(session_id);
                Err(e)
            }
        }
    }

    /// Ask the running encoder to finish the file
    ///
    /// Idempotent while a stop is already in progress.
    pub fn stop(&self) -> RecorderResult<()> {
        let mut slot = self.slot.lock();
        let Some(active) = slot.as_mut() else {
            return Err(RecorderError::NotActive);
        };

        match active.session.state() {
            SessionState::Starting => {
                tracing::info!("Session {}: stop requested during start", active.session.id);
                active.stop_pending = true;
                Ok(())
            }
            SessionState::Recording => {
                tracing::info!("Session {}: stopping", active.session.id);
                let sent = active
                    .control
                    .as_ref()
                    .is_some_and(|control| control.send(ControlMessage::Stop).is_ok());
                if !sent {
                    tracing::debug!("Supervisor already gone, the exit is being processed");
                }
                active.session.advance(SessionState::Stopping);
                Ok(())
            }
            SessionState::Stopping => {
                tracing::debug!("Session {}: stop already in progress", active.session.id);
                Ok(())
            }
            SessionState::Idle | SessionState::Terminated => Err(RecorderError::NotActive),
        }
    }

    /// Run the encoder's device listing
    pub async fn list_devices(&self) -> RecorderResult<DeviceListing> {
        let encoder_path = self.locator.validate()?;
        list_devices(&encoder_path, &self.platform).await
    }

    fn launch(
        &self,
        session_id: Uuid,
        output_path: &Path,
        device: Option<DeviceSelector>,
    ) -> RecorderResult<Option<FallbackSelection>> {
        let encoder_path = self.locator.validate()?;

        let fallback_index = device.and_then(|selector| selector.fallback_index());
        let encoder_args = build_recording_args(
            &self.platform,
            &output_path.to_string_lossy(),
            device.and_then(|selector| selector.device_index()),
            fallback_index.is_some(),
            fallback_index.unwrap_or(0),
        )?;

        tracing::info!("Starting FFmpeg: {:?} {:?}", encoder_path, encoder_args.args);

        let child =
            spawn_encoder(&encoder_path, &encoder_args.args).map_err(RecorderError::SpawnFailure)?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        {
            let mut slot = self.slot.lock();
            if let Some(active) = slot
                .as_mut()
                .filter(|active| active.session.id == session_id)
            {
                tracing::info!(
                    "Session {}: recording to {:?} (device {:?})",
                    session_id,
                    active.session.output_path(),
                    active.session.device()
                );
                active.session.advance(SessionState::Recording);
                if active.stop_pending {
                    let _ = control_tx.send(ControlMessage::Stop);
                    active.session.advance(SessionState::Stopping);
                }
                active.control = Some(control_tx);
            }
        }

        let _ = self.event_tx.send(RecordingEvent::Started {
            output_path: output_path.to_path_buf(),
        });

        let ctx = SupervisorContext {
            session_id,
            platform: self.platform.clone(),
            grace_period: self.grace_period,
        };
        let slot = Arc::clone(&self.slot);
        let event_tx = self.event_tx.clone();
        let platform = self.platform.clone();
        let output_path = output_path.to_path_buf();

        tokio::spawn(async move {
            let exit = supervise(child, ctx, control_rx).await;
            finish_session(&slot, &event_tx, session_id, &output_path, &platform, exit);
        });

        Ok(encoder_args.fallback)
    }

    /// Give back a slot whose encoder never started
    fn release(&self, session_id: Uuid) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|active| active.session.id) == Some(session_id) {
            if let Some(mut active) = slot.take() {
                active.session.advance(SessionState::Idle);
            }
        }
    }
}

/// Classify the exit, free the slot, then report the outcome
fn finish_session(
    slot: &Mutex<Option<ActiveSession>>,
    event_tx: &broadcast::Sender<RecordingEvent>,
    session_id: Uuid,
    output_path: &Path,
    platform: &CapturePlatform,
    exit: ProcessExit,
) {
    if let Some(active) = slot
        .lock()
        .as_mut()
        .filter(|active| active.session.id == session_id)
    {
        let elapsed = chrono::Utc::now() - active.session.started_at();
        tracing::info!(
            "Session {}: encoder exited after {:.1}s",
            session_id,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        active.session.advance(SessionState::Terminated);
        active.control = None;
    }

    let outcome = outcome_for(output_path, platform, exit);
    match outcome.message.as_deref() {
        Some(message) => tracing::info!(
            "Session {} finished: {:?} ({:?}): {}",
            session_id,
            outcome.kind,
            outcome.reason,
            message
        ),
        None => tracing::info!(
            "Session {} finished: {:?} ({:?})",
            session_id,
            outcome.kind,
            outcome.reason
        ),
    }

    {
        let mut slot = slot.lock();
        if slot.as_ref().map(|active| active.session.id) == Some(session_id) {
            if let Some(mut active) = slot.take() {
                active.session.advance(SessionState::Idle);
            }
        }
    }

    let _ = event_tx.send(RecordingEvent::from(outcome));
}

fn outcome_for(
    output_path: &Path,
    platform: &CapturePlatform,
    exit: ProcessExit,
) -> TerminationOutcome {
    let (exit_code, signal) = match exit.status {
        Ok(parts) => parts,
        Err(e) if exit.live_failure.is_none() => {
            tracing::error!("Failed to wait for FFmpeg: {}", e);
            return TerminationOutcome::error(
                TerminationReason::WaitFailure,
                format!("Lost track of the recording process: {}", e),
            );
        }
        Err(_) => (None, None),
    };

    let report = TerminationReport {
        exit_code,
        signal,
        output_path,
        platform,
        diagnostics: &exit.diagnostics,
        live_failure: exit.live_failure,
    };

    classify(&report, &FsProbe)
}
