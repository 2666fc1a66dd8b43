//! Recording state management
//!
//! Defines the session state machine and the outcome reported when a
//! session ends.

use crate::capture::DeviceSelector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session exists
    #[default]
    Idle,
    /// Slot reserved, encoder being spawned
    Starting,
    /// Encoder running
    Recording,
    /// Quit requested, waiting for the encoder to exit
    Stopping,
    /// Encoder exited, outcome being computed
    Terminated,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Recording)
                | (Starting, Idle)
                | (Recording, Stopping)
                | (Recording, Terminated)
                | (Stopping, Terminated)
                | (Terminated, Idle)
        )
    }

    /// Starting, Recording and Stopping all count as an active session
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Recording | Self::Stopping)
    }
}

/// The single in-flight recording
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    state: SessionState,
    output_path: PathBuf,
    device: Option<DeviceSelector>,
    started_at: DateTime<Utc>,
}

impl RecordingSession {
    /// Reserve a new session in the Starting state
    pub fn new(output_path: PathBuf, device: Option<DeviceSelector>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Starting,
            output_path,
            device,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }

    pub fn device(&self) -> Option<DeviceSelector> {
        self.device
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Move to `next`, refusing illegal transitions
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Session {}: refusing transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
            return false;
        }

        tracing::debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }
}

/// Caller-facing classification of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// File saved
    Success,
    /// File saved but probably silent
    Warning,
    /// No usable file
    Error,
}

/// Why the session ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    /// Exit code 0 or 130, or the interrupt signal
    CleanStop,
    /// Exit code 1 or 255, resolved by inspecting the file
    AmbiguousExit,
    /// Output absent or empty after exit
    EmptyOrMissingOutput,
    /// Any other exit code
    EncoderFailure,
    /// A fatal diagnostic was seen while recording
    LiveDiagnosticFailure,
    /// Terminated by a signal other than the interrupt
    KilledBySignal,
    /// Exit status could not be collected
    WaitFailure,
}

/// Result of a session, delivered exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationOutcome {
    pub kind: OutcomeKind,
    pub reason: TerminationReason,
    /// Always set for Warning and Error
    pub message: Option<String>,
    /// Set when a usable file exists
    pub output_path: Option<PathBuf>,
}

impl TerminationOutcome {
    pub fn success(output_path: PathBuf, reason: TerminationReason, message: Option<String>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            reason,
            message,
            output_path: Some(output_path),
        }
    }

    pub fn warning(output_path: PathBuf, reason: TerminationReason, message: String) -> Self {
        Self {
            kind: OutcomeKind::Warning,
            reason,
            message: Some(message),
            output_path: Some(output_path),
        }
    }

    pub fn error(reason: TerminationReason, message: String) -> Self {
        Self {
            kind: OutcomeKind::Error,
            reason,
            message: Some(message),
            output_path: None,
        }
    }
}

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RecordingEvent {
    /// Encoder spawned
    #[serde(rename_all = "camelCase")]
    Started { output_path: PathBuf },
    /// File saved
    #[serde(rename_all = "camelCase")]
    Stopped {
        output_path: PathBuf,
        message: Option<String>,
    },
    /// File saved but flagged, rendered by hosts like an error
    #[serde(rename_all = "camelCase")]
    Warning { output_path: PathBuf, message: String },
    /// Session failed
    Error { message: String },
}

impl RecordingEvent {
    /// Whether this event ends a session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

impl From<TerminationOutcome> for RecordingEvent {
    fn from(outcome: TerminationOutcome) -> Self {
        match (outcome.kind, outcome.output_path) {
            (OutcomeKind::Success, Some(output_path)) => RecordingEvent::Stopped {
                output_path,
                message: outcome.message,
            },
            (OutcomeKind::Warning, Some(output_path)) => RecordingEvent::Warning {
                output_path,
                message: outcome.message.unwrap_or_default(),
            },
            (_, _) => RecordingEvent::Error {
                message: outcome
                    .message
                    .unwrap_or_else(|| "Recording failed".to_string()),
            },
        }
    }
}
