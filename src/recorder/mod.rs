//! Recording session management
//!
//! - `RecordingManager` owns the single session slot
//! - the process supervisor drives one encoder process per session
//! - the classifier turns the exit into a caller-facing outcome

pub mod classifier;
pub mod manager;
mod process;
pub mod state;

pub use classifier::{classify, OutputProbe, TerminationReport};
pub use manager::{RecordingManager, StartedRecording};
pub use state::{
    OutcomeKind, RecordingEvent, RecordingSession, SessionState, TerminationOutcome,
    TerminationReason,
};
