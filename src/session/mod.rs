//! Reciting session management
//!
//! This module provides the `ReciteSession` controller that manages:
//! - The control protocol (script, pause, resume, end)
//! - Audio forwarding to the speech recognizer, held until it is ready
//! - Transcript alignment and confirmation tracking
//! - Confirmation snapshots back to the client
//! - Idempotent teardown and session statistics

mod config;
mod messages;
mod session;
mod state;
mod stats;
mod transport;

pub use config::{SessionConfig, SessionContext};
pub use messages::{ClientMessage, ServerMessage, WordStatus};
pub use session::{ReciteSession, SessionObserver};
pub use state::{ScriptProgress, SessionPhase, SessionState};
pub use stats::SessionStats;
pub use transport::{Inbound, Outbound, OutboundSink};
