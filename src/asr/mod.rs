//! Speech recognition collaborator
//!
//! A process-wide `AsrClient` holds configuration and credentials only and
//! opens one `AsrStream` per session. Transcript events are delivered to a
//! handler registered when the stream is opened.

mod client;
pub mod deepgram;
mod error;
pub mod messages;

pub use client::{
    handler_fn, AsrClient, AsrEvent, AsrEventHandler, AsrStream, StreamOptions, TranscriptEvent,
};
pub use deepgram::{DeepgramClient, DeepgramConfig};
pub use error::AsrError;
