pub mod alignment;
pub mod asr;
pub mod config;
pub mod http;
pub mod session;

pub use alignment::{AlignedWord, Aligner, AlignmentPolicy, AlignmentResult, MatchedSet};
pub use asr::{
    AsrClient, AsrError, AsrEvent, AsrStream, DeepgramClient, StreamOptions, TranscriptEvent,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    ClientMessage, ReciteSession, ScriptProgress, ServerMessage, SessionConfig, SessionContext,
    SessionPhase, SessionStats, WordStatus,
};
