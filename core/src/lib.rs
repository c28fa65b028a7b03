// Aloud Core Library
// Spoken delivery of assistant text: plan compiler + worker supervision

pub mod config;
pub mod notify;
pub mod planner;
pub mod speech;
pub mod worker;

// Export core types
pub use config::{SpeechConfig, WorkerConfig};
pub use notify::{LogSink, NotificationSink};
pub use planner::{
    plan, CodeSpeechPolicy, PauseProfile, PauseReason, PlanItem, PlannerConfig, SpeakStyle,
};
pub use speech::SpeechService;
pub use worker::protocol::{LineBuffer, Operation, WorkerEvent};
pub use worker::supervisor::{SpeechStats, WorkerState, WorkerSupervisor};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AloudError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, AloudError>;
