//! Synthesis worker: wire protocol and process supervision.

pub mod protocol;
pub mod supervisor;

pub use protocol::{LineBuffer, Operation, WorkerEvent};
pub use supervisor::{SpeechStats, WorkerState, WorkerSupervisor};
