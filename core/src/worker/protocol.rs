//! Wire protocol between the supervisor and the synthesis worker.
//!
//! Bidirectional line-delimited JSON over the worker's stdin/stdout, one
//! UTF-8 object per `\n`-terminated line. Outbound operations are tagged
//! with `op`, inbound events with `type`. Inbound bytes arrive in arbitrary
//! chunks; [`LineBuffer`] reassembles complete lines and keeps a trailing
//! partial line around until its terminator shows up.

use serde::{Deserialize, Serialize};

/// Outbound message to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Speak {
        id: String,
        text: String,
        voice: String,
        speed: f64,
        generation: u64,
    },
    Pause {
        id: String,
        pause_ms: u64,
        generation: u64,
    },
    Clear,
    Shutdown,
}

/// Inbound event from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Ready {
        #[serde(default)]
        player: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Ack {
        id: String,
    },
    SynthDone {
        id: String,
        #[serde(default)]
        synth_ms: Option<f64>,
    },
    PlayDone {
        id: String,
        #[serde(default)]
        synth_ms: Option<f64>,
        #[serde(default)]
        play_ms: Option<f64>,
    },
    PauseDone {
        id: String,
        #[serde(default)]
        pause_ms: Option<f64>,
    },
    Error {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        stage: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Fatal {
        #[serde(default)]
        message: Option<String>,
    },
    Cleared {
        #[serde(default)]
        generation: Option<u64>,
    },
}

/// Encode one operation as a `\n`-terminated protocol line.
pub fn encode_line(op: &Operation) -> crate::Result<String> {
    let mut line = serde_json::to_string(op)?;
    line.push('\n');
    Ok(line)
}

/// Reassembles `\n`-delimited lines from an arbitrarily chunked byte stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line the chunk completed, without its
    /// terminator. A trailing partial line stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Interpreter/runtime chatter that shows up on stdout without being part
/// of the protocol. Dropped at debug level instead of warned about.
pub(crate) fn is_benign_noise(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with("Downloading")
        || trimmed.starts_with("Fetching")
        || trimmed.starts_with("Warning:")
        || trimmed.contains("UserWarning")
        || trimmed.contains("FutureWarning")
        || trimmed.contains("%|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_serializes_to_wire_shape() {
        let op = Operation::Speak {
            id: "c1".to_string(),
            text: "hello".to_string(),
            voice: "Bella".to_string(),
            speed: 1.0,
            generation: 0,
        };
        let line = encode_line(&op).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"op\":\"speak\""));
        assert!(line.contains("\"id\":\"c1\""));
        assert!(line.contains("\"voice\":\"Bella\""));
        assert!(line.contains("\"generation\":0"));
    }

    #[test]
    fn unit_operations_carry_only_the_tag() {
        assert_eq!(encode_line(&Operation::Clear).unwrap(), "{\"op\":\"clear\"}\n");
        assert_eq!(
            encode_line(&Operation::Shutdown).unwrap(),
            "{\"op\":\"shutdown\"}\n"
        );
    }

    #[test]
    fn events_parse_from_worker_samples() {
        let ready: WorkerEvent =
            serde_json::from_str("{\"type\":\"ready\",\"player\":\"aplay\"}").unwrap();
        assert_eq!(
            ready,
            WorkerEvent::Ready {
                player: Some("aplay".to_string()),
                model: None,
            }
        );

        let done: WorkerEvent = serde_json::from_str(
            "{\"type\":\"play_done\",\"id\":\"c3\",\"synth_ms\":123,\"play_ms\":456}",
        )
        .unwrap();
        assert_eq!(
            done,
            WorkerEvent::PlayDone {
                id: "c3".to_string(),
                synth_ms: Some(123.0),
                play_ms: Some(456.0),
            }
        );

        let error: WorkerEvent =
            serde_json::from_str("{\"type\":\"error\",\"stage\":\"input\"}").unwrap();
        assert_eq!(
            error,
            WorkerEvent::Error {
                id: None,
                stage: Some("input".to_string()),
                message: None,
            }
        );

        assert!(serde_json::from_str::<WorkerEvent>("{\"type\":\"mystery\"}").is_err());
    }

    #[test]
    fn line_buffer_reassembles_split_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"type\":\"rea").is_empty());
        let lines = buf.push(b"dy\"}\n{\"type\":\"ack\",");
        assert_eq!(lines, vec!["{\"type\":\"ready\"}".to_string()]);
        let lines = buf.push(b"\"id\":\"c1\"}\n");
        assert_eq!(lines, vec!["{\"type\":\"ack\",\"id\":\"c1\"}".to_string()]);
    }

    #[test]
    fn line_buffer_handles_crlf_and_empty_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\r\n\ntwo\n");
        assert_eq!(lines, vec!["one".to_string(), "".to_string(), "two".to_string()]);
    }

    #[test]
    fn noise_filter_knows_interpreter_chatter() {
        assert!(is_benign_noise(""));
        assert!(is_benign_noise("Downloading model.onnx"));
        assert!(is_benign_noise("foo.py:1: UserWarning: deprecated"));
        assert!(is_benign_noise(" 45%|####      | 12/26"));
        assert!(!is_benign_noise("definitely not json"));
    }
}
