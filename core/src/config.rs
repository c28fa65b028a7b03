//! Configuration for the speech pipeline.
//!
//! Defaults come from the environment (`ALOUD_*` variables); the demo app
//! overlays an optional TOML file on top of these.
//!
//! Env overrides:
//! - ALOUD_WORKER_BIN, ALOUD_MODEL, ALOUD_PLAYERS, ALOUD_CACHE_DIR
//! - ALOUD_PROBE (comma-separated command), ALOUD_READY_TIMEOUT_MS
//! - ALOUD_VOICE, ALOUD_SPEED, ALOUD_PAUSE_PROFILE, ALOUD_CODE_POLICY

use std::collections::HashMap;
use std::path::PathBuf;

use crate::planner::PlannerConfig;

/// Invocation and supervision knobs for the external synthesis worker.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Worker executable (the persistent synthesis process).
    pub bin: PathBuf,
    /// Model identifier passed as `--model`.
    pub model: String,
    /// Audio player priority list passed as `--players` (comma-joined).
    pub players: Vec<String>,
    /// Model cache home, exported to the worker as `HF_HOME`.
    pub cache_dir: Option<PathBuf>,
    /// Extra environment for the worker (synthesis thread-count hints etc.).
    pub env: HashMap<String, String>,
    /// Dependency probe command run before each start; empty disables the gate.
    pub probe: Vec<String>,
    /// How long to wait for the `ready` event before warning.
    pub ready_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let bin = std::env::var("ALOUD_WORKER_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("aloud-worker"));
        let model = std::env::var("ALOUD_MODEL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "KittenML/kitten-tts-micro-0.8".to_string());
        let players = parse_list_env("ALOUD_PLAYERS").unwrap_or_else(|| {
            vec!["pw-play".to_string(), "paplay".to_string(), "aplay".to_string()]
        });
        let cache_dir = std::env::var("ALOUD_CACHE_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let probe = parse_list_env("ALOUD_PROBE").unwrap_or_else(default_probe);
        let ready_timeout_ms = std::env::var("ALOUD_READY_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30_000);

        Self {
            bin,
            model,
            players,
            cache_dir,
            env: HashMap::new(),
            probe,
            ready_timeout_ms,
        }
    }
}

// Import set the worker needs at startup
fn default_probe() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-c".to_string(),
        "import onnxruntime, soundfile, phonemizer, espeakng_loader, huggingface_hub".to_string(),
    ]
}

// Parse a comma-separated env var into a non-empty list
fn parse_list_env(name: &str) -> Option<Vec<String>> {
    let items: Vec<String> = std::env::var(name)
        .ok()?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Top-level configuration: worker invocation, planner tuning and the
/// default voice settings applied to enqueued speech.
#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub worker: WorkerConfig,
    pub planner: PlannerConfig,
    pub voice: String,
    pub speed: f64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let voice = std::env::var("ALOUD_VOICE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Bella".to_string());
        let speed = std::env::var("ALOUD_SPEED")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|v| v.clamp(0.5, 2.0))
            .unwrap_or(1.0);

        let mut planner = PlannerConfig::default();
        if let Some(profile) = std::env::var("ALOUD_PAUSE_PROFILE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            planner.pause_profile = profile;
        }
        if let Some(policy) = std::env::var("ALOUD_CODE_POLICY")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            planner.code_policy = policy;
        }

        Self {
            worker: WorkerConfig::default(),
            planner,
            voice,
            speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_defaults_are_usable() {
        let cfg = WorkerConfig::default();
        assert!(!cfg.model.is_empty());
        assert!(!cfg.players.is_empty());
        assert!(cfg.ready_timeout_ms > 0);
        assert!(!cfg.probe.is_empty());
    }

    #[test]
    fn speech_defaults_have_a_voice() {
        let cfg = SpeechConfig::default();
        assert!(!cfg.voice.is_empty());
        assert!((0.5..=2.0).contains(&cfg.speed));
    }
}
