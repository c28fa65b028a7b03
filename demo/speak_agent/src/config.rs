use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use aloud_core::SpeechConfig;

/// High-level configuration for the speak agent demo.
#[derive(Clone, Debug, Default)]
pub struct SpeakAgentConfig {
    pub speech: SpeechConfig,
}

impl SpeakAgentConfig {
    /// Load configuration from a TOML file (path via ALOUD_AGENT_CONFIG or
    /// ./speak_agent.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("ALOUD_AGENT_CONFIG").unwrap_or_else(|_| "speak_agent.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "speak_agent", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<SpeakAgentToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "speak_agent", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "speak_agent", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SpeakAgentToml {
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub worker: Option<WorkerToml>,
    pub planner: Option<PlannerToml>,
}

impl SpeakAgentToml {
    fn overlay(self, mut base: SpeakAgentConfig) -> SpeakAgentConfig {
        if let Some(v) = self.voice {
            base.speech.voice = v;
        }
        if let Some(s) = self.speed {
            base.speech.speed = s.clamp(0.5, 2.0);
        }
        if let Some(w) = self.worker {
            w.apply(&mut base.speech.worker);
        }
        if let Some(p) = self.planner {
            p.apply(&mut base.speech.planner);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct WorkerToml {
    pub bin: Option<PathBuf>,
    pub model: Option<String>,
    pub players: Option<Vec<String>>,
    pub cache_dir: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
    pub probe: Option<Vec<String>>,
    pub ready_timeout_ms: Option<u64>,
}
impl WorkerToml {
    fn apply(self, w: &mut aloud_core::WorkerConfig) {
        if let Some(x) = self.bin {
            w.bin = x;
        }
        if let Some(x) = self.model {
            w.model = x;
        }
        if let Some(mut x) = self.players {
            w.players = x.drain(..).filter(|p| !p.is_empty()).collect();
        }
        if let Some(x) = self.cache_dir {
            w.cache_dir = Some(x);
        }
        if let Some(x) = self.env {
            w.env.extend(x);
        }
        if let Some(x) = self.probe {
            w.probe = x;
        }
        if let Some(x) = self.ready_timeout_ms {
            w.ready_timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlannerToml {
    pub max_speak_chars: Option<usize>,
    pub max_sentences_per_utterance: Option<usize>,
    pub pause_profile: Option<String>,
    pub code_policy: Option<String>,
    pub short_code_max_lines: Option<usize>,
    pub short_code_max_chars: Option<usize>,
    pub short_command_max_chars: Option<usize>,
}
impl PlannerToml {
    fn apply(self, p: &mut aloud_core::PlannerConfig) {
        if let Some(x) = self.max_speak_chars {
            p.max_speak_chars = x;
        }
        if let Some(x) = self.max_sentences_per_utterance {
            p.max_sentences_per_utterance = x;
        }
        if let Some(x) = self.pause_profile.and_then(|s| s.parse().ok()) {
            p.pause_profile = x;
        }
        if let Some(x) = self.code_policy.and_then(|s| s.parse().ok()) {
            p.code_policy = x;
        }
        if let Some(x) = self.short_code_max_lines {
            p.short_code_max_lines = x;
        }
        if let Some(x) = self.short_code_max_chars {
            p.short_code_max_chars = x;
        }
        if let Some(x) = self.short_command_max_chars {
            p.short_command_max_chars = x;
        }
    }
}
