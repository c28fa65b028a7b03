//! Collaborator-facing control surface for spoken delivery.
//!
//! One [`SpeechService`] instance per session, created at session start and
//! torn down at shutdown. The host feeds it finished assistant turns and
//! drives enable/disable, voice selection and stats; everything else is
//! internal to the planner and the worker supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SpeechConfig;
use crate::notify::{LogSink, NotificationSink};
use crate::planner::{plan, PlanItem, PlannerConfig};
use crate::worker::supervisor::{SpeechStats, WorkerState, WorkerSupervisor};
use crate::Result;

struct VoiceSettings {
    voice: String,
    speed: f64,
}

/// Session-scoped speech pipeline: planner config + worker supervisor.
pub struct SpeechService {
    planner: PlannerConfig,
    supervisor: Arc<WorkerSupervisor>,
    settings: Mutex<VoiceSettings>,
    enabled: AtomicBool,
}

impl SpeechService {
    pub fn new(cfg: SpeechConfig) -> Self {
        Self::with_notifier(cfg, Arc::new(LogSink))
    }

    pub fn with_notifier(cfg: SpeechConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            supervisor: Arc::new(WorkerSupervisor::with_notifier(cfg.worker, notifier)),
            planner: cfg.planner,
            settings: Mutex::new(VoiceSettings {
                voice: cfg.voice,
                speed: cfg.speed,
            }),
            enabled: AtomicBool::new(false),
        }
    }

    /// Turn speech on: dependency gate plus worker start. The only call
    /// whose failures are reported synchronously.
    pub async fn enable(&self) -> Result<()> {
        self.supervisor.start().await?;
        self.enabled.store(true, Ordering::SeqCst);
        info!(target: "speech", "speech enabled");
        Ok(())
    }

    /// Turn speech off. Implies a clear of queued work.
    pub async fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.supervisor.clear().await;
        self.supervisor.stop().await;
        info!(target: "speech", "speech disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Applies to subsequently enqueued speech.
    pub async fn set_voice(&self, voice: &str) {
        let voice = voice.trim();
        if !voice.is_empty() {
            self.settings.lock().await.voice = voice.to_string();
        }
    }

    /// Applies to subsequently enqueued speech; clamped to 0.5–2.0.
    pub async fn set_speed(&self, speed: f64) {
        self.settings.lock().await.speed = speed.clamp(0.5, 2.0);
    }

    /// Speak one finished assistant turn. Silent no-op while disabled or
    /// while the worker is unavailable.
    pub async fn speak_turn(&self, text: &str) {
        if !self.is_enabled() {
            return;
        }
        if matches!(
            self.supervisor.state().await,
            WorkerState::Stopped | WorkerState::Failed
        ) {
            debug!(target: "speech", "worker unavailable; turn not spoken");
            return;
        }

        let mut cfg = self.planner.clone();
        cfg.max_speak_chars = self.supervisor.chunk_size().await;
        let items = plan(text, &cfg);
        if items.is_empty() {
            return;
        }
        let (voice, speed) = {
            let settings = self.settings.lock().await;
            (settings.voice.clone(), settings.speed)
        };
        debug!(
            target: "speech",
            items = items.len(),
            max_speak_chars = cfg.max_speak_chars,
            "speaking turn"
        );
        for item in items {
            match item {
                PlanItem::Speak { text, .. } => {
                    self.supervisor.enqueue_speak(&text, &voice, speed).await;
                }
                PlanItem::Pause { duration_ms, .. } => {
                    self.supervisor.enqueue_pause(duration_ms).await;
                }
            }
        }
    }

    /// Drop queued speech immediately; cooperative toward the worker.
    pub async fn interrupt(&self) {
        self.supervisor.clear().await;
    }

    pub async fn stats(&self) -> SpeechStats {
        self.supervisor.stats().await
    }

    pub async fn reset_stats(&self) {
        self.supervisor.reset_stats().await;
    }

    /// Session teardown.
    pub async fn shutdown(&self) {
        self.disable().await;
    }

    /// Direct access to the supervising half.
    pub fn supervisor(&self) -> &Arc<WorkerSupervisor> {
        &self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_service_ignores_turns() {
        let service = SpeechService::new(SpeechConfig::default());
        assert!(!service.is_enabled());
        service.speak_turn("Hello there.").await;
        let stats = service.stats().await;
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn voice_and_speed_updates_apply() {
        let service = SpeechService::new(SpeechConfig::default());
        service.set_voice("  ").await; // ignored
        service.set_voice("Luna").await;
        service.set_speed(5.0).await; // clamped
        let settings = service.settings.lock().await;
        assert_eq!(settings.voice, "Luna");
        assert_eq!(settings.speed, 2.0);
    }
}
