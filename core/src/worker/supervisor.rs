//! Synthesis worker supervision.
//!
//! Owns at most one external synthesis process. Operations go out as tagged
//! JSON lines; completion events come back asynchronously and are resolved
//! against a pending set keyed by operation id. The protocol is
//! id-addressed, not position-addressed: completions may arrive in any
//! order, and only their delivery order is fixed (a single reader task
//! consumes the byte stream).
//!
//! `clear` is a cooperative cancellation: the generation counter is bumped
//! and local pending state empties immediately; whatever the worker does
//! with the stale work, events whose id is no longer pending are ignored.
//!
//! A closed-loop controller sizes future utterances from observed latency:
//! the synth-to-playback ratio of each completed chunk grows or shrinks the
//! chunk size within fixed bounds, with a hysteresis band in between.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::notify::{LogSink, NotificationSink};
use crate::worker::protocol::{encode_line, is_benign_noise, LineBuffer, Operation, WorkerEvent};
use crate::{AloudError, Result};

/// Chunk-size bounds for the latency feedback controller.
pub const CHUNK_MIN: usize = 120;
pub const CHUNK_MAX: usize = 400;
pub const CHUNK_STEP: usize = 40;
pub const CHUNK_INITIAL: usize = 220;
/// Hysteresis band on the synth/play ratio: grow above, shrink below.
pub const RATIO_HIGH: f64 = 1.25;
pub const RATIO_LOW: f64 = 0.55;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const READ_CHUNK: usize = 4096;

/// Lifecycle state of the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Ready,
    /// Lost to a fatal event or an unexpected exit; a new `start` is the
    /// only way out.
    Failed,
}

/// What a pending operation id is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Speak,
    Pause,
}

/// Counters surfaced through the control surface. `pending`, `generation`
/// and `chunk_size` are snapshots taken when the stats are read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechStats {
    pub chunks_spoken: u64,
    pub chunks_failed: u64,
    pub pauses_completed: u64,
    pub total_synth_ms: u64,
    pub total_play_ms: u64,
    pub clears: u64,
    pub fatal_events: u64,
    pub protocol_noise: u64,
    pub pending: usize,
    pub generation: u64,
    pub chunk_size: usize,
    pub player: Option<String>,
    pub model: Option<String>,
}

struct Inner {
    state: WorkerState,
    pending: HashMap<String, PendingKind>,
    generation: u64,
    chunk_size: usize,
    next_id: u64,
    stats: SpeechStats,
    player: Option<String>,
    model: Option<String>,
    ready_timer: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: WorkerState::Stopped,
            pending: HashMap::new(),
            generation: 0,
            chunk_size: CHUNK_INITIAL,
            next_id: 0,
            stats: SpeechStats::default(),
            player: None,
            model: None,
            ready_timer: None,
            reader_task: None,
            stderr_task: None,
            kill_tx: None,
        }
    }

    fn can_send(&self) -> bool {
        matches!(self.state, WorkerState::Starting | WorkerState::Ready)
    }
}

type SharedWriter = Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// Supervisor for the external synthesis worker.
pub struct WorkerSupervisor {
    cfg: WorkerConfig,
    inner: Arc<Mutex<Inner>>,
    writer: SharedWriter,
    notifier: Arc<dyn NotificationSink>,
}

impl WorkerSupervisor {
    pub fn new(cfg: WorkerConfig) -> Self {
        Self::with_notifier(cfg, Arc::new(LogSink))
    }

    pub fn with_notifier(cfg: WorkerConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            cfg,
            inner: Arc::new(Mutex::new(Inner::new())),
            writer: Arc::new(Mutex::new(None)),
            notifier,
        }
    }

    /// Run the dependency probe. A failure blocks `start` with an
    /// actionable message; there is no polling, the probe simply reruns on
    /// the next start attempt.
    pub async fn probe_dependencies(&self) -> Result<()> {
        let Some((program, args)) = self.cfg.probe.split_first() else {
            return Ok(());
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        match timeout(PROBE_TIMEOUT, cmd.output()).await {
            Err(_) => Err(AloudError::Configuration(format!(
                "dependency probe timed out after {}s: {program}",
                PROBE_TIMEOUT.as_secs()
            ))),
            Ok(Err(e)) => Err(AloudError::Configuration(format!(
                "dependency probe could not run ({program}): {e}"
            ))),
            Ok(Ok(out)) if !out.status.success() => {
                let detail = String::from_utf8_lossy(&out.stderr);
                let detail = detail.lines().last().unwrap_or("").trim().to_string();
                Err(AloudError::Configuration(format!(
                    "synthesis dependencies missing; install the worker requirements ({detail})"
                )))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Probe dependencies, spawn the worker and attach its pipes.
    ///
    /// Only probe and spawn failures are reported here; everything after
    /// the spawn arrives asynchronously as events.
    pub async fn start(&self) -> Result<()> {
        {
            let inner = self.inner.lock().await;
            if inner.can_send() {
                debug!(target: "speech_worker", "worker already running");
                return Ok(());
            }
        }

        self.probe_dependencies().await?;

        let mut cmd = Command::new(&self.cfg.bin);
        cmd.arg("--model")
            .arg(&self.cfg.model)
            .arg("--players")
            .arg(self.cfg.players.join(","))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cfg.cache_dir {
            cmd.env("HF_HOME", dir);
        }
        for (key, val) in &self.cfg.env {
            cmd.env(key, val);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AloudError::Worker(format!("failed to spawn {:?}: {e}", self.cfg.bin))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AloudError::Worker("worker stdout not captured".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AloudError::Worker("worker stdin not captured".to_string()))?;
        let stderr = child.stderr.take();

        // Per-process state resets before the first event can arrive.
        // Chunk size restarts from its initial value: latency observed
        // against the previous process does not carry over.
        {
            let mut inner = self.inner.lock().await;
            inner.pending.clear();
            inner.chunk_size = CHUNK_INITIAL;
            inner.player = None;
            inner.model = None;
        }

        self.attach(stdout, stdin).await;

        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            if let Some(handle) = stderr.map(spawn_stderr_drain) {
                inner.stderr_task = Some(handle);
            }
            inner.kill_tx = Some(kill_tx);
        }
        tokio::spawn(watch_child(
            child,
            Arc::clone(&self.inner),
            Arc::clone(&self.writer),
            Arc::clone(&self.notifier),
            kill_rx,
        ));

        info!(
            target: "speech_worker",
            bin = ?self.cfg.bin,
            model = %self.cfg.model,
            players = %self.cfg.players.join(","),
            "synthesis worker started"
        );
        Ok(())
    }

    /// Attach an I/O pair as the worker transport and begin consuming
    /// events. `start` wires the child's pipes through here; tests attach
    /// an in-memory duplex instead of spawning a process.
    pub async fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        *self.writer.lock().await = Some(Box::new(writer));

        let mut inner = self.inner.lock().await;
        inner.state = WorkerState::Starting;

        // Readiness timer: a worker that stays silent past the timeout is
        // worth a warning, but it may still come up (first start downloads
        // the model).
        let timer_inner = Arc::clone(&self.inner);
        let timeout_ms = self.cfg.ready_timeout_ms;
        inner.ready_timer = Some(tokio::spawn(async move {
            sleep(Duration::from_millis(timeout_ms)).await;
            let inner = timer_inner.lock().await;
            if inner.state == WorkerState::Starting {
                warn!(
                    target: "speech_worker",
                    timeout_ms,
                    "worker not ready yet; continuing to wait"
                );
            }
        }));

        let reader_inner = Arc::clone(&self.inner);
        let reader_writer = Arc::clone(&self.writer);
        let reader_notifier = Arc::clone(&self.notifier);
        inner.reader_task = Some(tokio::spawn(async move {
            read_events(reader, reader_inner, reader_writer, reader_notifier).await;
        }));
    }

    /// Stop the worker. Local state clears first so the exit watcher treats
    /// the process exit as expected; the shutdown line is best effort.
    pub async fn stop(&self) {
        let (reader, stderr, timer, kill) = {
            let mut inner = self.inner.lock().await;
            let dropped = inner.pending.len();
            if dropped > 0 {
                debug!(target: "speech_worker", dropped, "dropping pending operations on stop");
            }
            inner.pending.clear();
            inner.state = WorkerState::Stopped;
            (
                inner.reader_task.take(),
                inner.stderr_task.take(),
                inner.ready_timer.take(),
                inner.kill_tx.take(),
            )
        };

        self.send_operation(&Operation::Shutdown).await;
        *self.writer.lock().await = None;

        if let Some(tx) = kill {
            let _ = tx.send(());
        }
        for handle in [timer, reader, stderr].into_iter().flatten() {
            handle.abort();
        }
        info!(target: "speech_worker", "synthesis worker stopped");
    }

    /// Queue one speak operation. Fire and forget: failures surface as
    /// warnings or events, never to the caller.
    pub async fn enqueue_speak(&self, text: &str, voice: &str, speed: f64) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let op = {
            let mut inner = self.inner.lock().await;
            if !inner.can_send() {
                debug!(target: "speech_worker", "speech unavailable; speak dropped");
                return;
            }
            inner.next_id += 1;
            let id = format!("c{}", inner.next_id);
            // Recorded before the write so the completion can never race it.
            inner.pending.insert(id.clone(), PendingKind::Speak);
            Operation::Speak {
                id,
                text: text.to_string(),
                voice: voice.to_string(),
                speed,
                generation: inner.generation,
            }
        };
        if !self.send_operation(&op).await {
            if let Operation::Speak { id, .. } = &op {
                self.drop_undelivered(id).await;
            }
        }
    }

    /// Queue one pause operation. Fire and forget, like `enqueue_speak`.
    pub async fn enqueue_pause(&self, pause_ms: u64) {
        let op = {
            let mut inner = self.inner.lock().await;
            if !inner.can_send() {
                debug!(target: "speech_worker", "speech unavailable; pause dropped");
                return;
            }
            inner.next_id += 1;
            let id = format!("p{}", inner.next_id);
            inner.pending.insert(id.clone(), PendingKind::Pause);
            Operation::Pause {
                id,
                pause_ms,
                generation: inner.generation,
            }
        };
        if !self.send_operation(&op).await {
            if let Operation::Pause { id, .. } = &op {
                self.drop_undelivered(id).await;
            }
        }
    }

    /// Cancel queued work: bump the generation, forget every pending id and
    /// ask the worker to discard its queues. Local effects are immediate;
    /// the worker side is cooperative.
    pub async fn clear(&self) {
        let should_send = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.stats.clears += 1;
            let dropped = inner.pending.len();
            inner.pending.clear();
            debug!(
                target: "speech_worker",
                generation = inner.generation,
                dropped,
                "cleared queued speech"
            );
            inner.can_send()
        };
        if should_send {
            self.send_operation(&Operation::Clear).await;
        }
    }

    pub async fn state(&self) -> WorkerState {
        self.inner.lock().await.state
    }

    /// Current utterance-length target for the planner.
    pub async fn chunk_size(&self) -> usize {
        self.inner.lock().await.chunk_size
    }

    pub async fn stats(&self) -> SpeechStats {
        let inner = self.inner.lock().await;
        let mut stats = inner.stats.clone();
        stats.pending = inner.pending.len();
        stats.generation = inner.generation;
        stats.chunk_size = inner.chunk_size;
        stats.player = inner.player.clone();
        stats.model = inner.model.clone();
        stats
    }

    pub async fn reset_stats(&self) {
        self.inner.lock().await.stats = SpeechStats::default();
    }

    async fn drop_undelivered(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(id);
        warn!(target: "speech_worker", id = %id, "operation not delivered; dropped");
    }

    // Returns false when the line could not be written; the caller decides
    // what to unwind.
    async fn send_operation(&self, op: &Operation) -> bool {
        let line = match encode_line(op) {
            Ok(line) => line,
            Err(e) => {
                warn!(target: "speech_worker", error = %e, "failed to encode operation");
                return false;
            }
        };
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return false;
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(target: "speech_worker", error = %e, "failed to write to worker");
            return false;
        }
        if let Err(e) = writer.flush().await {
            warn!(target: "speech_worker", error = %e, "failed to flush worker pipe");
            return false;
        }
        true
    }
}

// Single consumer of the worker's stdout: reassemble lines, parse, dispatch.
async fn read_events(
    mut reader: impl AsyncRead + Unpin,
    inner: Arc<Mutex<Inner>>,
    writer: SharedWriter,
    notifier: Arc<dyn NotificationSink>,
) {
    let mut chunk = [0u8; READ_CHUNK];
    let mut lines = LineBuffer::new();
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(target: "speech_worker", error = %e, "worker stdout read failed");
                break;
            }
        };
        for line in lines.push(&chunk[..n]) {
            match serde_json::from_str::<WorkerEvent>(&line) {
                Ok(event) => handle_event(&inner, &writer, &notifier, event).await,
                Err(e) => {
                    if is_benign_noise(&line) {
                        debug!(target: "speech_worker", line = %line, "ignoring worker chatter");
                    } else {
                        let mut inner = inner.lock().await;
                        inner.stats.protocol_noise += 1;
                        warn!(
                            target: "speech_worker",
                            error = %e,
                            line = %line,
                            "unparseable worker line"
                        );
                    }
                }
            }
        }
    }
    debug!(target: "speech_worker", "worker stdout closed");
}

// Every inbound event goes through here, in arrival order. Events whose id
// is no longer pending are stale (cleared or already resolved) and are
// dropped without touching any state.
async fn handle_event(
    inner: &Arc<Mutex<Inner>>,
    writer: &SharedWriter,
    notifier: &Arc<dyn NotificationSink>,
    event: WorkerEvent,
) {
    let mut fatal_message: Option<String> = None;
    {
        let mut inner = inner.lock().await;
        match event {
            WorkerEvent::Ready { player, model } => {
                if inner.state != WorkerState::Starting {
                    debug!(target: "speech_worker", state = ?inner.state, "ready event ignored");
                } else {
                    if let Some(timer) = inner.ready_timer.take() {
                        timer.abort();
                    }
                    inner.state = WorkerState::Ready;
                    info!(
                        target: "speech_worker",
                        player = %player.as_deref().unwrap_or("unknown"),
                        model = %model.as_deref().unwrap_or("unknown"),
                        "worker ready"
                    );
                    inner.player = player;
                    inner.model = model;
                }
            }
            WorkerEvent::Ack { id } => {
                debug!(target: "speech_worker", id = %id, "operation accepted");
            }
            WorkerEvent::SynthDone { id, synth_ms } => {
                if inner.pending.contains_key(&id) {
                    debug!(target: "speech_worker", id = %id, synth_ms = ?synth_ms, "synthesis finished");
                } else {
                    debug!(target: "speech_worker", id = %id, "stale synth_done ignored");
                }
            }
            WorkerEvent::PlayDone {
                id,
                synth_ms,
                play_ms,
            } => {
                if inner.pending.remove(&id).is_none() {
                    debug!(target: "speech_worker", id = %id, "stale play_done ignored");
                } else {
                    inner.stats.chunks_spoken += 1;
                    if let Some(synth) = synth_ms {
                        inner.stats.total_synth_ms += synth.max(0.0) as u64;
                    }
                    if let Some(play) = play_ms {
                        inner.stats.total_play_ms += play.max(0.0) as u64;
                    }
                    if let (Some(synth), Some(play)) = (synth_ms, play_ms) {
                        let adjusted = adjust_chunk_size(inner.chunk_size, synth, play);
                        if adjusted != inner.chunk_size {
                            debug!(
                                target: "speech_worker",
                                from = inner.chunk_size,
                                to = adjusted,
                                "adjusted chunk size"
                            );
                            inner.chunk_size = adjusted;
                        }
                    }
                }
            }
            WorkerEvent::PauseDone { id, .. } => {
                if inner.pending.remove(&id).is_some() {
                    inner.stats.pauses_completed += 1;
                } else {
                    debug!(target: "speech_worker", id = %id, "stale pause_done ignored");
                }
            }
            WorkerEvent::Error { id, stage, message } => match id {
                Some(id) => {
                    if inner.pending.remove(&id).is_some() {
                        inner.stats.chunks_failed += 1;
                        warn!(
                            target: "speech_worker",
                            id = %id,
                            stage = %stage.as_deref().unwrap_or("unknown"),
                            message = %message.as_deref().unwrap_or(""),
                            "operation failed; pipeline continues"
                        );
                    } else {
                        debug!(target: "speech_worker", id = %id, "stale error ignored");
                    }
                }
                None => {
                    warn!(
                        target: "speech_worker",
                        stage = %stage.as_deref().unwrap_or("unknown"),
                        message = %message.as_deref().unwrap_or(""),
                        "worker reported an input error"
                    );
                }
            },
            WorkerEvent::Fatal { message } => {
                fatal_message =
                    Some(message.unwrap_or_else(|| "synthesis worker failed".to_string()));
            }
            WorkerEvent::Cleared { generation } => {
                debug!(
                    target: "speech_worker",
                    generation = ?generation,
                    "worker acknowledged clear"
                );
            }
        }
        if let Some(message) = &fatal_message {
            fail_worker_locked(&mut inner, message);
        }
    }
    if let Some(message) = fatal_message {
        *writer.lock().await = None;
        notifier.notify(format!("Speech disabled: {message}")).await;
    }
}

// Whole-worker teardown: pending work is gone, capability unavailable until
// an explicit new start. Caller drops the writer and notifies.
fn fail_worker_locked(inner: &mut Inner, message: &str) {
    let dropped = inner.pending.len();
    inner.pending.clear();
    inner.state = WorkerState::Failed;
    inner.stats.fatal_events += 1;
    if let Some(timer) = inner.ready_timer.take() {
        timer.abort();
    }
    if let Some(tx) = inner.kill_tx.take() {
        let _ = tx.send(());
    }
    warn!(
        target: "speech_worker",
        dropped,
        message = %message,
        "worker failed; speech unavailable until re-enabled"
    );
}

// Owns the child for its whole life: reaps an expected exit quietly, turns
// an unexpected one into a teardown, and kills on demand.
async fn watch_child(
    mut child: Child,
    inner: Arc<Mutex<Inner>>,
    writer: SharedWriter,
    notifier: Arc<dyn NotificationSink>,
    kill_rx: oneshot::Receiver<()>,
) {
    tokio::select! {
        status = child.wait() => {
            let status = match status {
                Ok(s) => s.to_string(),
                Err(e) => format!("wait failed: {e}"),
            };
            let expected = {
                let mut inner = inner.lock().await;
                let expected = matches!(inner.state, WorkerState::Stopped | WorkerState::Failed);
                if !expected {
                    fail_worker_locked(&mut inner, &format!("unexpected exit ({status})"));
                }
                expected
            };
            if expected {
                debug!(target: "speech_worker", status = %status, "worker exited");
            } else {
                *writer.lock().await = None;
                notifier
                    .notify(format!(
                        "Speech disabled: synthesis worker exited unexpectedly ({status})"
                    ))
                    .await;
            }
        }
        _ = kill_rx => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            debug!(target: "speech_worker", "worker process terminated");
        }
    }
}

fn spawn_stderr_drain(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                debug!(target: "speech_worker", stderr = %line, "worker stderr");
            }
        }
    })
}

// Grow above the band, shrink below it, hold inside.
fn adjust_chunk_size(current: usize, synth_ms: f64, play_ms: f64) -> usize {
    if play_ms <= 0.0 {
        return current;
    }
    let ratio = synth_ms / play_ms;
    if ratio > RATIO_HIGH {
        (current + CHUNK_STEP).min(CHUNK_MAX)
    } else if ratio < RATIO_LOW {
        current.saturating_sub(CHUNK_STEP).max(CHUNK_MIN)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_grows_when_synthesis_dominates() {
        assert_eq!(adjust_chunk_size(220, 300.0, 100.0), 260);
        assert_eq!(adjust_chunk_size(CHUNK_MAX, 300.0, 100.0), CHUNK_MAX);
    }

    #[test]
    fn chunk_size_shrinks_when_synthesis_is_cheap() {
        assert_eq!(adjust_chunk_size(220, 50.0, 500.0), 180);
        assert_eq!(adjust_chunk_size(CHUNK_MIN, 50.0, 500.0), CHUNK_MIN);
    }

    #[test]
    fn chunk_size_holds_inside_the_band() {
        assert_eq!(adjust_chunk_size(220, 100.0, 100.0), 220);
        assert_eq!(adjust_chunk_size(220, 100.0, 0.0), 220);
    }

    #[tokio::test]
    async fn fresh_supervisor_is_stopped() {
        let sup = WorkerSupervisor::new(WorkerConfig::default());
        assert_eq!(sup.state().await, WorkerState::Stopped);
        assert_eq!(sup.chunk_size().await, CHUNK_INITIAL);
        let stats = sup.stats().await;
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.generation, 0);
    }

    #[tokio::test]
    async fn clear_bumps_generation_even_while_stopped() {
        let sup = WorkerSupervisor::new(WorkerConfig::default());
        sup.clear().await;
        let stats = sup.stats().await;
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.clears, 1);
        assert_eq!(stats.pending, 0);
    }
}
