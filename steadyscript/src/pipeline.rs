//! Task wiring (spec.md §5): capture thread, 30 Hz pipeline tick, the
//! broadcast bus client tasks subscribe to, the persistence task, and the
//! LED task.
//!
//! Grounded on the teacher's `frame_process_task` (in `strand-cam`): a
//! dedicated capture thread feeding a "latest wins" channel into an async
//! tick loop that fans out to client tasks over a broadcast channel, with
//! a separate bounded channel absorbing slower consumers (persistence)
//! without blocking capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::Config;
use crate::detector;
use crate::frame::{Frame, FrameSource};
use crate::led::LedGateway;
use crate::overlay;
use crate::session::{
    ClientCommand, FeedbackStatus, Mode, SessionController, SessionRecord, SessionState,
    StabilityLevel,
};
use crate::store::SessionStore;

/// Live metrics snapshot broadcast once per tick (spec.md §4.6 `metrics`
/// message, §6 `/tracking_data`).
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub mode: Mode,
    pub position: Option<(f64, f64)>,
    pub marker_detected: bool,
    pub jitter: f64,
    pub p95_jitter: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lateral_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_lateral_jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability_level: Option<StabilityLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_status: Option<FeedbackStatus>,
    pub score: f64,
    pub session_state: SessionState,
    pub time_remaining: f64,
    pub elapsed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat_count: Option<u32>,
}

/// One item on the broadcast bus every client task subscribes to.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Encoded HUD-overlaid JPEG for this tick (also served by
    /// `/video_feed`). Carried as `Arc<Vec<u8>>` so fan-out to N client
    /// tasks is a refcount bump, not a copy.
    Frame(Arc<Vec<u8>>),
    Metrics(Arc<MetricsSnapshot>),
    SessionComplete(Arc<SessionRecord>),
    /// A failure surfaced to every connected client (spec.md §7
    /// `PersistenceFailure`: "surface an `error` to all clients" once the
    /// 3 retry attempts are exhausted).
    Error(String),
}

/// One queued control command plus an optional reply channel. The reply
/// carries `apply_command`'s `Result` back to whichever caller enqueued
/// the command (a duplex client or an HTTP handler), so an
/// [`crate::error::Error::InvalidControl`] rejection can be reported to
/// that caller specifically (spec.md §7 "Reply with `error` message on
/// the duplex channel; state unchanged") rather than only logged.
pub struct QueuedCommand {
    pub cmd: ClientCommand,
    pub reply: Option<oneshot::Sender<std::result::Result<(), String>>>,
}

/// Shared handle client tasks and HTTP handlers use to talk to the
/// pipeline task (spec.md §5 "Shared mutable state ... owned by the
/// pipeline task").
pub struct PipelineHandle {
    pub events: broadcast::Sender<PipelineEvent>,
    pub commands: mpsc::UnboundedSender<QueuedCommand>,
    pub latest_metrics: Arc<RwLock<Option<Arc<MetricsSnapshot>>>>,
    pub latest_frame: Arc<RwLock<Option<Arc<Vec<u8>>>>>,
    pub store: Arc<SessionStore>,
}

impl PipelineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Enqueues a command and waits for the pipeline tick to apply it,
    /// returning the rejection reason (if any) so the caller can surface
    /// it back to whoever issued the command.
    pub async fn dispatch_command(&self, cmd: ClientCommand) -> std::result::Result<(), String> {
        let (reply, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(QueuedCommand { cmd, reply: Some(reply) })
            .is_err()
        {
            return Err("pipeline task has shut down".to_string());
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Err("pipeline task dropped the reply".to_string()))
    }
}

const TICK_PERIOD: Duration = Duration::from_millis(1000 / crate::frame::TARGET_FPS as u64);
const PERSISTENCE_QUEUE_DEPTH: usize = 8;

/// Spawns the dedicated capture thread (spec.md §5 task 1). Publishes
/// "latest frame wins" into a watch channel: if the pipeline tick is slow,
/// intermediate frames are silently discarded, never queued.
pub fn spawn_capture_thread(
    mut source: Box<dyn FrameSource>,
) -> watch::Receiver<Option<Arc<Frame>>> {
    let (tx, rx) = watch::channel(None);
    std::thread::spawn(move || loop {
        match source.read() {
            Ok(frame) => {
                let _ = tx.send(Some(Arc::new(frame)));
            }
            Err(e) => {
                tracing::warn!("capture thread: {e}");
            }
        }
    });
    rx
}

/// Spawns the persistence task (spec.md §5 task 4, §4.7). Bounded at
/// [`PERSISTENCE_QUEUE_DEPTH`]; a full queue blocks the sender (the
/// pipeline tick), per spec.md §5 "safer than losing a completed
/// session".
pub fn spawn_persistence_task(
    store: Arc<SessionStore>,
    events: broadcast::Sender<PipelineEvent>,
) -> mpsc::Sender<SessionRecord> {
    let (tx, mut rx) = mpsc::channel::<SessionRecord>(PERSISTENCE_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let store = store.clone();
            let record_for_retry = record.clone();
            let result = tokio::task::spawn_blocking(move || store.append(&record_for_retry))
                .await
                .expect("persistence task panicked");

            let mut attempt = 1;
            let mut outcome = result;
            while outcome.is_err() && attempt < 3 {
                tracing::warn!("persistence attempt {attempt} failed: {:?}", outcome.as_ref().err());
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                let store = store.clone();
                let record_for_retry = record.clone();
                outcome = tokio::task::spawn_blocking(move || store.append(&record_for_retry))
                    .await
                    .expect("persistence task panicked");
                attempt += 1;
            }
            if let Err(e) = outcome {
                tracing::error!("persistence failed after {attempt} attempts: {e}");
                let _ = events.send(PipelineEvent::Error(format!(
                    "persistence failed after {attempt} attempts: {e}"
                )));
            }
        }
    });
    tx
}

/// Spawns the LED task (spec.md §5 task 5): receives coalesced boolean
/// updates and forwards them to the gateway.
pub fn spawn_led_task(mut gateway: Box<dyn LedGateway>) -> mpsc::UnboundedSender<bool> {
    let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
    tokio::spawn(async move {
        while let Some(inside) = rx.recv().await {
            gateway.set_inside(inside);
        }
    });
    tx
}

/// Runs the pipeline tick task (spec.md §5 task 2) until the process
/// exits. Drains pending commands, runs C2 -> C3 -> C4 -> C5, and
/// publishes the result to the broadcast bus.
pub async fn run_tick_loop(
    config: Config,
    mut frame_rx: watch::Receiver<Option<Arc<Frame>>>,
    mut command_rx: mpsc::UnboundedReceiver<QueuedCommand>,
    handle: Arc<PipelineHandle>,
    persistence_tx: mpsc::Sender<SessionRecord>,
    led_tx: mpsc::UnboundedSender<bool>,
) {
    let mut controller = SessionController::new(
        config.initial_hsv(),
        crate::frame::DEFAULT_WIDTH,
        crate::frame::DEFAULT_HEIGHT,
    );
    let clock_start = Instant::now();
    let mut ticker = tokio::time::interval(TICK_PERIOD);
    let mut last_led: Option<bool> = None;

    loop {
        ticker.tick().await;

        while let Ok(queued) = command_rx.try_recv() {
            let QueuedCommand { cmd, reply } = queued;
            let outcome = controller.apply_command(cmd).map_err(|e| {
                tracing::debug!("command rejected: {e}");
                e.to_string()
            });
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
        }

        let frame = match frame_rx.borrow_and_update().clone() {
            Some(f) => f,
            None => continue,
        };

        let observation = detector::detect(frame.as_ref(), &controller.hsv());
        let now = clock_start.elapsed().as_secs_f64();
        let outcome = controller.tick(now, observation);

        if let Mode::Hold = outcome.mode {
            if let Some(inside) = outcome.inside_circle {
                if last_led != Some(inside) {
                    last_led = Some(inside);
                    let _ = led_tx.send(inside);
                }
            }
        }

        let calibration = controller
            .calibration()
            .map(|c| (c.center.0, c.center.1, c.radius));
        let jpeg = overlay::render_and_encode(frame.as_ref(), &outcome, calibration, true, None);
        let jpeg = Arc::new(jpeg);

        let metrics = Arc::new(MetricsSnapshot {
            mode: outcome.mode,
            position: outcome.position,
            marker_detected: outcome.marker_detected,
            jitter: outcome.jitter,
            p95_jitter: outcome.p95_jitter,
            lateral_jitter: outcome.lateral_jitter,
            p95_lateral_jitter: outcome.p95_lateral_jitter,
            stability_level: outcome.stability_level,
            feedback_status: outcome.feedback_status,
            score: outcome.score,
            session_state: outcome.state,
            time_remaining: outcome.time_remaining,
            elapsed: outcome.elapsed,
            bpm: outcome.bpm,
            beat_count: outcome.beat_count,
        });

        *handle.latest_frame.write() = Some(jpeg.clone());
        *handle.latest_metrics.write() = Some(metrics.clone());

        let _ = handle.events.send(PipelineEvent::Frame(jpeg));
        let _ = handle.events.send(PipelineEvent::Metrics(metrics));

        if let Some(record) = outcome.completed {
            let record = Arc::new(record);
            let _ = handle.events.send(PipelineEvent::SessionComplete(record.clone()));
            if persistence_tx.send((*record).clone()).await.is_err() {
                tracing::error!("persistence task has shut down, session lost: {:?}", record);
            }
        }
    }
}
