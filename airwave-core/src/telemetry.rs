//! Periodic sampling of audio levels and buffer occupancy for visualizers.

use crate::engine::EngineHandle;
use crate::task::RepeatingTask;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

const LOG_TARGET: &str = "airwave::telemetry";

/// Default audio-level sampling period (about 15 Hz)
pub const DEFAULT_LEVEL_INTERVAL: Duration = Duration::from_millis(66);
/// Default buffer sampling period (5 Hz)
pub const DEFAULT_BUFFER_INTERVAL: Duration = Duration::from_millis(200);

/// Average and peak level per channel, 0.0 to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevels {
    pub average: [f32; 2],
    pub peak: [f32; 2],
}

impl AudioLevels {
    /// Bar heights in visualizer draw order: left avg, left peak, right avg, right peak
    #[must_use]
    pub const fn bars(&self) -> [f32; 4] {
        [self.average[0], self.peak[0], self.average[1], self.peak[1]]
    }
}

/// Engine buffer occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatus {
    pub capacity: usize,
    pub used: usize,
    pub read_pointer: usize,
    /// Bytes skipped ahead of the buffer start (file streams only)
    pub byte_offset: usize,
}

impl BufferStatus {
    /// Fraction of the buffer in use, 0.0 when capacity is unknown
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_ratio(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.used.min(self.capacity) as f32) / (self.capacity as f32)
    }
}

/// Latest telemetry values. Regenerated each tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub levels: AudioLevels,
    pub buffer: BufferStatus,
}

/// Two periodic jobs polling the engine while a session is active.
pub struct TelemetrySampler {
    engine: Arc<EngineHandle>,
    metering_enabled: Arc<AtomicBool>,
    level_interval: Duration,
    buffer_interval: Duration,
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    level_task: Option<RepeatingTask>,
    buffer_task: Option<RepeatingTask>,
}

impl TelemetrySampler {
    /// Create a stopped sampler
    #[must_use]
    pub fn new(
        engine: Arc<EngineHandle>,
        metering_enabled: Arc<AtomicBool>,
        level_interval: Duration,
        buffer_interval: Duration,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(TelemetrySnapshot::default());
        Self {
            engine,
            metering_enabled,
            level_interval,
            buffer_interval,
            snapshot_tx,
            level_task: None,
            buffer_task: None,
        }
    }

    /// Subscribe to telemetry snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Latest published snapshot
    #[must_use]
    pub fn latest(&self) -> TelemetrySnapshot {
        *self.snapshot_tx.borrow()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.level_task.is_some() || self.buffer_task.is_some()
    }

    /// Start both samplers. Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        debug!(
            target: LOG_TARGET,
            "Starting telemetry samplers (levels: {:?}, buffer: {:?})",
            self.level_interval, self.buffer_interval
        );

        let engine = Arc::clone(&self.engine);
        let metering = Arc::clone(&self.metering_enabled);
        let tx = self.snapshot_tx.clone();
        self.level_task = Some(RepeatingTask::spawn(self.level_interval, move || {
            let levels = if metering.load(Ordering::Acquire) {
                engine.engine().current_levels()
            } else {
                AudioLevels::default()
            };
            tx.send_modify(|snapshot| snapshot.levels = levels);
        }));

        let engine = Arc::clone(&self.engine);
        let tx = self.snapshot_tx.clone();
        self.buffer_task = Some(RepeatingTask::spawn(self.buffer_interval, move || {
            let source = engine.engine();
            let buffer = BufferStatus {
                capacity: source.buffer_capacity(),
                used: source.buffer_used(),
                read_pointer: source.buffer_read_pointer(),
                byte_offset: source.buffer_byte_offset(),
            };
            tx.send_modify(|snapshot| snapshot.buffer = buffer);
        }));
    }

    /// Stop both samplers synchronously. Safe to call when already stopped.
    pub fn stop(&mut self) {
        let was_running = self.is_running();
        if let Some(task) = self.level_task.take() {
            task.cancel();
        }
        if let Some(task) = self.buffer_task.take() {
            task.cancel();
        }
        if was_running {
            debug!(target: LOG_TARGET, "Telemetry samplers stopped");
        }
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.stop();
    }
}
