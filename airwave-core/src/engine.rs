//! Streaming engine interface and the process-scoped engine handle.
//!
//! The engine itself (network I/O, buffering, decoding, metering) is an
//! external component. The core drives it through [`StreamEngine`] and
//! receives its callbacks through [`EngineHandle::dispatch`], which may be
//! called from any thread.

use crate::session::Inbound;
use crate::telemetry::{AudioLevels, BufferStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

const LOG_TARGET: &str = "airwave::engine";

/// One-time engine setup applied before the first stream is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// License key pair, if the engine requires one
    pub license_keys: Option<(u32, u32)>,
    /// Seconds the engine waits for its buffer to fill before playing
    pub buffer_wait_secs: u32,
    /// Seconds without data before the engine gives up on a connection
    pub data_timeout_secs: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            license_keys: None,
            buffer_wait_secs: 15,
            data_timeout_secs: 10,
        }
    }
}

/// Control and telemetry surface of the streaming engine.
///
/// Every method must return promptly; outcomes of `start`, `stop` and
/// `pause` arrive later as [`EngineEvent`]s.
pub trait StreamEngine: Send + Sync {
    /// Engine version string, logged once at initialization
    fn version(&self) -> String {
        "unknown".to_string()
    }

    /// Apply one-time settings
    fn configure(&self, settings: &EngineSettings);

    fn set_stream_url(&self, url: &str, is_file: bool);
    fn start(&self);
    fn stop(&self);
    fn pause(&self);

    /// Jump back `seconds` within the buffered stream
    fn rewind(&self, seconds: u32);
    /// Jump forward `seconds` within the buffered stream
    fn fast_forward(&self, seconds: u32);
    /// Whether enough buffered audio exists ahead of the read position
    fn is_fast_forward_allowed(&self, seconds: u32) -> bool;

    /// Must be called before levels are meaningful
    fn enable_level_metering(&self);
    fn current_levels(&self) -> AudioLevels;

    fn buffer_capacity(&self) -> usize;
    fn buffer_used(&self) -> usize;
    fn buffer_read_pointer(&self) -> usize;
    fn buffer_byte_offset(&self) -> usize;
}

/// Callback surface of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Connecting,
    Buffering,
    PlayStarted,
    PlayStopped,
    PlayPaused,
    NoNetwork,
    MetadataChanged(String),
    FatalError(String),
}

impl EngineEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Buffering => "buffering",
            Self::PlayStarted => "play_started",
            Self::PlayStopped => "play_stopped",
            Self::PlayPaused => "play_paused",
            Self::NoNetwork => "no_network",
            Self::MetadataChanged(_) => "metadata_changed",
            Self::FatalError(_) => "fatal_error",
        }
    }
}

/// The session currently observing the engine.
#[derive(Debug, Clone)]
pub struct EngineBinding {
    session_id: u64,
    epoch: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EngineBinding {
    pub(crate) const fn new(
        session_id: u64,
        epoch: Arc<AtomicU64>,
        tx: mpsc::UnboundedSender<Inbound>,
    ) -> Self {
        Self {
            session_id,
            epoch,
            tx,
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> u64 {
        self.session_id
    }
}

/// Process-scoped handle shared by every session.
///
/// Holds the engine, guards its one-time initialization, and routes engine
/// callbacks to the single bound session.
pub struct EngineHandle {
    engine: Arc<dyn StreamEngine>,
    initialized: AtomicBool,
    binding: Mutex<Option<EngineBinding>>,
}

impl EngineHandle {
    /// Wrap an engine in a shareable handle
    pub fn new(engine: Arc<dyn StreamEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            initialized: AtomicBool::new(false),
            binding: Mutex::new(None),
        })
    }

    /// Access the underlying engine
    #[must_use]
    pub fn engine(&self) -> &dyn StreamEngine {
        self.engine.as_ref()
    }

    /// Apply one-time settings.
    ///
    /// Returns `true` if this call performed the initialization and `false`
    /// if the engine was already initialized.
    pub fn initialize(&self, settings: &EngineSettings) -> bool {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(target: LOG_TARGET, "Engine already initialized");
            return false;
        }

        self.engine.configure(settings);
        info!(
            target: LOG_TARGET,
            "Initialized streaming engine {} (buffer wait: {}s, data timeout: {}s)",
            self.engine.version(),
            settings.buffer_wait_secs,
            settings.data_timeout_secs
        );
        true
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Bind a session as the engine observer, replacing any previous binding.
    ///
    /// Returns the binding that was replaced.
    pub fn bind(&self, binding: EngineBinding) -> Option<EngineBinding> {
        let session_id = binding.session_id;
        let previous = self.binding.lock().replace(binding);
        if let Some(ref prev) = previous {
            info!(
                target: LOG_TARGET,
                "Engine observer rebound from session {} to session {}",
                prev.session_id, session_id
            );
        }
        previous
    }

    /// Remove the binding if it still belongs to `session_id`.
    ///
    /// Returns `true` if a binding was removed.
    pub fn unbind(&self, session_id: u64) -> bool {
        let mut slot = self.binding.lock();
        if slot.as_ref().is_some_and(|b| b.session_id == session_id) {
            *slot = None;
            debug!(target: LOG_TARGET, "Session {} detached from engine", session_id);
            true
        } else {
            false
        }
    }

    /// Id of the session currently bound, if any
    #[must_use]
    pub fn bound_session(&self) -> Option<u64> {
        self.binding.lock().as_ref().map(EngineBinding::session_id)
    }

    /// Deliver an engine callback to the bound session.
    ///
    /// Safe to call from any thread. The event is tagged with the station
    /// epoch current at dispatch time so the session can discard events that
    /// belong to a stream it has already replaced. Returns `false` if no
    /// session is listening.
    pub fn dispatch(&self, event: EngineEvent) -> bool {
        let slot = self.binding.lock();
        let Some(binding) = slot.as_ref() else {
            debug!(target: LOG_TARGET, "Dropping engine event {} with no bound session", event.name());
            return false;
        };

        let epoch = binding.epoch.load(Ordering::Acquire);
        binding.tx.send(Inbound::Engine { epoch, event }).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    fn binding(session_id: u64, epoch: u64) -> (EngineBinding, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EngineBinding::new(session_id, Arc::new(AtomicU64::new(epoch)), tx),
            rx,
        )
    }

    #[test]
    fn test_initialize_once() {
        let engine = FakeEngine::new();
        let handle = EngineHandle::new(engine.clone());

        assert!(handle.initialize(&EngineSettings::default()));
        assert!(!handle.initialize(&EngineSettings::default()));
        assert!(handle.is_initialized());
        assert_eq!(engine.configure_count(), 1);
    }

    #[test]
    fn test_dispatch_without_binding() {
        let handle = EngineHandle::new(FakeEngine::new());
        assert!(!handle.dispatch(EngineEvent::Buffering));
    }

    #[test]
    fn test_dispatch_tags_current_epoch() {
        let handle = EngineHandle::new(FakeEngine::new());
        let (b, mut rx) = binding(1, 7);
        let epoch = Arc::clone(&b.epoch);
        handle.bind(b);

        assert!(handle.dispatch(EngineEvent::Buffering));
        epoch.store(8, Ordering::Release);
        assert!(handle.dispatch(EngineEvent::PlayStarted));

        match rx.try_recv().unwrap() {
            Inbound::Engine { epoch, event } => {
                assert_eq!(epoch, 7);
                assert_eq!(event, EngineEvent::Buffering);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            Inbound::Engine { epoch, .. } => assert_eq!(epoch, 8),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_rebind_replaces_previous() {
        let handle = EngineHandle::new(FakeEngine::new());
        let (first, mut first_rx) = binding(1, 0);
        let (second, mut second_rx) = binding(2, 0);

        assert!(handle.bind(first).is_none());
        let replaced = handle.bind(second).unwrap();
        assert_eq!(replaced.session_id(), 1);
        assert_eq!(handle.bound_session(), Some(2));

        handle.dispatch(EngineEvent::Connecting);
        assert!(first_rx.try_recv().is_err());
        assert!(second_rx.try_recv().is_ok());
    }

    #[test]
    fn test_unbind_only_own_binding() {
        let handle = EngineHandle::new(FakeEngine::new());
        let (b, _rx) = binding(2, 0);
        handle.bind(b);

        assert!(!handle.unbind(1));
        assert_eq!(handle.bound_session(), Some(2));
        assert!(handle.unbind(2));
        assert_eq!(handle.bound_session(), None);
    }
}
