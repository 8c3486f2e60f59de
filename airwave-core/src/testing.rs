//! Fakes shared by the unit tests.

use crate::artwork::ImageLoader;
use crate::engine::{EngineSettings, StreamEngine};
use crate::error::CoreError;
use crate::provider::{ArtworkProvider, ArtworkQuery};
use crate::telemetry::{AudioLevels, BufferStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Configure,
    SetStreamUrl(String, bool),
    Start,
    Stop,
    Pause,
    Rewind(u32),
    FastForward(u32),
    EnableLevelMetering,
}

type StopHook = Arc<dyn Fn() + Send + Sync>;

pub struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
    on_stop: Mutex<Option<StopHook>>,
    fast_forward_allowed: AtomicBool,
    levels: Mutex<AudioLevels>,
    buffer: Mutex<BufferStatus>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            on_stop: Mutex::new(None),
            fast_forward_allowed: AtomicBool::new(true),
            levels: Mutex::new(AudioLevels::default()),
            buffer: Mutex::new(BufferStatus::default()),
        })
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn configure_count(&self) -> usize {
        self.count(&EngineCall::Configure)
    }

    pub fn set_fast_forward_allowed(&self, allowed: bool) {
        self.fast_forward_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn set_levels(&self, levels: AudioLevels) {
        *self.levels.lock() = levels;
    }

    pub fn set_buffer(&self, buffer: BufferStatus) {
        *self.buffer.lock() = buffer;
    }

    /// Run `hook` synchronously inside every `stop()`, like an engine that
    /// reports the stop from the calling thread
    pub fn on_stop(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_stop.lock() = Some(Arc::new(hook));
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

impl StreamEngine for FakeEngine {
    fn version(&self) -> String {
        "fake-1.0".to_string()
    }

    fn configure(&self, _settings: &EngineSettings) {
        self.record(EngineCall::Configure);
    }

    fn set_stream_url(&self, url: &str, is_file: bool) {
        self.record(EngineCall::SetStreamUrl(url.to_string(), is_file));
    }

    fn start(&self) {
        self.record(EngineCall::Start);
    }

    fn stop(&self) {
        self.record(EngineCall::Stop);
        let hook = self.on_stop.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn pause(&self) {
        self.record(EngineCall::Pause);
    }

    fn rewind(&self, seconds: u32) {
        self.record(EngineCall::Rewind(seconds));
    }

    fn fast_forward(&self, seconds: u32) {
        self.record(EngineCall::FastForward(seconds));
    }

    fn is_fast_forward_allowed(&self, _seconds: u32) -> bool {
        self.fast_forward_allowed.load(Ordering::SeqCst)
    }

    fn enable_level_metering(&self) {
        self.record(EngineCall::EnableLevelMetering);
    }

    fn current_levels(&self) -> AudioLevels {
        *self.levels.lock()
    }

    fn buffer_capacity(&self) -> usize {
        self.buffer.lock().capacity
    }

    fn buffer_used(&self) -> usize {
        self.buffer.lock().used
    }

    fn buffer_read_pointer(&self) -> usize {
        self.buffer.lock().read_pointer
    }

    fn buffer_byte_offset(&self) -> usize {
        self.buffer.lock().byte_offset
    }
}

/// Provider returning a fixed answer and recording queries
pub struct FixedProvider {
    pub answer: Result<Option<String>, String>,
    pub calls: Mutex<Vec<ArtworkQuery>>,
}

impl FixedProvider {
    pub fn returning(url: Option<&str>) -> Self {
        Self {
            answer: Ok(url.map(ToString::to_string)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Err("service unavailable".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArtworkProvider for FixedProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn lookup(&self, query: &ArtworkQuery) -> Result<Option<String>, CoreError> {
        self.calls.lock().push(query.clone());
        self.answer
            .clone()
            .map_err(|reason| CoreError::ArtworkLookupFailed {
                provider: "fixed".to_string(),
                reason,
            })
    }
}

/// Loader serving the URL bytes for any URL except those containing "broken"
#[derive(Default)]
pub struct FakeLoader {
    pub loads: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageLoader for FakeLoader {
    async fn load(&self, url: &str) -> Result<Arc<[u8]>, CoreError> {
        self.loads.lock().push(url.to_string());
        if url.contains("broken") {
            return Err(CoreError::ArtworkLookupFailed {
                provider: "image".to_string(),
                reason: "404".to_string(),
            });
        }
        Ok(Arc::from(url.as_bytes()))
    }
}
