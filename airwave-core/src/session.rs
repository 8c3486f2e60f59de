//! Playback session state machine.
//!
//! A [`PlaybackSession`] owns the active station, its track and every
//! periodic job. It is mutated only from the control loop
//! ([`SessionRunner`](crate::runner::SessionRunner)), which feeds it
//! [`Inbound`] messages in arrival order: UI commands, engine callbacks,
//! seek-repeat ticks and artwork results.

use crate::artwork::{ArtworkResolver, ResolvedArtwork};
use crate::engine::{EngineBinding, EngineEvent, EngineHandle, EngineSettings};
use crate::error::{CoreError, Result};
use crate::metadata;
use crate::provider::ArtworkQuery;
use crate::state::{
    Controls, PlaybackState, ResumeState, SeekDirection, StopReason, BUFFERING_MESSAGE,
    CONNECTING_MESSAGE, LOADING_MESSAGE, PAUSED_MESSAGE,
};
use crate::station::Station;
use crate::task::RepeatingTask;
use crate::telemetry::{
    TelemetrySampler, TelemetrySnapshot, DEFAULT_BUFFER_INTERVAL, DEFAULT_LEVEL_INTERVAL,
};
use crate::track::Track;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const LOG_TARGET: &str = "airwave::session";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Commands issued by the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectStation(Station),
    Play,
    Pause,
    RewindHeld,
    RewindReleased,
    FastForwardHeld,
    FastForwardReleased,
    /// Re-resolve the current artwork, e.g. when the app returns to the foreground
    RefreshArtwork,
    Teardown,
}

/// Everything the control loop consumes
#[derive(Debug)]
pub enum Inbound {
    Command(Command),
    /// Engine callback tagged with the station epoch at dispatch time
    Engine { epoch: u64, event: EngineEvent },
    SeekTick { seek_id: u64 },
    Artwork {
        epoch: u64,
        request_id: u64,
        artwork: ResolvedArtwork,
    },
}

/// Notifications for UI collaborators
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged { state: PlaybackState },
    /// Text shown in place of the track, `None` when the track is shown again
    StatusMessage { message: Option<String> },
    /// New song metadata
    TrackChanged { track: Track },
    ArtworkChanged { track: Track },
    /// `Track::is_playing` flipped
    PlayingToggled { track: Track },
    ControlsChanged { controls: Controls },
    /// Artwork network request started or finished
    NetworkActivity { active: bool },
    /// Playback ended; announced once per stop
    Stopped { reason: StopReason },
}

/// Labels for the now-playing view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingDisplay {
    /// Song line: track title or status message
    pub primary: String,
    /// Artist line: artist, or the station name while a status is shown
    pub secondary: String,
    /// Station description, shown while no artwork is loaded
    pub description: Option<String>,
}

/// Read-only view of the session, republished after every change
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub station: Option<Station>,
    pub track: Track,
    pub controls: Controls,
    pub status: Option<String>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn display(&self) -> NowPlayingDisplay {
        let station_name = self
            .station
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default();

        let (primary, secondary) = match &self.status {
            Some(message) => (message.clone(), station_name),
            None => (self.track.title.clone(), self.track.artist.clone()),
        };

        let description = if self.track.artwork_loaded {
            None
        } else {
            self.station.as_ref().map(|s| s.description.clone())
        };

        NowPlayingDisplay {
            primary,
            secondary,
            description,
        }
    }
}

/// Timing knobs for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Applied to the engine by the first session only
    pub engine: EngineSettings,
    /// Seconds per rewind/fast-forward step
    pub skip_secs: u32,
    /// Repeat period while a seek control is held
    pub seek_repeat: Duration,
    pub level_interval: Duration,
    pub buffer_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            skip_secs: 10,
            seek_repeat: Duration::from_millis(300),
            level_interval: DEFAULT_LEVEL_INTERVAL,
            buffer_interval: DEFAULT_BUFFER_INTERVAL,
        }
    }
}

enum ArtworkRequest {
    /// Provider lookup for new metadata
    Lookup(ArtworkQuery),
    /// Direct resolution of a known URL or bundled name
    Current(String),
}

/// The playback state machine for one station at a time
pub struct PlaybackSession {
    id: u64,
    engine: Arc<EngineHandle>,
    resolver: Arc<ArtworkResolver>,
    settings: SessionSettings,

    state: PlaybackState,
    station: Option<Station>,
    track: Track,
    controls: Controls,
    status: Option<String>,

    epoch: Arc<AtomicU64>,
    metering_enabled: Arc<AtomicBool>,
    sampler: TelemetrySampler,
    seek_task: Option<RepeatingTask>,
    seek_id: u64,
    artwork_task: Option<JoinHandle<()>>,
    artwork_request: u64,
    torn_down: bool,

    inbound_tx: mpsc::UnboundedSender<Inbound>,
    event_tx: broadcast::Sender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl PlaybackSession {
    /// Create a session and bind it as the engine's observer, replacing any
    /// previously bound session.
    ///
    /// Returns the receiving end of the session's inbound queue, to be
    /// drained by the control loop.
    #[must_use]
    pub fn new(
        engine: Arc<EngineHandle>,
        resolver: Arc<ArtworkResolver>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(64);
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let epoch = Arc::new(AtomicU64::new(0));
        let metering_enabled = Arc::new(AtomicBool::new(false));

        let sampler = TelemetrySampler::new(
            Arc::clone(&engine),
            Arc::clone(&metering_enabled),
            settings.level_interval,
            settings.buffer_interval,
        );

        engine.initialize(&settings.engine);
        engine.bind(EngineBinding::new(id, Arc::clone(&epoch), inbound_tx.clone()));
        info!(target: LOG_TARGET, "Playback session {} bound to engine", id);

        let session = Self {
            id,
            engine,
            resolver,
            settings,
            state: PlaybackState::Idle,
            station: None,
            track: Track::default(),
            controls: Controls::for_state(&PlaybackState::Idle, false),
            status: None,
            epoch,
            metering_enabled,
            sampler,
            seek_task: None,
            seek_id: 0,
            artwork_task: None,
            artwork_request: 0,
            torn_down: false,
            inbound_tx,
            event_tx,
            snapshot_tx,
        };
        session.publish();
        (session, inbound_rx)
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    #[must_use]
    pub const fn track(&self) -> &Track {
        &self.track
    }

    #[must_use]
    pub const fn station(&self) -> Option<&Station> {
        self.station.as_ref()
    }

    #[must_use]
    pub const fn controls(&self) -> Controls {
        self.controls
    }

    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Whether a seek-repeat timer is live
    #[must_use]
    pub const fn is_seek_timer_running(&self) -> bool {
        self.seek_task.is_some()
    }

    #[must_use]
    pub const fn is_sampling(&self) -> bool {
        self.sampler.is_running()
    }

    /// Subscribe to session notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.event_tx.clone()
    }

    /// Watch the read-only snapshot
    #[must_use]
    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Watch telemetry published by the samplers
    #[must_use]
    pub fn watch_telemetry(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.sampler.subscribe()
    }

    /// Sender feeding this session's inbound queue
    #[must_use]
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<Inbound> {
        self.inbound_tx.clone()
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            station: self.station.clone(),
            track: self.track.clone(),
            controls: self.controls,
            status: self.status.clone(),
        }
    }

    /// Apply one inbound message. Ignored after teardown.
    pub fn handle(&mut self, message: Inbound) {
        if self.torn_down {
            debug!(target: LOG_TARGET, "Session {} ignoring {:?} after teardown", self.id, message);
            return;
        }

        match message {
            Inbound::Command(command) => {
                if let Err(e) = self.apply(command) {
                    debug!(target: LOG_TARGET, "Command rejected: {}", e);
                }
            }
            Inbound::Engine { epoch, event } => {
                if epoch == self.current_epoch() {
                    self.on_engine_event(event);
                } else {
                    debug!(
                        target: LOG_TARGET,
                        "Discarding stale engine event {} (epoch {}, current {})",
                        event.name(),
                        epoch,
                        self.current_epoch()
                    );
                }
            }
            Inbound::SeekTick { seek_id } => self.on_seek_tick(seek_id),
            Inbound::Artwork {
                epoch,
                request_id,
                artwork,
            } => self.on_artwork_resolved(epoch, request_id, artwork),
        }

        if !self.torn_down {
            self.publish();
        }
    }

    /// Apply a UI command.
    ///
    /// # Errors
    ///
    /// Returns `NoStationSelected` for `Play` before any station was chosen,
    /// `SeekRejected` when a seek cannot start, and `SessionClosed` after
    /// teardown.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        if self.torn_down {
            return Err(CoreError::SessionClosed);
        }
        match command {
            Command::SelectStation(station) => {
                self.select_station(station);
                Ok(())
            }
            Command::Play => self.play(),
            Command::Pause => {
                self.pause();
                Ok(())
            }
            Command::RewindHeld => self.seek_held(SeekDirection::Back),
            Command::FastForwardHeld => self.seek_held(SeekDirection::Forward),
            Command::RewindReleased => {
                self.seek_released(SeekDirection::Back);
                Ok(())
            }
            Command::FastForwardReleased => {
                self.seek_released(SeekDirection::Forward);
                Ok(())
            }
            Command::RefreshArtwork => {
                self.refresh_artwork();
                Ok(())
            }
            Command::Teardown => {
                self.teardown();
                Ok(())
            }
        }
    }

    /// Replace the active station and start streaming it.
    ///
    /// Periodic jobs are cancelled before the engine is touched, so nothing
    /// scheduled for the old station can run afterwards.
    pub fn select_station(&mut self, station: Station) {
        self.cancel_jobs();
        self.abort_artwork();

        // Callbacks raised while stopping the old stream keep the old epoch
        let engine = self.engine.engine();
        engine.stop();
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        info!(
            target: LOG_TARGET,
            "Selecting station {} ({}) [epoch {}]", station.name, station.stream_url, epoch
        );

        self.track = Track::for_station(&station);
        self.metering_enabled.store(false, Ordering::Release);
        engine.set_stream_url(&station.stream_url, station.is_file_stream());
        engine.start();
        self.station = Some(station);

        self.set_state(PlaybackState::Connecting);
        self.set_status(Some(LOADING_MESSAGE));
        self.sampler.start();

        let current = self.track.artwork_url.clone();
        self.request_artwork(ArtworkRequest::Current(current));
    }

    /// Resume or restart the stream. No-op while already playing.
    ///
    /// # Errors
    ///
    /// Returns `NoStationSelected` if no station has been selected.
    pub fn play(&mut self) -> Result<()> {
        if self.station.is_none() {
            return Err(CoreError::NoStationSelected);
        }
        if self.state.is_playing() {
            debug!(target: LOG_TARGET, "Play ignored while {}", self.state);
            return Ok(());
        }

        self.metering_enabled.store(false, Ordering::Release);
        self.engine.engine().start();
        self.sampler.start();
        self.set_state(PlaybackState::Connecting);
        self.set_status(None);
        Ok(())
    }

    /// Pause the stream. No-op while paused, stopped or idle.
    pub fn pause(&mut self) {
        if matches!(
            self.state,
            PlaybackState::Paused | PlaybackState::Stopped(_) | PlaybackState::Idle
        ) {
            debug!(target: LOG_TARGET, "Pause ignored while {}", self.state);
            return;
        }

        self.cancel_seek();
        self.engine.engine().pause();
        self.set_state(PlaybackState::Paused);
        self.set_status(Some(PAUSED_MESSAGE));
    }

    /// # Errors
    ///
    /// Returns `SeekRejected` unless playing or paused.
    pub fn rewind_held(&mut self) -> Result<()> {
        self.seek_held(SeekDirection::Back)
    }

    pub fn rewind_released(&mut self) {
        self.seek_released(SeekDirection::Back);
    }

    /// # Errors
    ///
    /// Returns `SeekRejected` if the engine has no forward buffer for one step
    /// or playback is not in a seekable state.
    pub fn fast_forward_held(&mut self) -> Result<()> {
        self.seek_held(SeekDirection::Forward)
    }

    pub fn fast_forward_released(&mut self) {
        self.seek_released(SeekDirection::Forward);
    }

    /// Re-resolve the artwork currently attached to the track
    pub fn refresh_artwork(&mut self) {
        if self.station.is_none() {
            return;
        }
        let current = self.track.artwork_url.clone();
        self.request_artwork(ArtworkRequest::Current(current));
    }

    /// Detach from the engine and cancel every job. Idempotent.
    ///
    /// The engine keeps streaming; only this session stops observing it.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.cancel_jobs();
        self.abort_artwork();
        self.engine.unbind(self.id);
        self.torn_down = true;
        info!(target: LOG_TARGET, "Playback session {} torn down", self.id);
    }

    /// Engine callback dispatch table
    pub fn on_engine_event(&mut self, event: EngineEvent) {
        debug!(target: LOG_TARGET, "Engine event: {} (state: {})", event.name(), self.state);

        match event {
            EngineEvent::Connecting => {
                self.cancel_seek();
                self.resume_sampling();
                self.set_state(PlaybackState::Connecting);
                self.set_status(Some(CONNECTING_MESSAGE));
            }
            EngineEvent::Buffering => {
                self.cancel_seek();
                self.resume_sampling();
                self.set_state(PlaybackState::Buffering);
                self.set_status(Some(BUFFERING_MESSAGE));
            }
            EngineEvent::PlayStarted => {
                self.resume_sampling();
                if !self.metering_enabled.swap(true, Ordering::AcqRel) {
                    self.engine.engine().enable_level_metering();
                }
                if let PlaybackState::Seeking { direction, .. } = self.state {
                    self.set_state(PlaybackState::Seeking {
                        direction,
                        resume: ResumeState::Playing,
                    });
                } else {
                    self.set_state(PlaybackState::Playing);
                }
                self.set_status(None);
            }
            EngineEvent::PlayPaused => {
                if let PlaybackState::Seeking { direction, .. } = self.state {
                    self.set_state(PlaybackState::Seeking {
                        direction,
                        resume: ResumeState::Paused,
                    });
                } else {
                    self.set_state(PlaybackState::Paused);
                }
                self.set_status(Some(PAUSED_MESSAGE));
            }
            EngineEvent::PlayStopped => self.enter_stopped(StopReason::Stopped),
            EngineEvent::NoNetwork => self.enter_stopped(StopReason::NoNetwork),
            EngineEvent::FatalError(reason) => {
                error!(target: LOG_TARGET, "Streaming engine fatal error: {}", reason);
                self.enter_stopped(StopReason::Fatal(reason));
            }
            EngineEvent::MetadataChanged(raw) => self.on_metadata_changed(&raw),
        }
    }

    /// Parse new stream metadata and refresh artwork when the title changes
    pub fn on_metadata_changed(&mut self, raw: &str) {
        let Some(station) = self.station.as_ref() else {
            debug!(target: LOG_TARGET, "Metadata without a station: {}", raw);
            return;
        };

        let parsed = metadata::parse_for_station(raw, station);
        if !self.track.apply_metadata(parsed) {
            debug!(target: LOG_TARGET, "Duplicate metadata ignored: {}", raw);
            return;
        }

        info!(
            target: LOG_TARGET,
            "Metadata artist: {} | title: {}", self.track.artist, self.track.title
        );
        self.emit(SessionEvent::TrackChanged {
            track: self.track.clone(),
        });

        self.track.reset_artwork(station);
        let query = ArtworkQuery::new(&self.track.artist, &self.track.title);
        self.request_artwork(ArtworkRequest::Lookup(query));
    }

    fn seek_held(&mut self, direction: SeekDirection) -> Result<()> {
        let Some(resume) = self.state.resume_state() else {
            if matches!(self.state, PlaybackState::Seeking { .. }) {
                return Ok(());
            }
            return Err(CoreError::SeekRejected { direction });
        };

        if direction == SeekDirection::Forward && !self.fast_forward_allowed() {
            self.refresh_controls();
            return Err(CoreError::SeekRejected { direction });
        }

        self.skip(direction);

        self.seek_id += 1;
        let seek_id = self.seek_id;
        let tx = self.inbound_tx.clone();
        self.seek_task = Some(RepeatingTask::spawn(self.settings.seek_repeat, move || {
            let _ = tx.send(Inbound::SeekTick { seek_id });
        }));

        self.set_state(PlaybackState::Seeking { direction, resume });
        Ok(())
    }

    fn seek_released(&mut self, direction: SeekDirection) {
        let PlaybackState::Seeking {
            direction: held,
            resume,
        } = self.state
        else {
            return;
        };
        if held != direction {
            return;
        }

        self.cancel_seek();
        let resumed = PlaybackState::from(resume);
        let status = (resumed == PlaybackState::Paused).then_some(PAUSED_MESSAGE);
        self.set_state(resumed);
        self.set_status(status);
    }

    fn on_seek_tick(&mut self, seek_id: u64) {
        if seek_id != self.seek_id || self.seek_task.is_none() {
            return;
        }
        let PlaybackState::Seeking { direction, .. } = self.state else {
            return;
        };

        if direction == SeekDirection::Forward && !self.fast_forward_allowed() {
            debug!(target: LOG_TARGET, "Fast-forward reached the end of the buffer");
            self.cancel_seek();
            self.refresh_controls();
            return;
        }

        self.skip(direction);
    }

    fn skip(&mut self, direction: SeekDirection) {
        let seconds = self.settings.skip_secs;
        let engine = self.engine.engine();
        match direction {
            SeekDirection::Back => engine.rewind(seconds),
            SeekDirection::Forward => engine.fast_forward(seconds),
        }
        self.refresh_controls();
    }

    fn fast_forward_allowed(&self) -> bool {
        self.engine
            .engine()
            .is_fast_forward_allowed(self.settings.skip_secs)
    }

    fn enter_stopped(&mut self, reason: StopReason) {
        if self.state.is_stopped() {
            return;
        }
        info!(target: LOG_TARGET, "Playback stopped: {:?}", reason);

        self.cancel_jobs();
        self.metering_enabled.store(false, Ordering::Release);
        self.set_state(PlaybackState::Stopped(reason.clone()));
        self.set_status(reason.status_message());
        self.emit(SessionEvent::Stopped { reason });
    }

    fn request_artwork(&mut self, request: ArtworkRequest) {
        let Some(station) = self.station.clone() else {
            return;
        };

        self.abort_artwork();
        self.artwork_request += 1;
        let request_id = self.artwork_request;
        let epoch = self.current_epoch();
        let resolver = Arc::clone(&self.resolver);
        let tx = self.inbound_tx.clone();

        self.emit(SessionEvent::NetworkActivity { active: true });
        self.artwork_task = Some(tokio::spawn(async move {
            let artwork = match request {
                ArtworkRequest::Lookup(query) => resolver.resolve(&query, &station).await,
                ArtworkRequest::Current(url) => resolver.resolve_current(&url, &station).await,
            };
            let _ = tx.send(Inbound::Artwork {
                epoch,
                request_id,
                artwork,
            });
        }));
    }

    fn on_artwork_resolved(&mut self, epoch: u64, request_id: u64, artwork: ResolvedArtwork) {
        if epoch != self.current_epoch() || request_id != self.artwork_request {
            debug!(target: LOG_TARGET, "Discarding superseded artwork from {}", artwork.url);
            return;
        }
        self.artwork_task = None;
        self.emit(SessionEvent::NetworkActivity { active: false });

        debug!(
            target: LOG_TARGET,
            "Artwork resolved from {:?}: {}", artwork.source, artwork.url
        );
        if !artwork.url.is_empty() {
            self.track.artwork_url = artwork.url;
        }
        self.track.artwork = artwork.image;
        self.track.artwork_loaded = artwork.loaded;
        self.emit(SessionEvent::ArtworkChanged {
            track: self.track.clone(),
        });
    }

    fn abort_artwork(&mut self) {
        if let Some(task) = self.artwork_task.take() {
            task.abort();
            self.emit(SessionEvent::NetworkActivity { active: false });
        }
    }

    fn cancel_seek(&mut self) {
        if let Some(task) = self.seek_task.take() {
            task.cancel();
        }
    }

    /// Restart the samplers when the engine recovers without a `play()`
    fn resume_sampling(&mut self) {
        if !self.torn_down {
            self.sampler.start();
        }
    }

    /// Seek timer and both samplers
    fn cancel_jobs(&mut self) {
        self.cancel_seek();
        self.sampler.stop();
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            self.refresh_controls();
            return;
        }

        debug!(target: LOG_TARGET, "State {} -> {}", self.state, state);
        let was_playing = self.track.is_playing;
        self.state = state;
        self.track.is_playing = self.state.is_playing();

        self.emit(SessionEvent::StateChanged {
            state: self.state.clone(),
        });
        if was_playing != self.track.is_playing {
            self.emit(SessionEvent::PlayingToggled {
                track: self.track.clone(),
            });
        }
        self.refresh_controls();
    }

    fn set_status(&mut self, message: Option<&str>) {
        if self.status.as_deref() == message {
            return;
        }
        self.status = message.map(ToString::to_string);
        self.emit(SessionEvent::StatusMessage {
            message: self.status.clone(),
        });
    }

    fn refresh_controls(&mut self) {
        let fast_forward_allowed = self.state.can_seek() && self.fast_forward_allowed();
        let controls = Controls::for_state(&self.state, fast_forward_allowed);
        if controls != self.controls {
            self.controls = controls;
            self.emit(SessionEvent::ControlsChanged { controls });
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::ArtworkSettings;
    use crate::provider::ArtworkProvider;
    use crate::testing::{EngineCall, FakeEngine, FakeLoader, FixedProvider};
    use crate::track::ArtworkImage;

    struct Harness {
        engine: Arc<FakeEngine>,
        handle: Arc<EngineHandle>,
        session: PlaybackSession,
        rx: mpsc::UnboundedReceiver<Inbound>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_provider(None)
        }

        fn with_provider(provider: Option<FixedProvider>) -> Self {
            let engine = FakeEngine::new();
            let handle = EngineHandle::new(engine.clone());
            let resolver = Arc::new(ArtworkResolver::new(
                provider.map(|p| Box::new(p) as Box<dyn ArtworkProvider>),
                Box::new(FakeLoader::default()),
                ArtworkSettings::default(),
            ));
            let (session, rx) =
                PlaybackSession::new(Arc::clone(&handle), resolver, SessionSettings::default());
            Self {
                engine,
                handle,
                session,
                rx,
            }
        }

        /// Apply everything queued so far, in order
        fn drain(&mut self) {
            while let Ok(message) = self.rx.try_recv() {
                self.session.handle(message);
            }
        }

        /// Let spawned tasks finish, then drain
        async fn settle(&mut self) {
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.drain();
        }

        fn dispatch(&mut self, event: EngineEvent) {
            self.handle.dispatch(event);
            self.drain();
        }

        async fn playing(&mut self) {
            self.session.select_station(jazz());
            self.dispatch(EngineEvent::Connecting);
            self.dispatch(EngineEvent::Buffering);
            self.dispatch(EngineEvent::PlayStarted);
            self.settle().await;
            self.engine.clear_calls();
        }
    }

    fn jazz() -> Station {
        Station::new(
            "jazz",
            "Jazz FM",
            "Smooth Jazz",
            "http://jazz.example/stream",
            "jazz-logo",
        )
    }

    fn rock() -> Station {
        Station::new("rock", "Rock FM", "Classic Rock", "http://rock.example/stream", "")
    }

    fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_station_starts_stream() {
        let mut h = Harness::new();
        assert_eq!(h.engine.configure_count(), 1);
        h.engine.clear_calls();
        h.session.select_station(jazz());

        assert_eq!(
            h.engine.calls(),
            vec![
                EngineCall::Stop,
                EngineCall::SetStreamUrl("http://jazz.example/stream".into(), false),
                EngineCall::Start,
            ]
        );
        assert_eq!(h.session.state(), &PlaybackState::Connecting);
        assert!(h.session.track().is_playing);
        assert_eq!(h.session.track().artwork_url, "jazz-logo");
        assert_eq!(h.session.status(), Some(LOADING_MESSAGE));
        assert!(h.session.is_sampling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_station_resolves_station_artwork() {
        let mut h = Harness::new();
        h.session.select_station(jazz());
        h.settle().await;

        let track = h.session.track();
        assert_eq!(track.artwork, ArtworkImage::Bundled("jazz-logo".into()));
        assert!(track.artwork_loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_lifecycle_to_playing() {
        let mut h = Harness::new();
        h.session.select_station(jazz());

        h.dispatch(EngineEvent::Connecting);
        assert_eq!(h.session.state(), &PlaybackState::Connecting);
        assert_eq!(h.session.status(), Some(CONNECTING_MESSAGE));

        h.dispatch(EngineEvent::Buffering);
        assert_eq!(h.session.state(), &PlaybackState::Buffering);
        assert_eq!(h.session.status(), Some(BUFFERING_MESSAGE));

        h.dispatch(EngineEvent::PlayStarted);
        assert_eq!(h.session.state(), &PlaybackState::Playing);
        assert_eq!(h.session.status(), None);
        assert!(h.session.track().is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_metering_enabled_once_per_start() {
        let mut h = Harness::new();
        h.session.select_station(jazz());
        h.dispatch(EngineEvent::PlayStarted);
        h.dispatch(EngineEvent::PlayStarted);
        assert_eq!(h.engine.count(&EngineCall::EnableLevelMetering), 1);

        h.session.pause();
        h.session.play().unwrap();
        h.dispatch(EngineEvent::PlayStarted);
        assert_eq!(h.engine.count(&EngineCall::EnableLevelMetering), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_twice_is_idempotent() {
        let mut h = Harness::new();
        h.playing().await;

        h.session.pause();
        assert_eq!(h.session.state(), &PlaybackState::Paused);
        assert!(!h.session.track().is_playing);

        h.session.pause();
        assert_eq!(h.session.state(), &PlaybackState::Paused);
        assert!(!h.session.track().is_playing);
        assert_eq!(h.engine.count(&EngineCall::Pause), 1);
        assert_eq!(h.session.status(), Some(PAUSED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_while_playing_is_noop() {
        let mut h = Harness::new();
        h.playing().await;

        h.session.play().unwrap();
        assert_eq!(h.session.state(), &PlaybackState::Playing);
        assert_eq!(h.engine.count(&EngineCall::Start), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_without_station() {
        let mut h = Harness::new();
        assert!(matches!(h.session.play(), Err(CoreError::NoStationSelected)));
        assert_eq!(h.session.state(), &PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_waits_for_engine() {
        let mut h = Harness::new();
        h.playing().await;
        h.session.pause();

        h.session.play().unwrap();
        assert_eq!(h.session.state(), &PlaybackState::Connecting);
        assert_eq!(h.engine.count(&EngineCall::Start), 1);

        h.dispatch(EngineEvent::PlayStarted);
        assert_eq!(h.session.state(), &PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_network_from_any_state_stops() {
        let setups: [fn(&mut Harness); 7] = [
            |_: &mut Harness| {},
            |h: &mut Harness| h.session.select_station(jazz()),
            |h: &mut Harness| {
                h.session.select_station(jazz());
                h.dispatch(EngineEvent::Buffering);
            },
            |h: &mut Harness| {
                h.session.select_station(jazz());
                h.dispatch(EngineEvent::PlayStarted);
            },
            |h: &mut Harness| {
                h.session.select_station(jazz());
                h.dispatch(EngineEvent::PlayStarted);
                h.session.pause();
            },
            |h: &mut Harness| {
                h.session.select_station(jazz());
                h.dispatch(EngineEvent::PlayStarted);
                h.session.rewind_held().unwrap();
            },
            |h: &mut Harness| {
                h.session.select_station(jazz());
                h.dispatch(EngineEvent::PlayStopped);
            },
        ];

        for setup in setups {
            let mut h = Harness::new();
            setup(&mut h);
            h.dispatch(EngineEvent::NoNetwork);

            assert!(h.session.state().is_stopped(), "state: {}", h.session.state());
            assert!(!h.session.track().is_playing);
            assert!(!h.session.is_sampling());
            assert!(!h.session.is_seek_timer_running());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reported_once() {
        let mut h = Harness::new();
        h.playing().await;
        let mut events = h.session.subscribe();

        h.dispatch(EngineEvent::NoNetwork);
        h.dispatch(EngineEvent::FatalError("decoder".into()));

        let stops = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Stopped { .. }))
            .count();
        assert_eq!(stops, 1);
        assert_eq!(
            h.session.state(),
            &PlaybackState::Stopped(StopReason::NoNetwork)
        );
        assert!(h.session.controls().play_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_after_stop_restarts_samplers() {
        let mut h = Harness::new();
        h.playing().await;
        h.dispatch(EngineEvent::PlayStopped);
        assert!(!h.session.is_sampling());

        h.session.play().unwrap();
        assert!(h.session.is_sampling());
        assert_eq!(h.session.state(), &PlaybackState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_recovery_after_stop_resumes_samplers() {
        let mut h = Harness::new();
        h.playing().await;
        assert_eq!(h.engine.count(&EngineCall::EnableLevelMetering), 0);

        h.dispatch(EngineEvent::PlayStopped);
        assert!(!h.session.is_sampling());

        h.dispatch(EngineEvent::Connecting);
        assert!(h.session.is_sampling());
        h.dispatch(EngineEvent::Buffering);
        h.dispatch(EngineEvent::PlayStarted);

        assert_eq!(h.session.state(), &PlaybackState::Playing);
        assert!(h.session.track().is_playing);
        assert!(h.session.is_sampling());
        assert_eq!(h.engine.count(&EngineCall::EnableLevelMetering), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_echo_from_previous_station_discarded() {
        let mut h = Harness::new();
        let weak = Arc::downgrade(&h.handle);
        h.engine.on_stop(move || {
            if let Some(handle) = weak.upgrade() {
                handle.dispatch(EngineEvent::PlayStopped);
            }
        });
        h.playing().await;
        let mut events = h.session.subscribe();

        h.session.select_station(rock());
        h.drain();

        assert_eq!(h.session.state(), &PlaybackState::Connecting);
        assert!(h.session.is_sampling());
        assert!(!h.session.controls().play_enabled);
        assert!(!drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::Stopped { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_updates_track() {
        let mut h = Harness::new();
        h.playing().await;
        let mut events = h.session.subscribe();

        h.dispatch(EngineEvent::MetadataChanged("Coldplay - Yellow".into()));
        assert_eq!(h.session.track().artist, "Coldplay");
        assert_eq!(h.session.track().title, "Yellow");

        let changed = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::TrackChanged { .. }))
            .count();
        assert_eq!(changed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_without_delimiter() {
        let mut h = Harness::new();
        h.playing().await;

        h.dispatch(EngineEvent::MetadataChanged("NoDelimiterHere".into()));
        assert_eq!(h.session.track().artist, "NoDelimiterHere");
        assert_eq!(h.session.track().title, "NoDelimiterHere");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_metadata_uses_station_defaults() {
        let mut h = Harness::new();
        h.playing().await;

        h.dispatch(EngineEvent::MetadataChanged(String::new()));
        assert_eq!(h.session.track().artist, "Smooth Jazz");
        assert_eq!(h.session.track().title, "Jazz FM");
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_metadata_skips_lookup() {
        let provider = FixedProvider::returning(Some("https://img.example/yellow.png"));
        let mut h = Harness::with_provider(Some(provider));
        h.playing().await;
        let mut events = h.session.subscribe();

        h.dispatch(EngineEvent::MetadataChanged("Coldplay - Yellow".into()));
        h.settle().await;
        h.dispatch(EngineEvent::MetadataChanged("Coldplay - Yellow".into()));
        h.settle().await;

        let events = drain_events(&mut events);
        let track_changes = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::TrackChanged { .. }))
            .count();
        let artwork_changes = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ArtworkChanged { .. }))
            .count();
        assert_eq!(track_changes, 1);
        assert_eq!(artwork_changes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_artwork_applied() {
        let provider = FixedProvider::returning(Some("https://img.example/yellow.png"));
        let mut h = Harness::with_provider(Some(provider));
        h.playing().await;

        h.dispatch(EngineEvent::MetadataChanged("Coldplay - Yellow".into()));
        assert!(!h.session.track().artwork_loaded);
        h.settle().await;

        let track = h.session.track();
        assert!(track.artwork_loaded);
        assert_eq!(track.artwork_url, "https://img.example/yellow.png");
        assert!(matches!(track.artwork, ArtworkImage::Downloaded(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_artwork_falls_back_to_station() {
        let provider =
            FixedProvider::returning(Some("https://lastfm.example/i/u/noimage/yellow.png"));
        let mut h = Harness::with_provider(Some(provider));
        h.playing().await;

        h.dispatch(EngineEvent::MetadataChanged("Coldplay - Yellow".into()));
        h.settle().await;

        let track = h.session.track();
        assert_eq!(track.artwork, ArtworkImage::Bundled("jazz-logo".into()));
        assert_eq!(track.artwork_url, "jazz-logo");
        assert!(track.artwork_loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_without_artwork_gets_default() {
        let mut h = Harness::new();
        h.session.select_station(rock());
        h.settle().await;

        let snapshot = h.session.snapshot();
        assert_eq!(
            snapshot.track.artwork,
            ArtworkImage::Bundled(crate::artwork::DEFAULT_IMAGE_NAME.into())
        );
        assert!(!snapshot.track.artwork_loaded);
        assert_eq!(snapshot.display().description.as_deref(), Some("Classic Rock"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_metadata_after_station_change_discarded() {
        let mut h = Harness::new();
        h.playing().await;

        // Queued by the old stream but not yet drained
        h.handle
            .dispatch(EngineEvent::MetadataChanged("Old Artist - Old Song".into()));
        h.session.select_station(rock());
        h.drain();

        assert_eq!(h.session.station().map(|s| s.id.as_str()), Some("rock"));
        assert_eq!(h.session.track().title, "");
        assert_eq!(h.session.state(), &PlaybackState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_artwork_discarded() {
        let provider = FixedProvider::returning(Some("https://img.example/old.png"));
        let mut h = Harness::with_provider(Some(provider));
        h.playing().await;

        h.dispatch(EngineEvent::MetadataChanged("Old Artist - Old Song".into()));
        h.session.select_station(rock());
        h.settle().await;

        let track = h.session.track();
        assert_ne!(track.artwork_url, "https://img.example/old.png");
        assert_eq!(track.title, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewind_hold_repeats_until_release() {
        let mut h = Harness::new();
        h.playing().await;

        h.session.rewind_held().unwrap();
        assert_eq!(
            h.session.state(),
            &PlaybackState::Seeking {
                direction: SeekDirection::Back,
                resume: ResumeState::Playing,
            }
        );
        assert!(h.session.track().is_playing);
        assert_eq!(h.engine.count(&EngineCall::Rewind(10)), 1);

        tokio::time::sleep(Duration::from_millis(650)).await;
        h.drain();
        assert_eq!(h.engine.count(&EngineCall::Rewind(10)), 3);

        h.session.rewind_released();
        assert_eq!(h.session.state(), &PlaybackState::Playing);
        assert!(!h.session.is_seek_timer_running());

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.drain();
        assert_eq!(h.engine.count(&EngineCall::Rewind(10)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_returns_to_paused() {
        let mut h = Harness::new();
        h.playing().await;
        h.session.pause();

        h.session.rewind_held().unwrap();
        h.session.rewind_released();
        assert_eq!(h.session.state(), &PlaybackState::Paused);
        assert!(!h.session.track().is_playing);
        assert_eq!(h.session.status(), Some(PAUSED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_other_direction_ignored() {
        let mut h = Harness::new();
        h.playing().await;

        h.session.rewind_held().unwrap();
        h.session.fast_forward_released();
        assert!(matches!(h.session.state(), PlaybackState::Seeking { .. }));
        assert!(h.session.is_seek_timer_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_forward_rejected_without_buffer() {
        let mut h = Harness::new();
        h.playing().await;
        h.engine.set_fast_forward_allowed(false);

        let result = h.session.fast_forward_held();
        assert!(matches!(
            result,
            Err(CoreError::SeekRejected {
                direction: SeekDirection::Forward
            })
        ));
        assert_eq!(h.session.state(), &PlaybackState::Playing);
        assert!(!h.session.is_seek_timer_running());
        assert!(!h.session.controls().fast_forward_enabled);

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.drain();
        assert_eq!(h.engine.count(&EngineCall::FastForward(10)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_forward_stops_at_buffer_end() {
        let mut h = Harness::new();
        h.playing().await;

        h.session.fast_forward_held().unwrap();
        assert_eq!(h.engine.count(&EngineCall::FastForward(10)), 1);

        h.engine.set_fast_forward_allowed(false);
        tokio::time::sleep(Duration::from_millis(310)).await;
        h.drain();

        assert_eq!(h.engine.count(&EngineCall::FastForward(10)), 1);
        assert!(!h.session.is_seek_timer_running());
        assert!(!h.session.controls().fast_forward_enabled);

        h.session.fast_forward_released();
        assert_eq!(h.session.state(), &PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_rejected_when_not_playing() {
        let mut h = Harness::new();
        assert!(h.session.rewind_held().is_err());
        assert_eq!(h.engine.count(&EngineCall::Rewind(10)), 0);
        assert!(!h.session.is_seek_timer_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_change_cancels_seek_timer() {
        let mut h = Harness::new();
        h.playing().await;
        h.session.rewind_held().unwrap();

        h.session.select_station(rock());
        assert!(!h.session.is_seek_timer_running());

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.drain();
        assert_eq!(h.engine.count(&EngineCall::Rewind(10)), 1);
        assert_eq!(h.session.state(), &PlaybackState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_everything() {
        let mut h = Harness::new();
        h.playing().await;
        let mut telemetry = h.session.watch_telemetry();
        let mut snapshots = h.session.watch_snapshot();

        h.session.teardown();
        assert!(h.session.is_torn_down());
        assert!(!h.session.is_sampling());
        assert_eq!(h.handle.bound_session(), None);
        telemetry.borrow_and_update();
        snapshots.borrow_and_update();

        // Engine callback after teardown reaches nobody
        assert!(!h.handle.dispatch(EngineEvent::NoNetwork));
        // A message that was already queued is ignored
        h.session.handle(Inbound::Engine {
            epoch: 1,
            event: EngineEvent::PlayPaused,
        });
        assert!(matches!(
            h.session.apply(Command::Pause),
            Err(CoreError::SessionClosed)
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.drain();

        assert_eq!(h.session.state(), &PlaybackState::Playing);
        assert_eq!(h.engine.count(&EngineCall::Pause), 0);
        assert!(!telemetry.has_changed().unwrap());
        assert!(!snapshots.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_replaces_binding() {
        let mut first = Harness::new();
        first.session.select_station(jazz());

        let resolver = Arc::new(ArtworkResolver::new(
            None,
            Box::new(FakeLoader::default()),
            ArtworkSettings::default(),
        ));
        let (second, mut second_rx) = PlaybackSession::new(
            Arc::clone(&first.handle),
            resolver,
            SessionSettings::default(),
        );
        assert_eq!(first.handle.bound_session(), Some(second.id()));

        first.handle.dispatch(EngineEvent::Buffering);
        first.drain();
        assert_eq!(first.session.state(), &PlaybackState::Connecting);
        assert!(second_rx.try_recv().is_ok());

        // Tearing down the replaced session leaves the new binding alone
        first.session.teardown();
        assert_eq!(first.handle.bound_session(), Some(second.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_published_while_playing() {
        let mut h = Harness::new();
        h.engine.set_levels(crate::telemetry::AudioLevels {
            average: [0.4, 0.6],
            peak: [0.8, 0.9],
        });
        h.playing().await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        let snapshot = *h.session.watch_telemetry().borrow();
        assert_eq!(snapshot.levels.peak, [0.8, 0.9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_shows_status_then_track() {
        let mut h = Harness::new();
        h.session.select_station(jazz());

        let display = h.session.snapshot().display();
        assert_eq!(display.primary, LOADING_MESSAGE);
        assert_eq!(display.secondary, "Jazz FM");

        h.dispatch(EngineEvent::PlayStarted);
        h.dispatch(EngineEvent::MetadataChanged("Coldplay - Yellow".into()));
        let display = h.session.snapshot().display();
        assert_eq!(display.primary, "Yellow");
        assert_eq!(display.secondary, "Coldplay");
    }

    #[tokio::test(start_paused = true)]
    async fn test_controls_follow_state() {
        let mut h = Harness::new();
        h.playing().await;
        let controls = h.session.controls();
        assert!(controls.pause_enabled);
        assert!(!controls.play_enabled);
        assert!(controls.rewind_enabled);
        assert!(controls.fast_forward_enabled);

        h.session.pause();
        let controls = h.session.controls();
        assert!(controls.play_enabled);
        assert!(controls.rewind_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_artwork_resolves_current_url() {
        let mut h = Harness::new();
        h.session.select_station(jazz());
        h.settle().await;
        let mut events = h.session.subscribe();

        h.session.refresh_artwork();
        h.settle().await;

        let events = drain_events(&mut events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::NetworkActivity { active: true })));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ArtworkChanged { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::NetworkActivity { active: false })));
    }
}
