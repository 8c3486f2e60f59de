//! Control loop driving a [`PlaybackSession`] on its own task.

use crate::error::{CoreError, Result};
use crate::session::{Command, Inbound, PlaybackSession, SessionEvent, SessionSnapshot};
use crate::station::Station;
use crate::telemetry::TelemetrySnapshot;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const LOG_TARGET: &str = "airwave::session";

/// Owns a session and drains its inbound queue in arrival order
pub struct SessionRunner {
    session: PlaybackSession,
    rx: mpsc::UnboundedReceiver<Inbound>,
    cancel_token: CancellationToken,
}

impl SessionRunner {
    /// Create a runner for a freshly constructed session
    ///
    /// # Arguments
    /// * `session` - Session to drive
    /// * `rx` - Inbound queue returned alongside the session
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(
        session: PlaybackSession,
        rx: mpsc::UnboundedReceiver<Inbound>,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            session,
            rx,
            cancel_token: cancel_token.map_or_else(CancellationToken::new, |t| t.child_token()),
        }
    }

    /// Start the control loop in a background task
    #[must_use]
    pub fn start(self) -> SessionHandle {
        let tx = self.session.inbound_sender();
        let events = self.session.event_sender();
        let snapshot = self.session.watch_snapshot();
        let telemetry = self.session.watch_telemetry();
        let cancel_token = self.cancel_token.clone();
        let task = tokio::spawn(self.run());

        SessionHandle {
            tx,
            events,
            snapshot,
            telemetry,
            cancel_token,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        info!(target: LOG_TARGET, "Session {} control loop started", self.session.id());

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    self.session.teardown();
                    break;
                }
                message = self.rx.recv() => {
                    let Some(message) = message else {
                        self.session.teardown();
                        break;
                    };
                    self.session.handle(message);
                    if self.session.is_torn_down() {
                        break;
                    }
                }
            }
        }

        info!(target: LOG_TARGET, "Session {} control loop finished", self.session.id());
    }
}

/// Client side of a running session.
///
/// Dropping the handle tears the session down.
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    telemetry: watch::Receiver<TelemetrySnapshot>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Queue a command for the control loop.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn send(&self, command: Command) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(CoreError::SessionClosed);
        }
        self.tx
            .send(Inbound::Command(command))
            .map_err(|_| CoreError::SessionClosed)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn select_station(&self, station: Station) -> Result<()> {
        self.send(Command::SelectStation(station))
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn rewind_held(&self) -> Result<()> {
        self.send(Command::RewindHeld)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn rewind_released(&self) -> Result<()> {
        self.send(Command::RewindReleased)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn fast_forward_held(&self) -> Result<()> {
        self.send(Command::FastForwardHeld)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn fast_forward_released(&self) -> Result<()> {
        self.send(Command::FastForwardReleased)
    }

    /// # Errors
    ///
    /// Returns `SessionClosed` if the control loop has exited.
    pub fn refresh_artwork(&self) -> Result<()> {
        self.send(Command::RefreshArtwork)
    }

    /// Subscribe to session notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Latest snapshot published by the control loop
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch snapshots as they are published
    #[must_use]
    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Watch telemetry from the samplers
    #[must_use]
    pub fn watch_telemetry(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.telemetry.clone()
    }

    /// Tear the session down and wait for the control loop to exit
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
