//! Playback state machine vocabulary.

use std::fmt;

/// Direction of a time-shift hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekDirection {
    /// Rewind into the live buffer
    Back,
    /// Fast-forward toward the live edge
    Forward,
}

impl SeekDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Back => "rewind",
            Self::Forward => "fast-forward",
        }
    }
}

impl fmt::Display for SeekDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state a seek hold returns to when released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    Playing,
    Paused,
}

impl From<ResumeState> for PlaybackState {
    fn from(value: ResumeState) -> Self {
        match value {
            ResumeState::Playing => Self::Playing,
            ResumeState::Paused => Self::Paused,
        }
    }
}

/// Why playback reached [`PlaybackState::Stopped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The engine stopped the stream on its own
    Stopped,
    /// No connectivity
    NoNetwork,
    /// The engine reported an unrecoverable error
    Fatal(String),
}

impl StopReason {
    /// Text shown in place of the track while stopped, if any
    #[must_use]
    pub const fn status_message(&self) -> Option<&'static str> {
        match self {
            Self::Stopped => None,
            Self::NoNetwork => Some(NO_NETWORK_MESSAGE),
            Self::Fatal(_) => Some(STREAM_ERROR_MESSAGE),
        }
    }
}

pub const LOADING_MESSAGE: &str = "Loading Station...";
pub const CONNECTING_MESSAGE: &str = "Connecting to Station...";
pub const BUFFERING_MESSAGE: &str = "Buffering...";
pub const PAUSED_MESSAGE: &str = "Station Paused...";
pub const NO_NETWORK_MESSAGE: &str = "No network connection";
pub const STREAM_ERROR_MESSAGE: &str = "Stream error";

/// Current playback state. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Connecting,
    Buffering,
    Playing,
    Paused,
    /// Repeated time-shift skips while a rewind/fast-forward control is held
    Seeking {
        direction: SeekDirection,
        resume: ResumeState,
    },
    Stopped(StopReason),
}

impl PlaybackState {
    /// Whether the track counts as playing in this state.
    ///
    /// `Track::is_playing` always mirrors this value.
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        matches!(
            self,
            Self::Playing | Self::Buffering | Self::Connecting | Self::Seeking { .. }
        )
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Playing or Paused, the only states a seek hold can start from
    #[must_use]
    pub const fn resume_state(&self) -> Option<ResumeState> {
        match self {
            Self::Playing => Some(ResumeState::Playing),
            Self::Paused => Some(ResumeState::Paused),
            _ => None,
        }
    }

    /// Whether time-shift controls are usable in this state
    #[must_use]
    pub const fn can_seek(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Seeking { .. })
    }

    /// Stable lowercase name for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking { .. } => "seeking",
            Self::Stopped(_) => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seeking { direction, .. } => write!(f, "seeking ({direction})"),
            Self::Stopped(StopReason::Fatal(reason)) => write!(f, "stopped ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Enablement of the transport controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub play_enabled: bool,
    pub pause_enabled: bool,
    pub rewind_enabled: bool,
    pub fast_forward_enabled: bool,
}

impl Controls {
    /// Compute control enablement for a state.
    ///
    /// `fast_forward_allowed` is the engine's answer for one skip step.
    #[must_use]
    pub const fn for_state(state: &PlaybackState, fast_forward_allowed: bool) -> Self {
        let playing = state.is_playing();
        let seekable = state.can_seek();
        Self {
            play_enabled: !playing,
            pause_enabled: playing,
            rewind_enabled: seekable,
            fast_forward_enabled: seekable && fast_forward_allowed,
        }
    }
}
