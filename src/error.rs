// Error types for the control side of the engine
//
// Nothing in here is ever constructed on the render thread. Render-side
// problems are counted in `EngineStats` and reported by the session.

use crate::audio::mixer::ChannelId;
use crate::sequencer::note::NoteId;
use crate::sequencer::pattern::PatternId;
use crate::session::TrackId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Audio backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Audio backend is not ready")]
    BackendNotReady,

    #[error("Stream configuration error: {0}")]
    StreamConfig(String),

    #[error("Unsupported sample format: {0}. Supported formats: F32, I16, U16")]
    UnsupportedSampleFormat(String),

    #[error("Unknown track: {0:?}")]
    UnknownTrack(TrackId),

    #[error("Unknown pattern: {0:?}")]
    UnknownPattern(PatternId),

    #[error("Unknown note {note:?} in pattern {pattern:?}")]
    UnknownNote { pattern: PatternId, note: NoteId },

    #[error("Unknown mixer channel: {0:?}")]
    UnknownChannel(ChannelId),

    #[error("Channel {channel:?} has no effect at position {position}")]
    UnknownEffect { channel: ChannelId, position: usize },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Send from {from:?} to {to:?} would create a routing cycle")]
    RoutingCycle { from: ChannelId, to: ChannelId },

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    #[error("Render command queue is full")]
    QueueFull,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
