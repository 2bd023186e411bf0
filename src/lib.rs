// Studio Core - real-time transport, sequencing, voice and mixing engine

pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod sampler;
pub mod sequencer;
pub mod session;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::backend::{CpalBackend, OfflineBackend, RenderBackend};
pub use audio::engine::{EngineLink, RenderEngine};
pub use audio::mixer::{ChannelId, ChannelParam};
pub use audio::timing::{AudioTiming, Clock};
pub use config::EngineConfig;
pub use connection::status::{AtomicDeviceStatus, DeviceStatus};
pub use error::{EngineError, EngineResult};
pub use messaging::notification::{Message, Notification};
pub use sampler::SampleBuffer;
pub use sequencer::{
    NoteData, PPQ, PatternExport, PatternId, Tempo, Tick, TimeSignature, TransportEvent,
    TransportSnapshot, TransportState,
};
pub use session::{MixerSnapshot, SchedulerThread, Session, TrackId};
pub use synth::effect::EffectKind;
pub use synth::parameters::PresetRef;
pub use synth::{Controller, Instrument, InstrumentType};
