// Module synthèse - Oscillateurs, voix et instruments

pub mod delay;
pub mod effect;
pub mod envelope;
pub mod filter;
pub mod instrument;
pub mod oscillator;
pub mod parameters;
pub mod voice;
pub mod voice_manager;

pub use instrument::{Controller, Instrument, InstrumentType, Performance, Synthesize, bend_from_midi};
pub use voice::VoiceTag;
