// Sequencer module
// Timeline, transport, patterns and the look-ahead scheduler

pub mod metronome;
pub mod note;
pub mod pattern;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use metronome::{ClickType, MetronomeScheduler};
pub use note::{Note, NoteData, NoteId};
pub use pattern::{Pattern, PatternBank, PatternExport, PatternId};
pub use scheduler::{LookaheadScheduler, NoteRouting, NoteTarget};
pub use timeline::{ClockMapper, MusicalTime, PPQ, Tempo, Tick, TimeSignature, quantize};
pub use transport::{Transport, TransportEvent, TransportSnapshot, TransportState};
