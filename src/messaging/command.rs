// Types de commandes - Session → RenderEngine
//
// Timed commands carry the absolute frame they must land on. Everything else
// is applied at the start of the next block. Heap objects travel boxed so the
// render side only moves pointers; anything it takes out of the graph goes
// back as `Retired`.

use std::sync::Arc;

use crate::audio::mixer::{ChannelParam, ChannelStrip};
use crate::sampler::SampleBuffer;
use crate::sequencer::metronome::ClickType;
use crate::synth::effect::EffectSlot;
use crate::synth::parameters::ParamId;
use crate::synth::{Instrument, VoiceTag};

pub enum RenderCommand {
    NoteOn {
        slot: usize,
        pitch: u8,
        velocity: u8,
        tag: VoiceTag,
        at: u64,
    },
    NoteOff {
        slot: usize,
        tag: VoiceTag,
        at: u64,
    },
    /// `bend` -1..1
    PitchBend {
        slot: usize,
        bend: f32,
        at: u64,
    },
    ControlChange {
        slot: usize,
        controller: u8,
        value: u8,
        at: u64,
    },
    Click {
        click: ClickType,
        at: u64,
    },
    /// Hard stop: voices straight to Off, pending timed commands discarded
    AllVoicesOff,

    InstallInstrument {
        slot: usize,
        instrument: Box<Instrument>,
    },
    RemoveInstrument {
        slot: usize,
    },
    /// `None` routes straight to master
    RouteInstrument {
        slot: usize,
        channel: Option<usize>,
    },
    SetInstrumentParam {
        slot: usize,
        param: ParamId,
        value: f32,
    },
    SetSample {
        slot: usize,
        sample: Option<Arc<SampleBuffer>>,
    },

    InstallChannel {
        index: usize,
        strip: Box<ChannelStrip>,
    },
    RemoveChannel {
        index: usize,
    },
    SetChannelParam {
        index: usize,
        param: ChannelParam,
    },
    InsertEffect {
        channel: usize,
        position: usize,
        slot: EffectSlot,
    },
    RemoveEffect {
        channel: usize,
        position: usize,
    },
    SetEffectBypass {
        channel: usize,
        position: usize,
        bypassed: bool,
    },
    SetEffectMix {
        channel: usize,
        position: usize,
        mix: f32,
    },
    SetEffectParam {
        channel: usize,
        position: usize,
        index: usize,
        value: f32,
    },
    SetSend {
        channel: usize,
        target: usize,
        amount: f32,
    },
    RemoveSend {
        channel: usize,
        target: usize,
    },
    /// Channel render indices, sources before their send targets
    SetProcessOrder(Vec<usize>),

    SetMasterVolume(f32),
    SetMetronomeVolume(f32),
}

impl RenderCommand {
    /// Frame a timed command is due at
    pub fn due_frame(&self) -> Option<u64> {
        match self {
            RenderCommand::NoteOn { at, .. }
            | RenderCommand::NoteOff { at, .. }
            | RenderCommand::PitchBend { at, .. }
            | RenderCommand::ControlChange { at, .. }
            | RenderCommand::Click { at, .. } => Some(*at),
            _ => None,
        }
    }

    /// Instrument slot a timed performance command targets
    pub fn instrument_slot(&self) -> Option<usize> {
        match self {
            RenderCommand::NoteOn { slot, .. }
            | RenderCommand::NoteOff { slot, .. }
            | RenderCommand::PitchBend { slot, .. }
            | RenderCommand::ControlChange { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

/// Objects leaving the render graph, dropped on the control side
pub enum Retired {
    Instrument(Box<Instrument>),
    Channel(Box<ChannelStrip>),
    Effect(EffectSlot),
    Sample(Arc<SampleBuffer>),
    Order(Vec<usize>),
}
