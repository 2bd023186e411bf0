// Instrument parameters - schema, clamping and presets
//
// Each instrument kind declares its parameters once. The control side looks
// keys up here, clamps values to the declared range and only then sends a
// typed `ParamId` to the render engine.

use serde::{Deserialize, Serialize};

use super::instrument::InstrumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    Waveform,
    Attack,
    Decay,
    Sustain,
    Release,
    Cutoff,
    Resonance,
    FilterSlope,
    FilterEnvAmount,
    FilterEnvDecay,
    Gain,
    Tune,
    RootNote,
    LoopEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    #[serde(skip)]
    pub id: ParamId,
    pub key: &'static str,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: &'static str,
    pub category: &'static str,
}

impl ParameterDescriptor {
    /// Clamp into range. Non-finite input falls back to the default.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }
}

const fn param(
    id: ParamId,
    key: &'static str,
    name: &'static str,
    range: (f32, f32),
    default: f32,
    unit: &'static str,
    category: &'static str,
) -> ParameterDescriptor {
    ParameterDescriptor {
        id,
        key,
        name,
        min: range.0,
        max: range.1,
        default,
        unit,
        category,
    }
}

static SUBTRACTIVE_PARAMS: [ParameterDescriptor; 12] = [
    param(ParamId::Waveform, "waveform", "Waveform", (0.0, 6.0), 4.0, "", "Oscillator"),
    param(ParamId::Tune, "tune", "Tune", (-24.0, 24.0), 0.0, "st", "Oscillator"),
    param(ParamId::Attack, "attack", "Attack", (0.001, 5.0), 0.01, "s", "Amp Envelope"),
    param(ParamId::Decay, "decay", "Decay", (0.001, 5.0), 0.1, "s", "Amp Envelope"),
    param(ParamId::Sustain, "sustain", "Sustain", (0.0, 1.0), 0.7, "", "Amp Envelope"),
    param(ParamId::Release, "release", "Release", (0.001, 5.0), 0.2, "s", "Amp Envelope"),
    param(ParamId::Cutoff, "cutoff", "Cutoff", (20.0, 20000.0), 8000.0, "Hz", "Filter"),
    param(ParamId::Resonance, "resonance", "Resonance", (0.0, 1.0), 0.1, "", "Filter"),
    param(ParamId::FilterSlope, "filter_slope", "Filter Slope", (0.0, 1.0), 0.0, "", "Filter"),
    param(ParamId::FilterEnvAmount, "filter_env_amount", "Filter Env Amount", (-1.0, 1.0), 0.0, "", "Filter"),
    param(ParamId::FilterEnvDecay, "filter_env_decay", "Filter Env Decay", (0.001, 10.0), 0.3, "s", "Filter"),
    param(ParamId::Gain, "gain", "Gain", (0.0, 1.0), 0.5, "", "Output"),
];

static SAMPLER_PARAMS: [ParameterDescriptor; 6] = [
    param(ParamId::RootNote, "root_note", "Root Note", (0.0, 127.0), 60.0, "", "Sample"),
    param(ParamId::LoopEnabled, "loop", "Loop", (0.0, 1.0), 0.0, "", "Sample"),
    param(ParamId::Tune, "tune", "Tune", (-24.0, 24.0), 0.0, "st", "Sample"),
    param(ParamId::Attack, "attack", "Attack", (0.001, 5.0), 0.001, "s", "Amp Envelope"),
    param(ParamId::Release, "release", "Release", (0.001, 5.0), 0.1, "s", "Amp Envelope"),
    param(ParamId::Gain, "gain", "Gain", (0.0, 1.0), 0.8, "", "Output"),
];

pub fn descriptors(kind: InstrumentType) -> &'static [ParameterDescriptor] {
    match kind {
        InstrumentType::Subtractive => &SUBTRACTIVE_PARAMS,
        InstrumentType::Sampler => &SAMPLER_PARAMS,
    }
}

/// Named set of parameter values. Parameters not listed keep their default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub values: &'static [(ParamId, f32)],
}

static SUBTRACTIVE_PRESETS: [Preset; 5] = [
    Preset {
        name: "Init",
        values: &[],
    },
    Preset {
        name: "Warm Pad",
        values: &[
            (ParamId::Waveform, 4.0),
            (ParamId::Attack, 0.6),
            (ParamId::Decay, 0.8),
            (ParamId::Sustain, 0.8),
            (ParamId::Release, 1.5),
            (ParamId::Cutoff, 1800.0),
            (ParamId::Resonance, 0.2),
            (ParamId::Gain, 0.4),
        ],
    },
    Preset {
        name: "Pluck",
        values: &[
            (ParamId::Waveform, 5.0),
            (ParamId::Attack, 0.002),
            (ParamId::Decay, 0.25),
            (ParamId::Sustain, 0.0),
            (ParamId::Release, 0.15),
            (ParamId::Cutoff, 600.0),
            (ParamId::FilterEnvAmount, 0.8),
            (ParamId::FilterEnvDecay, 0.2),
        ],
    },
    Preset {
        name: "Acid Bass",
        values: &[
            (ParamId::Waveform, 4.0),
            (ParamId::Attack, 0.001),
            (ParamId::Decay, 0.3),
            (ParamId::Sustain, 0.4),
            (ParamId::Release, 0.05),
            (ParamId::Cutoff, 300.0),
            (ParamId::Resonance, 0.85),
            (ParamId::FilterSlope, 1.0),
            (ParamId::FilterEnvAmount, 0.9),
            (ParamId::FilterEnvDecay, 0.25),
            (ParamId::Tune, -12.0),
        ],
    },
    Preset {
        name: "Square Lead",
        values: &[
            (ParamId::Waveform, 5.0),
            (ParamId::Attack, 0.005),
            (ParamId::Sustain, 0.9),
            (ParamId::Release, 0.1),
            (ParamId::Cutoff, 5000.0),
            (ParamId::Resonance, 0.3),
        ],
    },
];

static SAMPLER_PRESETS: [Preset; 2] = [
    Preset {
        name: "Init",
        values: &[],
    },
    Preset {
        name: "One Shot",
        values: &[(ParamId::Attack, 0.001), (ParamId::Release, 2.0), (ParamId::Gain, 1.0)],
    },
];

pub fn presets(kind: InstrumentType) -> &'static [Preset] {
    match kind {
        InstrumentType::Subtractive => &SUBTRACTIVE_PRESETS,
        InstrumentType::Sampler => &SAMPLER_PRESETS,
    }
}

/// Preset selector: by position in the list or by (case-insensitive) name
#[derive(Debug, Clone, Copy)]
pub enum PresetRef<'a> {
    Index(usize),
    Name(&'a str),
}

pub fn find_preset(kind: InstrumentType, preset: PresetRef<'_>) -> Option<&'static Preset> {
    let list = presets(kind);
    match preset {
        PresetRef::Index(index) => list.get(index),
        PresetRef::Name(name) => list.iter().find(|p| p.name.eq_ignore_ascii_case(name)),
    }
}

/// Current parameter values of one instrument, kept on the control side
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValues {
    kind: InstrumentType,
    values: Vec<f32>,
}

impl ParameterValues {
    pub fn new(kind: InstrumentType) -> Self {
        Self {
            kind,
            values: descriptors(kind).iter().map(|d| d.default).collect(),
        }
    }

    pub fn kind(&self) -> InstrumentType {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        let index = descriptors(self.kind).iter().position(|d| d.key == key)?;
        self.values.get(index).copied()
    }

    /// Store a clamped value; returns the parameter and the value actually set
    pub fn set(&mut self, key: &str, value: f32) -> Option<(ParamId, f32)> {
        let index = descriptors(self.kind).iter().position(|d| d.key == key)?;
        let descriptor = &descriptors(self.kind)[index];
        let clamped = descriptor.clamp(value);
        self.values[index] = clamped;
        Some((descriptor.id, clamped))
    }

    /// Store a value by id; None when this instrument has no such parameter
    pub fn set_id(&mut self, param: ParamId, value: f32) -> Option<f32> {
        let index = descriptors(self.kind).iter().position(|d| d.id == param)?;
        let clamped = descriptors(self.kind)[index].clamp(value);
        self.values[index] = clamped;
        Some(clamped)
    }

    /// Reset to defaults then apply the preset; returns every (param, value)
    /// so the caller can push the whole state to the render side
    pub fn apply_preset(&mut self, preset: &Preset) -> Vec<(ParamId, f32)> {
        let table = descriptors(self.kind);
        for (slot, descriptor) in self.values.iter_mut().zip(table) {
            *slot = preset
                .values
                .iter()
                .find(|(id, _)| *id == descriptor.id)
                .map(|(_, v)| descriptor.clamp(*v))
                .unwrap_or(descriptor.default);
        }
        self.pairs()
    }

    pub fn pairs(&self) -> Vec<(ParamId, f32)> {
        descriptors(self.kind)
            .iter()
            .zip(&self.values)
            .map(|(d, v)| (d.id, *v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique_per_kind() {
        for kind in [InstrumentType::Subtractive, InstrumentType::Sampler] {
            let table = descriptors(kind);
            for (i, a) in table.iter().enumerate() {
                assert!(a.min <= a.default && a.default <= a.max, "{}", a.key);
                assert!(table[i + 1..].iter().all(|b| b.key != a.key));
            }
        }
    }

    #[test]
    fn test_set_clamps_to_range() {
        let mut values = ParameterValues::new(InstrumentType::Subtractive);
        assert_eq!(values.set("cutoff", 50_000.0), Some((ParamId::Cutoff, 20000.0)));
        assert_eq!(values.get("cutoff"), Some(20000.0));
        assert_eq!(values.set("attack", -1.0), Some((ParamId::Attack, 0.001)));
        assert_eq!(values.set("sustain", f32::NAN), Some((ParamId::Sustain, 0.7)));
        assert_eq!(values.set("root_note", 10.0), None);
    }

    #[test]
    fn test_presets_by_index_and_name() {
        let by_name = find_preset(InstrumentType::Subtractive, PresetRef::Name("acid bass"));
        let by_index = find_preset(InstrumentType::Subtractive, PresetRef::Index(3));
        assert_eq!(by_name, by_index);
        assert!(find_preset(InstrumentType::Sampler, PresetRef::Index(9)).is_none());
    }

    #[test]
    fn test_apply_preset_resets_unlisted_params() {
        let mut values = ParameterValues::new(InstrumentType::Subtractive);
        values.set("gain", 1.0);
        let preset = find_preset(InstrumentType::Subtractive, PresetRef::Name("Pluck")).unwrap();
        let pairs = values.apply_preset(preset);

        assert_eq!(values.get("gain"), Some(0.5));
        assert_eq!(values.get("cutoff"), Some(600.0));
        assert_eq!(pairs.len(), descriptors(InstrumentType::Subtractive).len());
    }
}
