// Sample buffer - in-memory PCM handed to the sampler instrument
//
// Decoding files is someone else's job; callers hand over frames.

/// Mono PCM frames at their own sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    name: String,
    frames: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn from_mono(name: impl Into<String>, frames: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            frames,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Mix interleaved multi-channel data down to mono
    pub fn from_interleaved(
        name: impl Into<String>,
        data: &[f32],
        channels: u16,
        sample_rate: u32,
    ) -> Self {
        let channels = channels.max(1) as usize;
        let frames = data
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::from_mono(name, frames, sample_rate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    pub fn frames(&self) -> &[f32] {
        &self.frames
    }

    /// Linear interpolation between the two frames around `position`.
    /// `wrap` reads past the end from the start (looping).
    #[inline]
    pub fn read_linear(&self, position: f64, wrap: bool) -> f32 {
        let len = self.frames.len();
        if len == 0 || position < 0.0 {
            return 0.0;
        }
        let index = position as usize;
        let frac = (position - index as f64) as f32;
        let Some(&a) = self.frames.get(index) else {
            return 0.0;
        };
        let b = match self.frames.get(index + 1) {
            Some(&b) => b,
            None if wrap => self.frames[0],
            None => 0.0,
        };
        a + (b - a) * frac
    }
}
