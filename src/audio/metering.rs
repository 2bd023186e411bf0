// Metering - peak with decaying hold, and RMS, per block
//
// The render side owns a `Meter`; the control side keeps the matching
// `MeterHandle` and reads it whenever it likes.

use super::parameters::AtomicF32;

/// Hold decay per block
pub const PEAK_HOLD_DECAY: f32 = 0.95;

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeterReading {
    /// Peak with hold (linear)
    pub peak: f32,
    /// RMS of the last block (linear)
    pub rms: f32,
}

impl MeterReading {
    pub fn peak_db(&self) -> f32 {
        20.0 * self.peak.max(1e-6).log10()
    }
}

/// Read side of a meter
#[derive(Debug, Clone, Default)]
pub struct MeterHandle {
    peak: AtomicF32,
    rms: AtomicF32,
}

impl MeterHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> MeterReading {
        MeterReading {
            peak: self.peak.get(),
            rms: self.rms.get(),
        }
    }
}

/// Write side, lives in the render graph
#[derive(Debug, Clone)]
pub struct Meter {
    handle: MeterHandle,
    peak_hold: f32,
}

impl Meter {
    pub fn new(handle: MeterHandle) -> Self {
        Self {
            handle,
            peak_hold: 0.0,
        }
    }

    pub fn handle(&self) -> &MeterHandle {
        &self.handle
    }

    /// Measure one stereo block and publish it
    pub fn update(&mut self, left: &[f32], right: &[f32]) {
        let frames = left.len().min(right.len());
        if frames == 0 {
            return;
        }

        let mut peak = 0.0f32;
        let mut sum_squares = 0.0f32;
        for (l, r) in left.iter().zip(right) {
            peak = peak.max(l.abs()).max(r.abs());
            sum_squares += l * l + r * r;
        }

        self.peak_hold = peak.max(self.peak_hold * PEAK_HOLD_DECAY);
        self.handle.peak.set(self.peak_hold);
        self.handle
            .rms
            .set((sum_squares / (2 * frames) as f32).sqrt());
    }

    pub fn reset(&mut self) {
        self.peak_hold = 0.0;
        self.handle.peak.set(0.0);
        self.handle.rms.set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_hold_decays() {
        let handle = MeterHandle::new();
        let mut meter = Meter::new(handle.clone());

        meter.update(&[0.0, 0.8], &[0.5, -0.2]);
        assert_eq!(handle.read().peak, 0.8);

        meter.update(&[0.0, 0.0], &[0.0, 0.0]);
        assert!((handle.read().peak - 0.8 * PEAK_HOLD_DECAY).abs() < 1e-6);
        assert_eq!(handle.read().rms, 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let handle = MeterHandle::new();
        let mut meter = Meter::new(handle.clone());
        meter.update(&[0.5; 64], &[0.5; 64]);
        assert!((handle.read().rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_peak_db() {
        let reading = MeterReading { peak: 1.0, rms: 0.0 };
        assert!(reading.peak_db().abs() < 1e-6);
        let silent = MeterReading::default();
        assert!((silent.peak_db() + 120.0).abs() < 1e-3);
    }
}
