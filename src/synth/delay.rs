// Delay - Digital delay line with feedback
//
// Circular buffer pre-allocated for the maximum delay time. The line returns
// the wet (delayed) signal only; wet/dry blending happens in the effect slot.

use crate::audio::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DelayParams {
    /// Delay time in milliseconds (0.0 - max_time_ms)
    pub time_ms: f32,
    /// Feedback amount (0.0 - 0.95)
    pub feedback: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            time_ms: 250.0,
            feedback: 0.5,
        }
    }
}

impl DelayParams {
    pub const MAX_FEEDBACK: f32 = 0.95;

    pub fn new(time_ms: f32, feedback: f32) -> Self {
        Self {
            time_ms: time_ms.max(0.0),
            feedback: feedback.clamp(0.0, Self::MAX_FEEDBACK),
        }
    }

    pub fn validate(&mut self, max_time_ms: f32) {
        self.time_ms = self.time_ms.clamp(0.0, max_time_ms);
        self.feedback = self.feedback.clamp(0.0, Self::MAX_FEEDBACK);
    }
}

#[derive(Debug, Clone)]
pub struct Delay {
    params: DelayParams,
    sample_rate: f32,
    max_time_ms: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    feedback_smoother: OnePoleSmoother,
}

impl Delay {
    pub fn new(mut params: DelayParams, sample_rate: f32, max_time_ms: f32) -> Self {
        params.validate(max_time_ms);
        let max_samples = ((max_time_ms / 1000.0) * sample_rate) as usize + 1;

        let mut delay = Self {
            params,
            sample_rate,
            max_time_ms,
            buffer: vec![0.0; max_samples],
            write_pos: 0,
            delay_samples: 0,
            // 10ms: smooth enough for live tweaks
            feedback_smoother: OnePoleSmoother::new(params.feedback, 10.0, sample_rate),
        };
        delay.update_delay_samples();
        delay
    }

    fn update_delay_samples(&mut self) {
        let samples = ((self.params.time_ms / 1000.0) * self.sample_rate) as usize;
        self.delay_samples = samples.clamp(1, self.buffer.len() - 1);
    }

    pub fn set_params(&mut self, mut params: DelayParams) {
        params.validate(self.max_time_ms);
        self.params = params;
        self.update_delay_samples();
    }

    pub fn params(&self) -> DelayParams {
        self.params
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Push one input sample and return the delayed sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let feedback = self.feedback_smoother.process(self.params.feedback);

        let len = self.buffer.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;
        let delayed = self.buffer[read_pos];

        // Soft limit inside the loop so high feedback cannot run away
        let written = (input + feedback * delayed).clamp(-2.0, 2.0);
        self.buffer[self.write_pos] = flush_denormals_to_zero(written);
        self.write_pos = (self.write_pos + 1) % len;

        delayed
    }

    pub fn latency_samples(&self) -> usize {
        self.delay_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_params_clamping() {
        let params = DelayParams::new(500.0, 1.5);
        assert_eq!(params.time_ms, 500.0);
        assert_eq!(params.feedback, DelayParams::MAX_FEEDBACK);
    }

    #[test]
    fn test_impulse_comes_back_after_delay_time() {
        let sample_rate = 44100.0;
        let mut delay = Delay::new(DelayParams::new(10.0, 0.0), sample_rate, 1000.0);
        let delay_samples = (10.0 / 1000.0 * sample_rate) as usize;

        assert_eq!(delay.process(1.0), 0.0);
        for i in 1..delay_samples {
            assert_eq!(delay.process(0.0), 0.0, "early output at {i}");
        }
        assert_eq!(delay.process(0.0), 1.0);
    }

    #[test]
    fn test_feedback_echoes_decay() {
        let sample_rate = 44100.0;
        let mut delay = Delay::new(DelayParams::new(10.0, 0.5), sample_rate, 1000.0);
        let delay_samples = delay.latency_samples();

        // Warm up the smoother
        for _ in 0..1000 {
            delay.process(0.0);
        }
        delay.process(1.0);

        let mut echo_levels = Vec::new();
        let mut max_in_window = 0.0_f32;
        for i in 0..(delay_samples * 4) {
            max_in_window = max_in_window.max(delay.process(0.0).abs());
            if (i + 1) % delay_samples == 0 {
                echo_levels.push(max_in_window);
                max_in_window = 0.0;
            }
        }

        assert!(echo_levels[1] < echo_levels[0]);
        assert!(echo_levels[2] < echo_levels[1]);
    }

    #[test]
    fn test_delay_reset() {
        let mut delay = Delay::new(DelayParams::default(), 44100.0, 1000.0);
        for _ in 0..1000 {
            delay.process(0.5);
        }
        delay.reset();
        assert!(delay.buffer.iter().all(|&x| x == 0.0));
        assert_eq!(delay.write_pos, 0);
    }

    #[test]
    fn test_high_feedback_stays_bounded() {
        let mut delay = Delay::new(DelayParams::new(5.0, 0.95), 44100.0, 100.0);
        for i in 0..20000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let output = delay.process(input);
            assert!(output.is_finite() && output.abs() <= 2.0);
        }
    }

    #[test]
    fn test_max_time_clamping() {
        let mut delay = Delay::new(DelayParams::default(), 44100.0, 1000.0);
        delay.set_params(DelayParams::new(2000.0, 0.5));
        assert_eq!(delay.params().time_ms, 1000.0);
        assert_eq!(delay.latency_samples(), delay.buffer.len() - 1);
    }
}
