// CPU Monitor - render time against the per-block deadline
//
// Measures 1 out of N callbacks. The deadline of a block is its duration at
// the stream sample rate; a block that takes longer is an overrun.
// Atomics only, so the render thread never blocks on a reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
struct Counters {
    busy_ns: AtomicU64,
    available_ns: AtomicU64,
    measured: AtomicU64,
    overruns: AtomicU64,
    /// Worst single-block load, in hundredths of a percent
    peak_load: AtomicU32,
    tick: AtomicU32,
}

#[derive(Clone, Debug)]
pub struct CpuMonitor {
    counters: Arc<Counters>,
    sample_rate: f64,
    measure_every_n: u32,
}

/// CPU load level (for display)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuLoad {
    Low,    // < 50%
    Medium, // 50-75%
    High,   // > 75%
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct CpuReport {
    pub average_percent: f32,
    pub peak_percent: f32,
    pub measured_blocks: u64,
    pub overruns: u64,
}

impl CpuMonitor {
    pub fn new(sample_rate: f32, measure_every_n: u32) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            sample_rate: sample_rate.max(1.0) as f64,
            measure_every_n: measure_every_n.max(1),
        }
    }

    /// `Some` when this callback is one of the measured ones
    #[inline]
    pub fn start_measure(&self) -> Option<Instant> {
        let count = self.counters.tick.fetch_add(1, Ordering::Relaxed);
        (count % self.measure_every_n == 0).then(Instant::now)
    }

    #[inline]
    pub fn end_measure(&self, start: Option<Instant>, frames: usize) {
        if let Some(start) = start {
            self.record(start.elapsed().as_nanos() as u64, frames);
        }
    }

    /// Account one block that took `busy_ns` to render `frames`
    pub fn record(&self, busy_ns: u64, frames: usize) {
        let available_ns = (frames as f64 / self.sample_rate * 1e9) as u64;
        if available_ns == 0 {
            return;
        }

        let c = &self.counters;
        c.busy_ns.fetch_add(busy_ns, Ordering::Relaxed);
        c.available_ns.fetch_add(available_ns, Ordering::Relaxed);
        c.measured.fetch_add(1, Ordering::Relaxed);
        if busy_ns > available_ns {
            c.overruns.fetch_add(1, Ordering::Relaxed);
        }

        let load = (busy_ns as f64 / available_ns as f64 * 10_000.0).min(u32::MAX as f64) as u32;
        c.peak_load.fetch_max(load, Ordering::Relaxed);
    }

    /// Average load, 0-100+ (above 100 means the deadline is missed)
    pub fn cpu_percentage(&self) -> f32 {
        let busy = self.counters.busy_ns.load(Ordering::Relaxed);
        let available = self.counters.available_ns.load(Ordering::Relaxed);
        if available == 0 {
            return 0.0;
        }
        (busy as f64 / available as f64 * 100.0) as f32
    }

    pub fn report(&self) -> CpuReport {
        CpuReport {
            average_percent: self.cpu_percentage(),
            peak_percent: self.counters.peak_load.load(Ordering::Relaxed) as f32 / 100.0,
            measured_blocks: self.counters.measured.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
        }
    }

    pub fn load_level(&self) -> CpuLoad {
        match self.cpu_percentage() {
            cpu if cpu < 50.0 => CpuLoad::Low,
            cpu if cpu < 75.0 => CpuLoad::Medium,
            _ => CpuLoad::High,
        }
    }

    pub fn reset(&self) {
        let c = &self.counters;
        c.busy_ns.store(0, Ordering::Relaxed);
        c.available_ns.store(0, Ordering::Relaxed);
        c.measured.store(0, Ordering::Relaxed);
        c.overruns.store(0, Ordering::Relaxed);
        c.peak_load.store(0, Ordering::Relaxed);
        c.tick.store(0, Ordering::Relaxed);
    }
}
