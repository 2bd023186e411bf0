// Shared atomics - lock-free values read across the render boundary
// The render thread writes, the control side reads (or the other way round),
// never both for the same value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// f32 stored as its bit pattern in an AtomicU32
#[derive(Clone, Debug)]
pub struct AtomicF32 {
    inner: Arc<AtomicU32>,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Counters published by the render engine after each block
#[derive(Debug, Default)]
pub struct EngineStats {
    active_voices: AtomicUsize,
    blocks_rendered: AtomicU64,
    /// Timed commands whose frame was already in the past
    late_events: AtomicU64,
    /// Timed commands applied early because the pending queue was full
    pending_overflows: AtomicU64,
    /// Commands the render side could not apply (full chain, bad slot)
    rejected_commands: AtomicU64,
    /// Retired objects dropped on the render thread because the return
    /// queue was full
    retire_overflows: AtomicU64,
}

/// Plain copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngineStatsSnapshot {
    pub active_voices: usize,
    pub blocks_rendered: u64,
    pub late_events: u64,
    pub pending_overflows: u64,
    pub rejected_commands: u64,
    pub retire_overflows: u64,
}

impl EngineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_active_voices(&self, count: usize) {
        self.active_voices.store(count, Ordering::Relaxed);
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    pub fn block_rendered(&self) {
        self.blocks_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn late_event(&self) {
        self.late_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_overflow(&self) {
        self.pending_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_command(&self) {
        self.rejected_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retire_overflow(&self) {
        self.retire_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            active_voices: self.active_voices.load(Ordering::Relaxed),
            blocks_rendered: self.blocks_rendered.load(Ordering::Relaxed),
            late_events: self.late_events.load(Ordering::Relaxed),
            pending_overflows: self.pending_overflows.load(Ordering::Relaxed),
            rejected_commands: self.rejected_commands.load(Ordering::Relaxed),
            retire_overflows: self.retire_overflows.load(Ordering::Relaxed),
        }
    }
}
