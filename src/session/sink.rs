// Command sink - the session's end of the render command queue

use ringbuf::traits::{Observer, Producer};
use tracing::{debug, warn};

use crate::audio::timing::AudioTiming;
use crate::error::{EngineError, EngineResult};
use crate::messaging::channels::CommandProducer;
use crate::messaging::command::RenderCommand;

/// Queue slots only `halt` may use. Every other push leaves them free, so a
/// full queue always ends with a halt and a stop can never be lost.
const HALT_RESERVE: usize = 1;

pub struct CommandSink {
    producer: CommandProducer,
    timing: AudioTiming,
    dropped: u64,
}

impl CommandSink {
    pub fn new(producer: CommandProducer, timing: AudioTiming) -> Self {
        Self {
            producer,
            timing,
            dropped: 0,
        }
    }

    fn has_room(&self) -> bool {
        self.producer.vacant_len() > HALT_RESERVE
    }

    /// Best effort: a full queue drops the command and counts it
    pub fn push(&mut self, command: RenderCommand) -> bool {
        if self.has_room() && self.producer.try_push(command).is_ok() {
            return true;
        }
        self.dropped += 1;
        warn!(dropped = self.dropped, "render command queue full, command dropped");
        false
    }

    /// For graph changes the control side mirrors: failure is reported to the
    /// caller so both sides stay consistent
    pub fn push_required(&mut self, command: RenderCommand) -> EngineResult<()> {
        if !self.has_room() {
            self.dropped += 1;
            return Err(EngineError::QueueFull);
        }
        self.producer
            .try_push(command)
            .map_err(|_| EngineError::QueueFull)
    }

    /// All voices off and every pending timed command discarded. Never
    /// dropped: when the queue is full its last command is already a halt.
    pub fn halt(&mut self) {
        if self.producer.try_push(RenderCommand::AllVoicesOff).is_err() {
            debug!("halt already queued");
        }
    }

    /// Frame the render engine plays at clock time `seconds`
    pub fn frame_at(&self, seconds: f64) -> u64 {
        self.timing.seconds_to_frame(seconds)
    }

    /// Frame for "as soon as possible"
    pub fn current_frame(&self) -> u64 {
        self.timing.current_sample()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    use crate::messaging::channels::create_command_channel;

    #[test]
    fn test_full_queue_is_counted() {
        let (tx, _rx) = create_command_channel(3);
        let mut sink = CommandSink::new(tx, AudioTiming::new(48000.0));
        assert!(sink.push(RenderCommand::SetMasterVolume(1.0)));
        assert!(sink.push(RenderCommand::SetMasterVolume(1.0)));
        assert!(!sink.push(RenderCommand::SetMasterVolume(1.0)));
        assert!(matches!(
            sink.push_required(RenderCommand::SetMasterVolume(1.0)),
            Err(EngineError::QueueFull)
        ));
        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_halt_uses_reserved_slot() {
        let (tx, mut rx) = create_command_channel(4);
        let mut sink = CommandSink::new(tx, AudioTiming::new(48000.0));
        while sink.push(RenderCommand::SetMetronomeVolume(0.5)) {}
        sink.halt();
        // Full now, and the tail is the halt; a second halt is redundant
        sink.halt();
        assert!(!sink.push(RenderCommand::SetMetronomeVolume(0.5)));

        let queued: Vec<_> = std::iter::from_fn(|| rx.try_pop()).collect();
        assert_eq!(queued.len(), 4);
        assert!(matches!(queued.last(), Some(RenderCommand::AllVoicesOff)));
    }

    #[test]
    fn test_frame_at() {
        let (tx, _rx) = create_command_channel(4);
        let sink = CommandSink::new(tx, AudioTiming::new(48000.0));
        assert_eq!(sink.frame_at(0.5), 24000);
        assert_eq!(sink.current_frame(), 0);
    }
}
