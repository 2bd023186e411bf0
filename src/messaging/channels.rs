// Communication channels lock-free

use ringbuf::{HeapRb, traits::Split};

use crate::messaging::command::{RenderCommand, Retired};
use crate::messaging::notification::Notification;

pub type CommandProducer = ringbuf::HeapProd<RenderCommand>;
pub type CommandConsumer = ringbuf::HeapCons<RenderCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    HeapRb::<RenderCommand>::new(capacity.max(1)).split()
}

/// Render → control, for deferred deallocation
pub type RetireProducer = ringbuf::HeapProd<Retired>;
pub type RetireConsumer = ringbuf::HeapCons<Retired>;

pub fn create_retire_channel(capacity: usize) -> (RetireProducer, RetireConsumer) {
    HeapRb::<Retired>::new(capacity.max(1)).split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    HeapRb::<Notification>::new(capacity.max(1)).split()
}
