// Messaging - lock-free channels between the session and the render engine

pub mod channels;
pub mod command;
pub mod notification;

pub use command::{RenderCommand, Retired};
pub use notification::{Message, Notification};
