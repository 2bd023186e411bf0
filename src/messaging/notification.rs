// Notifications - Session → listeners
//
// Transport and sequencer events plus degraded-state messages, pushed into a
// bounded ring buffer. A full buffer drops the newest notification.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::sequencer::pattern::PatternId;
use crate::sequencer::transport::TransportEvent;

/// Niveau de sévérité d'un message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Catégorie de message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Audio,
    Sequencer,
    Cpu,
    Generic,
}

/// Message avec timestamp et métadonnées
#[derive(Debug, Clone)]
pub struct Message {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub text: String,
    /// Unix timestamp en millisecondes
    pub timestamp: u64,
}

impl Message {
    pub fn new(level: NotificationLevel, category: NotificationCategory, text: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            level,
            category,
            text: text.into(),
            timestamp,
        }
    }

    pub fn info(category: NotificationCategory, text: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, category, text)
    }

    pub fn warning(category: NotificationCategory, text: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, category, text)
    }

    pub fn error(category: NotificationCategory, text: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, category, text)
    }
}

#[derive(Debug, Clone)]
pub enum Notification {
    /// PlaybackStarted, Paused, Stopped, Beat, Bar, LoopWrapped, Seeked,
    /// TempoChanged
    Transport(TransportEvent),
    PatternChanged { pattern: Option<PatternId> },
    Message(Message),
}

impl Notification {
    pub fn is_transport(&self) -> bool {
        matches!(self, Notification::Transport(_))
    }
}

impl From<TransportEvent> for Notification {
    fn from(event: TransportEvent) -> Self {
        Notification::Transport(event)
    }
}

impl From<Message> for Notification {
    fn from(message: Message) -> Self {
        Notification::Message(message)
    }
}
