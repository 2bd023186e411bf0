// Status du backend audio
//
// Written by the backend (stream start, error callback), read by the session
// before every tick and dispatch.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Error = 3,
}

impl DeviceStatus {
    pub fn is_ready(self) -> bool {
        self == DeviceStatus::Connected
    }
}

impl From<u8> for DeviceStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => DeviceStatus::Connecting,
            2 => DeviceStatus::Connected,
            3 => DeviceStatus::Error,
            _ => DeviceStatus::Disconnected,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Status partagé entre threads
#[derive(Clone, Debug)]
pub struct AtomicDeviceStatus {
    inner: Arc<AtomicU8>,
}

impl AtomicDeviceStatus {
    pub fn new(status: DeviceStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(status as u8)),
        }
    }

    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, status: DeviceStatus) {
        self.inner.store(status as u8, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_ready()
    }
}

impl Default for AtomicDeviceStatus {
    fn default() -> Self {
        Self::new(DeviceStatus::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_shared_between_clones() {
        let status = AtomicDeviceStatus::default();
        let reader = status.clone();
        assert!(!reader.is_ready());

        status.set(DeviceStatus::Connected);
        assert!(reader.is_ready());
        assert_eq!(reader.get().to_string(), "connected");

        status.set(DeviceStatus::Error);
        assert_eq!(reader.get(), DeviceStatus::Error);
    }

    #[test]
    fn test_unknown_value_is_disconnected() {
        assert_eq!(DeviceStatus::from(42), DeviceStatus::Disconnected);
    }
}
