// Connection - audio backend status

pub mod status;

pub use status::{AtomicDeviceStatus, DeviceStatus};
