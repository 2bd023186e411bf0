// Module audio - Backend CPAL, moteur de rendu temps-réel et mixer

pub mod backend;
pub mod cpu_monitor;
pub mod dsp_utils;
pub mod engine;
pub mod format_conversion;
pub mod metering;
pub mod mixer;
pub mod parameters;
pub mod routing;
pub mod timing;

pub use backend::{CpalBackend, OfflineBackend, RenderBackend};
pub use engine::{EngineLink, RenderEngine};
pub use timing::{AudioTiming, Clock, ManualClock};
