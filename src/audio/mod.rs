//! Audio capture: frame sources, voice classification, recording sinks.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod classifier;
pub mod sink;
pub mod source;
