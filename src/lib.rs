//! Voice pitch and timbre analysis: per-frame F0 estimation, smoothing, band
//! classification, a scrolling spectrogram and session-level statistics.

pub mod audio;
pub mod config;
pub mod encode;
pub mod pitch;
pub mod render;
pub mod session;
pub mod upload;
