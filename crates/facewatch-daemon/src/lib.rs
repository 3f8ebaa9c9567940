//! facewatch-daemon: Background capture worker for facewatch
//!
//! This crate provides:
//! - The capture-source seam over camera hardware
//! - The long-lived capture loop driving recognition on live frames
//! - Per-identity cooldown for recognition events
//! - Daemon configuration loading

pub mod capture;
pub mod config;
pub mod cooldown;
pub mod worker;

// Re-exports for convenience
pub use capture::{CaptureSource, CaptureSourceFactory, Frame};
pub use config::{load_config, Config};
pub use cooldown::CooldownTable;
pub use worker::{CaptureConfig, CaptureService, RecognitionEvent};
