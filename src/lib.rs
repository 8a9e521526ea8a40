//! segplay - kiosk playback engine for time-segmented camera recordings
//!
//! Re-exports all modules for use by the binary target.

// Core engine (index, cache, decoder, show, commander)
pub mod core;

// Collaborators and app modules
pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod mats;
pub mod server;
pub mod sink;

// Re-export commonly used types from core
pub use crate::core::commander::Commander;
pub use crate::core::context::{PlaybackContext, PlayerHandle};
pub use crate::core::speed::Speed;
pub use sink::{DisplaySink, NullSink};
