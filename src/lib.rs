//! Asynchronous object detection pipeline for a game-client bot.
//!
//! A capture loop submits frames at its own pace; a dedicated worker runs the
//! (slow) detector on a bounded subset of them, and the rule engine reads the
//! freshest completed result without ever waiting on detection.

pub mod config;
pub mod detection;
pub mod error;
pub mod messaging;
pub mod state;
pub mod utils;

pub use config::PipelineConfig;
pub use detection::{
    AsyncDetector, CacheSnapshot, DetectionSession, Detector, DetectorStats, FrameImage,
};
pub use error::{ConfigError, DetectionError};
pub use messaging::{FallbackReason, PipelineEvent};
pub use state::{DetectionMode, ProcessState};
