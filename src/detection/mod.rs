/// Detection module
///
/// Decouples a slow, blocking detector from the real-time capture loop.
///
/// ## Architecture
///
/// ```text
/// submit_frame ──(every Nth)──> FrameQueue ──> worker thread ──> Detector
///      │                                            │
///      │ (fallback: same thread)                    ├──> ResultCache
///      └────────────────────> Detector              └──> LatencyMonitor
///
/// get_result ───────────────────────────────────────────> ResultCache
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let detector = AsyncDetector::with_detector(model, PipelineConfig::default())?;
/// let session = detector.session();
///
/// loop {
///     let frame = capture.next_frame();
///     session.submit_frame(&frame);
///
///     if let Some(objects) = session.get_fresh_result() {
///         rules.apply(&objects);
///     }
/// }
/// ```

pub mod async_detector;
pub mod detector;
pub mod frame_queue;
pub mod latency_monitor;
pub mod result_cache;
pub mod session;
mod worker;

// Re-export commonly used types
pub use async_detector::{AsyncDetector, DetectorStats};
pub use detector::{Detector, FrameImage};
pub use frame_queue::{FrameQueue, FrameTask};
pub use latency_monitor::{LatencyMonitor, LatencySnapshot};
pub use result_cache::{CacheSnapshot, ResultCache};
pub use session::DetectionSession;
pub use worker::CancellationToken;
