/// Messaging module for pipeline notifications
///
/// The detector publishes **events** (things that happened: state changes,
/// fallback, failed detections, stop timeouts) on an [`EventBus`]. Any number
/// of observers subscribe and drain their own channel at their own pace.
///
/// ```text
/// ┌──────────────┐    publish     ┌───────────┐   try_send   ┌────────────┐
/// │ AsyncDetector│ ─────────────> │ Event Bus │ ───────────> │ Subscriber │
/// │  + worker    │                │           │              │ (rule eng.)│
/// └──────────────┘                └───────────┘              └────────────┘
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let (rx, _id) = detector.subscribe();
///
/// while let Ok(event) = rx.try_recv() {
///     if let PipelineEvent::FallbackEngaged { reason } = event {
///         tracing::warn!("pipeline degraded: {reason:?}");
///     }
/// }
/// ```

pub mod bus;
pub mod events;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId, SUBSCRIBER_CAPACITY};
pub use events::{FallbackReason, PipelineEvent};
