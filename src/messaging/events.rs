/// Event types for the detection pipeline
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers.
use std::time::Duration;

use crate::state::ProcessState;

/// Pipeline events
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Lifecycle state changed
    StateChanged {
        old_state: ProcessState,
        new_state: ProcessState,
    },

    /// Detection moved to the submitting thread
    FallbackEngaged { reason: FallbackReason },

    /// A single detector invocation on the worker failed
    DetectionFailed {
        frame_number: u64,
        consecutive_errors: u32,
        message: String,
    },

    /// The worker did not exit before the stop deadline
    StopTimedOut { timeout: Duration },
}

/// Why the pipeline switched to synchronous detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The worker hit the consecutive-error ceiling
    SustainedFailures { consecutive_errors: u32 },

    /// The worker thread could not be spawned
    LaunchFailed { message: String },
}

impl PipelineEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PipelineEvent::StateChanged { new_state, .. } => {
                format!("Process state: {}", new_state.description())
            }
            PipelineEvent::FallbackEngaged { reason } => match reason {
                FallbackReason::SustainedFailures { consecutive_errors } => format!(
                    "Fallback engaged after {} consecutive detection errors",
                    consecutive_errors
                ),
                FallbackReason::LaunchFailed { message } => {
                    format!("Fallback engaged, worker launch failed: {}", message)
                }
            },
            PipelineEvent::DetectionFailed {
                frame_number,
                message,
                ..
            } => format!("Detection failed on frame {}: {}", frame_number, message),
            PipelineEvent::StopTimedOut { timeout } => {
                format!("Worker did not stop within {}ms", timeout.as_millis())
            }
        }
    }
}
