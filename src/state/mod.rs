/// State management module
///
/// Lifecycle state of the detection pipeline and its transitions.

pub mod process_state;

// Re-export commonly used types
pub use process_state::{DetectionMode, ProcessState, ProcessStateMachine, TransitionError};
