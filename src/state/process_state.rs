/// Detection process state machine
///
/// Represents the lifecycle of the detection worker with clear state transitions.

use serde::Serialize;
use std::time::Instant;

/// Where detection work runs while the pipeline is active
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Frames are queued and processed by the dedicated worker thread
    Async,

    /// Frames are processed synchronously on the submitting thread
    Fallback,
}

impl DetectionMode {
    pub fn label(&self) -> &'static str {
        match self {
            DetectionMode::Async => "async",
            DetectionMode::Fallback => "fallback",
        }
    }
}

/// State of the detection process
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessState {
    /// Worker is not running
    Stopped,

    /// Worker is being launched (transitional state)
    Starting,

    /// Pipeline is accepting frames
    Running { since: Instant, mode: DetectionMode },

    /// Stop was requested, worker has not exited yet (transitional state)
    Stopping,
}

impl ProcessState {
    /// Check if detection is stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessState::Stopped)
    }

    /// Check if detection is running (in either mode)
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }

    /// Get the time since the pipeline started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        match self {
            ProcessState::Running { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }

    /// Get a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "Stopped",
            ProcessState::Starting => "Starting...",
            ProcessState::Running {
                mode: DetectionMode::Async,
                ..
            } => "Running (async)",
            ProcessState::Running {
                mode: DetectionMode::Fallback,
                ..
            } => "Running (fallback)",
            ProcessState::Stopping => "Stopping...",
        }
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::Stopped
    }
}

/// State transition results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Cannot start when already running
    AlreadyRunning,

    /// Cannot stop when already stopped
    AlreadyStopped,

    /// Cannot perform this action during a transition
    InTransition,

    /// Fallback can only be entered from Starting or Running
    NotActive,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::AlreadyRunning => write!(f, "Detection is already running"),
            TransitionError::AlreadyStopped => write!(f, "Detection is already stopped"),
            TransitionError::InTransition => {
                write!(f, "Cannot perform action during state transition")
            }
            TransitionError::NotActive => write!(f, "Detection is not active"),
        }
    }
}

impl std::error::Error for TransitionError {}

/// State machine for process transitions
///
/// The fallback flag outlives the `Running` state: once set it stays set
/// across `stop()` and is only cleared by the next `start()`.
pub struct ProcessStateMachine {
    state: ProcessState,
    fallback: bool,
}

impl ProcessStateMachine {
    /// Create a new state machine in the Stopped state
    pub fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            fallback: false,
        }
    }

    /// Get the current state
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Mode used for new submissions
    pub fn mode(&self) -> DetectionMode {
        if self.fallback {
            DetectionMode::Fallback
        } else {
            DetectionMode::Async
        }
    }

    /// Transition to Starting state
    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ProcessState::Stopped => {
                self.state = ProcessState::Starting;
                self.fallback = false;
                Ok(())
            }
            ProcessState::Running { .. } => Err(TransitionError::AlreadyRunning),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Transition from Starting to Running with the async worker
    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ProcessState::Starting => {
                self.state = ProcessState::Running {
                    since: Instant::now(),
                    mode: DetectionMode::Async,
                };
                Ok(())
            }
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Switch to synchronous fallback.
    ///
    /// From `Starting` this models a failed worker launch; from
    /// `Running(Async)` it models a worker that gave up. Entering fallback
    /// twice is a no-op.
    pub fn enter_fallback(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ProcessState::Starting => {
                self.state = ProcessState::Running {
                    since: Instant::now(),
                    mode: DetectionMode::Fallback,
                };
                self.fallback = true;
                Ok(())
            }
            ProcessState::Running { since, .. } => {
                self.state = ProcessState::Running {
                    since,
                    mode: DetectionMode::Fallback,
                };
                self.fallback = true;
                Ok(())
            }
            ProcessState::Stopping => Err(TransitionError::InTransition),
            ProcessState::Stopped => Err(TransitionError::NotActive),
        }
    }

    /// Transition to Stopping state
    pub fn stop(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ProcessState::Running { .. } => {
                self.state = ProcessState::Stopping;
                Ok(())
            }
            ProcessState::Stopped => Err(TransitionError::AlreadyStopped),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Transition from Stopping to Stopped
    pub fn mark_stopped(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ProcessState::Stopping => {
                self.state = ProcessState::Stopped;
                Ok(())
            }
            _ => Err(TransitionError::InTransition),
        }
    }
}

impl Default for ProcessStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
