use std::ops::Deref;
use tracing::warn;

use super::async_detector::AsyncDetector;

/// Scoped detection run
///
/// Starts the detector on creation and stops it, with the configured stop
/// timeout, when dropped.
pub struct DetectionSession<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    detector: &'a AsyncDetector<T>,
    started: bool,
}

impl<'a, T> DetectionSession<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(detector: &'a AsyncDetector<T>) -> Self {
        let started = detector.start();
        if !started {
            warn!("Detection session opened without a running detector");
        }
        Self { detector, started }
    }

    /// Whether `start` succeeded when the session opened
    pub fn started(&self) -> bool {
        self.started
    }
}

impl<T> Deref for DetectionSession<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    type Target = AsyncDetector<T>;

    fn deref(&self) -> &Self::Target {
        self.detector
    }
}

impl<T> Drop for DetectionSession<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let timeout = self.detector.config().stop_timeout();
        if !self.detector.stop(timeout) {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Detection session closed before the worker exited"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PipelineConfig;
    use crate::detection::{AsyncDetector, FrameImage};
    use crate::error::DetectionError;

    fn config() -> PipelineConfig {
        PipelineConfig {
            dequeue_timeout_ms: 20,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_session_starts_and_stops() {
        let detector = AsyncDetector::<u8>::with_detector(
            |_: &FrameImage| -> Result<Vec<u8>, DetectionError> { Ok(vec![1]) },
            config(),
        )
        .unwrap();

        {
            let session = detector.session();
            assert!(session.started());
            assert!(session.is_running());
        }

        assert!(detector.state().is_stopped());
    }

    #[test]
    fn test_session_without_detector() {
        let detector = AsyncDetector::<u8>::new(config()).unwrap();
        {
            let session = detector.session();
            assert!(!session.started());
            assert!(!session.is_running());
        }
        assert!(detector.state().is_stopped());
    }
}
