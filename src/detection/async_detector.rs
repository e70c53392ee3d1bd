/// Asynchronous detection orchestrator
///
/// Owns the frame queue, result cache and latency monitor, runs the detector
/// on a dedicated worker thread and degrades to synchronous detection on the
/// caller's thread when the worker cannot be launched or keeps failing.
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::detector::{invoke, Detector, FrameImage};
use super::frame_queue::FrameQueue;
use super::latency_monitor::LatencyMonitor;
use super::result_cache::{CacheSnapshot, ResultCache};
use super::session::DetectionSession;
use super::worker::{spawn_worker, WorkerHandle};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, DetectionError};
use crate::messaging::{EventBus, FallbackReason, PipelineEvent, SubscriberId};
use crate::state::{DetectionMode, ProcessState, ProcessStateMachine, TransitionError};
use crate::utils::{round_to, Timer};

/// State shared between the caller-facing handle and the worker thread
pub(crate) struct Shared<T> {
    pub(crate) config: PipelineConfig,
    pub(crate) queue: FrameQueue,
    pub(crate) cache: ResultCache<T>,
    pub(crate) monitor: LatencyMonitor,
    pub(crate) detector: Mutex<Option<Box<dyn Detector<T>>>>,
    pub(crate) state: Mutex<ProcessStateMachine>,
    pub(crate) consecutive_errors: AtomicU32,
    pub(crate) events: EventBus,
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(config: PipelineConfig, detector: Option<Box<dyn Detector<T>>>) -> Self {
        Self {
            queue: FrameQueue::new(config.queue_capacity),
            cache: ResultCache::new(),
            monitor: LatencyMonitor::new(config.latency_window),
            detector: Mutex::new(detector),
            state: Mutex::new(ProcessStateMachine::new()),
            consecutive_errors: AtomicU32::new(0),
            events: EventBus::new(),
            config,
        }
    }

    /// Run the detector once and record its latency on success.
    ///
    /// Holds the detector lock for the whole call, so detections never
    /// overlap.
    pub(crate) fn detect(&self, image: &FrameImage) -> Result<Vec<T>, DetectionError> {
        let mut slot = self.detector.lock();
        let detector = slot.as_deref_mut().ok_or(DetectionError::NotConfigured)?;

        let timer = Timer::start();
        let results = invoke(detector, image)?;
        self.monitor.record_duration(timer.elapsed());
        Ok(results)
    }

    /// Apply a state-machine transition and publish the change
    pub(crate) fn transition<F>(&self, apply: F) -> Result<ProcessState, TransitionError>
    where
        F: FnOnce(&mut ProcessStateMachine) -> Result<(), TransitionError>,
    {
        let (old_state, new_state) = {
            let mut machine = self.state.lock();
            let old_state = machine.state();
            apply(&mut machine)?;
            (old_state, machine.state())
        };

        if old_state != new_state {
            debug!(
                from = old_state.description(),
                to = new_state.description(),
                "Detection state changed"
            );
            self.events.publish(PipelineEvent::StateChanged {
                old_state,
                new_state,
            });
        }
        Ok(new_state)
    }
}

/// Serializable snapshot of the pipeline's health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorStats {
    pub mean_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub detection_count: u64,
    pub queue_depth: usize,
    pub overflow_count: u64,
    /// `None` until the first detection completes
    pub cache_age_secs: Option<f64>,
    pub frames_submitted: u64,
    pub consecutive_errors: u32,
    pub mode: DetectionMode,
    pub state: String,
    pub running: bool,
    /// Seconds since the pipeline entered `Running`; `None` otherwise
    pub uptime_secs: Option<f64>,
}

impl DetectorStats {
    /// Write a human-readable summary to the log
    pub fn log_report(&self) {
        info!("╔══════════════════════════════════════════╗");
        info!("║        Async Detection Statistics        ║");
        info!("╚══════════════════════════════════════════╝");
        info!("  Detections:      {}", self.detection_count);
        info!("  Mean latency:    {:.2} ms", self.mean_latency_ms);
        info!("  Min latency:     {:.2} ms", self.min_latency_ms);
        info!("  Max latency:     {:.2} ms", self.max_latency_ms);
        info!("  p50 / p95:       {:.2} / {:.2} ms", self.p50_latency_ms, self.p95_latency_ms);
        info!("  Queue depth:     {}", self.queue_depth);
        info!("  Overflows:       {}", self.overflow_count);
        match self.cache_age_secs {
            Some(age) => info!("  Cache age:       {:.3} s", age),
            None => info!("  Cache age:       (no result yet)"),
        }
        info!("  Frames seen:     {}", self.frames_submitted);
        info!("  Mode:            {}", self.mode.label());
        info!("  State:           {}", self.state);
        if let Some(uptime) = self.uptime_secs {
            info!("  Uptime:          {:.1} s", uptime);
        }
    }
}

type SpawnFn<T> = fn(Arc<Shared<T>>) -> io::Result<WorkerHandle>;

/// Asynchronous detector
///
/// All methods take `&self`; wrap in an `Arc` to share between the capture
/// loop and other observers.
pub struct AsyncDetector<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<WorkerHandle>>,
    submitted: AtomicU64,
    spawn: SpawnFn<T>,
}

impl<T> AsyncDetector<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a detector with no model attached; `start` fails until
    /// [`set_detector`](Self::set_detector) is called.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    pub fn with_detector<D>(detector: D, config: PipelineConfig) -> Result<Self, ConfigError>
    where
        D: Detector<T> + 'static,
    {
        let detector: Box<dyn Detector<T>> = Box::new(detector);
        Self::build(config, Some(detector))
    }

    fn build(
        config: PipelineConfig,
        detector: Option<Box<dyn Detector<T>>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, detector)),
            worker: Mutex::new(None),
            submitted: AtomicU64::new(0),
            spawn: spawn_worker::<T>,
        })
    }

    /// Inject or replace the detector. Takes effect on the next detection.
    pub fn set_detector<D>(&self, detector: D)
    where
        D: Detector<T> + 'static,
    {
        info!(detector = detector.name(), "Detector configured");
        let detector: Box<dyn Detector<T>> = Box::new(detector);
        *self.shared.detector.lock() = Some(detector);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Launch the worker thread.
    ///
    /// Returns `false` only when no detector is set or a previous worker is
    /// still shutting down. A worker that cannot be spawned leaves the
    /// pipeline running in fallback mode.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock();

        match self.state() {
            ProcessState::Running { .. } => {
                debug!("Detection already running");
                return true;
            }
            ProcessState::Stopping => {
                if !self.reap_lingering_worker(&mut worker) {
                    warn!("Previous detection worker is still running, cannot start");
                    return false;
                }
            }
            ProcessState::Starting | ProcessState::Stopped => {}
        }

        if self.shared.detector.lock().is_none() {
            error!("Cannot start detection: no detector configured");
            return false;
        }

        self.shared.consecutive_errors.store(0, Ordering::SeqCst);
        if let Err(err) = self.shared.transition(|sm| sm.start()) {
            warn!("Cannot start detection: {err}");
            return false;
        }

        match (self.spawn)(Arc::clone(&self.shared)) {
            Ok(handle) => {
                *worker = Some(handle);
                // The worker may already have switched to fallback.
                if let Err(err) = self.shared.transition(|sm| sm.mark_running()) {
                    debug!("Worker changed state during launch: {err}");
                }
                info!("Async detection started");
            }
            Err(err) => {
                error!("Failed to spawn detection worker, using synchronous fallback: {err}");
                if self.shared.transition(|sm| sm.enter_fallback()).is_ok() {
                    self.shared.events.publish(PipelineEvent::FallbackEngaged {
                        reason: FallbackReason::LaunchFailed {
                            message: err.to_string(),
                        },
                    });
                }
            }
        }
        true
    }

    /// Finish a stop that previously timed out, if its worker has exited
    fn reap_lingering_worker(&self, worker: &mut Option<WorkerHandle>) -> bool {
        match worker.take() {
            Some(handle) if !handle.is_finished() => {
                *worker = Some(handle);
                false
            }
            Some(handle) => {
                handle.join();
                self.finish_stop();
                true
            }
            None => {
                self.finish_stop();
                true
            }
        }
    }

    fn finish_stop(&self) {
        let dropped = self.shared.queue.clear();
        if let Err(err) = self.shared.transition(|sm| sm.mark_stopped()) {
            debug!("Unexpected state at stop: {err}");
        }
        info!(dropped_frames = dropped, "Async detection stopped");
    }

    /// Signal the worker and wait up to `timeout` for it to exit.
    ///
    /// Returns `true` if the pipeline is stopped on return. On timeout the
    /// worker is left to finish on its own and a later call waits again.
    pub fn stop(&self, timeout: Duration) -> bool {
        let mut worker = self.worker.lock();

        match self.state() {
            ProcessState::Stopped => return true,
            ProcessState::Starting => return false,
            ProcessState::Running { .. } => {
                if let Err(err) = self.shared.transition(|sm| sm.stop()) {
                    warn!("Cannot stop detection: {err}");
                    return false;
                }
                info!("Stopping async detection");
            }
            ProcessState::Stopping => {}
        }

        let Some(handle) = worker.take() else {
            self.finish_stop();
            return true;
        };

        handle.cancel();
        if !handle.wait(timeout) {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Detection worker did not stop within the timeout"
            );
            self.shared
                .events
                .publish(PipelineEvent::StopTimedOut { timeout });
            *worker = Some(handle);
            return false;
        }

        handle.join();
        self.finish_stop();
        true
    }

    /// Submit a captured frame.
    ///
    /// Only every Nth call (the detection interval) does any work. Returns
    /// `true` if the frame was queued or, in fallback mode, detected.
    pub fn submit_frame(&self, image: &FrameImage) -> bool {
        let count = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.shared.config.effective_interval() != 0 {
            return false;
        }

        if self.is_fallback() {
            return self.detect_sync(image, count);
        }
        self.shared.queue.enqueue(image)
    }

    fn detect_sync(&self, image: &FrameImage, frame_number: u64) -> bool {
        match self.shared.detect(image) {
            Ok(results) => {
                self.shared.cache.update(results, frame_number);
                true
            }
            Err(err) => {
                error!(frame_number, "Synchronous detection failed: {err}");
                false
            }
        }
    }

    /// Detect on the calling thread regardless of mode.
    ///
    /// On failure the previously cached results are returned.
    pub fn force_refresh(&self, image: &FrameImage) -> Vec<T> {
        let frame_number = self.submitted.load(Ordering::SeqCst);
        match self.shared.detect(image) {
            Ok(results) => {
                self.shared.cache.update(results.clone(), frame_number);
                results
            }
            Err(err) => {
                error!("Forced refresh failed: {err}");
                self.shared.cache.results()
            }
        }
    }

    /// Latest results, never blocking on detection
    pub fn get_result(&self) -> Vec<T> {
        self.shared.cache.results()
    }

    pub fn get_result_with_metadata(&self) -> CacheSnapshot<T> {
        self.shared.cache.read()
    }

    /// Latest results if younger than `max_cache_age`
    pub fn get_fresh_result(&self) -> Option<Vec<T>> {
        let snapshot = self.shared.cache.read();
        (snapshot.age() <= self.shared.config.max_cache_age()).then_some(snapshot.results)
    }

    pub fn is_result_fresh(&self) -> bool {
        self.shared.cache.is_fresh(self.shared.config.max_cache_age())
    }

    pub fn get_stats(&self) -> DetectorStats {
        let latency = self.shared.monitor.snapshot();
        let cache = &self.shared.cache;
        let cache_age = cache.has_result().then(|| cache.age());
        let (mode, state) = {
            let machine = self.shared.state.lock();
            (machine.mode(), machine.state())
        };

        DetectorStats {
            mean_latency_ms: round_to(latency.mean_ms, 2),
            min_latency_ms: round_to(latency.min_ms, 2),
            max_latency_ms: round_to(latency.max_ms, 2),
            p50_latency_ms: round_to(latency.p50_ms, 2),
            p95_latency_ms: round_to(latency.p95_ms, 2),
            detection_count: latency.count,
            queue_depth: self.shared.queue.depth(),
            overflow_count: self.shared.queue.overflow_count(),
            cache_age_secs: cache_age.map(|age| round_to(age.as_secs_f64(), 3)),
            frames_submitted: self.submitted.load(Ordering::SeqCst),
            consecutive_errors: self.shared.consecutive_errors.load(Ordering::SeqCst),
            mode,
            state: state.description().to_string(),
            running: state.is_running(),
            uptime_secs: state
                .running_duration()
                .map(|uptime| round_to(uptime.as_secs_f64(), 3)),
        }
    }

    /// Log current statistics
    pub fn log_stats(&self) {
        self.get_stats().log_report();
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Whether new frames are detected synchronously
    pub fn is_fallback(&self) -> bool {
        self.mode() == DetectionMode::Fallback
    }

    pub fn mode(&self) -> DetectionMode {
        self.shared.state.lock().mode()
    }

    pub fn state(&self) -> ProcessState {
        self.shared.state.lock().state()
    }

    /// Receive lifecycle and failure events.
    ///
    /// Each receiver buffers up to [`SUBSCRIBER_CAPACITY`](crate::messaging::SUBSCRIBER_CAPACITY) events; once full,
    /// further events are dropped for that subscriber until it drains.
    pub fn subscribe(&self) -> (Receiver<PipelineEvent>, SubscriberId) {
        self.shared.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.events.unsubscribe(id);
    }

    /// Start detection for the lifetime of the returned guard
    pub fn session(&self) -> DetectionSession<'_, T> {
        DetectionSession::new(self)
    }
}

impl<T> Drop for AsyncDetector<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let timeout = self.shared.config.stop_timeout();
        if !self.stop(timeout) {
            warn!("Detection worker still running after detector was dropped");
        }
    }
}
