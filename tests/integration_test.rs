// Integration tests for the async detection pipeline
// These drive the public API end to end with real threads and timing

use game_bot_vision::{
    AsyncDetector, DetectionError, DetectionMode, FallbackReason, FrameImage, PipelineConfig,
    PipelineEvent, ProcessState,
};
use image::Rgba;
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
struct Detection {
    id: u64,
}

type DetectResult = Result<Vec<Detection>, DetectionError>;

/// Helper to create a simple test frame
fn create_test_frame(value: u8) -> FrameImage {
    FrameImage::from_pixel(32, 18, Rgba([value, value, value, 255]))
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Detector that sleeps `latency` and returns `[{id: n}]` for the nth call
fn slow_counting_detector(
    latency: Duration,
) -> impl FnMut(&FrameImage) -> DetectResult + Send + 'static {
    let mut calls = 0u64;
    move |_: &FrameImage| -> DetectResult {
        calls += 1;
        thread::sleep(latency);
        Ok(vec![Detection { id: calls }])
    }
}

#[test]
fn test_end_to_end_overflow_and_fresh_result() {
    let config = PipelineConfig {
        queue_capacity: 3,
        detection_interval: 1,
        ..PipelineConfig::default()
    };
    let detector = AsyncDetector::<Detection>::with_detector(
        slow_counting_detector(Duration::from_millis(50)),
        config,
    )
    .unwrap();
    assert!(detector.start());

    for i in 0..10 {
        detector.submit_frame(&create_test_frame(i));
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(200));

    let stats = detector.get_stats();
    assert!(stats.overflow_count > 0, "expected overflow, got {stats:?}");
    assert!(stats.detection_count >= 1);

    let snapshot = detector.get_result_with_metadata();
    assert!(!snapshot.results.is_empty());
    assert!(snapshot.age() < Duration::from_secs(1));
    assert!(detector.is_result_fresh());

    assert!(detector.stop(Duration::from_secs(1)));
}

#[rstest]
#[case(1, 10, 10)]
#[case(3, 10, 3)]
#[case(4, 7, 1)]
#[case(5, 4, 0)]
fn test_skip_cadence_counts_every_nth_frame(
    #[case] interval: u32,
    #[case] frames: u64,
    #[case] expected: u64,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = PipelineConfig {
        detection_interval: interval,
        queue_capacity: 16,
        ..PipelineConfig::default()
    };
    let detector = AsyncDetector::<Detection>::with_detector(
        move |_: &FrameImage| -> DetectResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        },
        config,
    )
    .unwrap();

    // force_refresh does not advance the submission counter
    detector.force_refresh(&create_test_frame(0));
    let baseline = calls.load(Ordering::SeqCst);

    let forwarded = (0..frames)
        .filter(|i| detector.submit_frame(&create_test_frame(*i as u8)))
        .count() as u64;

    assert_eq!(forwarded, expected);
    assert_eq!(detector.get_stats().frames_submitted, frames);
    // Stopped, not in fallback: forwarded frames wait in the queue
    assert_eq!(calls.load(Ordering::SeqCst), baseline);
}

#[test]
fn test_fallback_is_irreversible_until_restart() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = PipelineConfig {
        detection_interval: 1,
        queue_capacity: 10,
        dequeue_timeout_ms: 20,
        max_consecutive_errors: 5,
        ..PipelineConfig::default()
    };
    let detector = AsyncDetector::<Detection>::with_detector(
        move |_: &FrameImage| -> DetectResult {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 5 {
                Err(DetectionError::failed(format!("failure {n}")))
            } else {
                Ok(vec![Detection { id: n as u64 }])
            }
        },
        config,
    )
    .unwrap();
    let (events, _id) = detector.subscribe();
    assert!(detector.start());

    for i in 0..5 {
        assert!(detector.submit_frame(&create_test_frame(i)));
    }
    assert!(wait_until(Duration::from_secs(2), || detector.is_fallback()));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(detector.mode(), DetectionMode::Fallback);

    // Detector works again, but the pipeline stays synchronous
    assert!(detector.submit_frame(&create_test_frame(9)));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(detector.get_result(), vec![Detection { id: 6 }]);
    assert_eq!(detector.get_result_with_metadata().frame_number, 6);
    assert!(detector.is_fallback());

    let engaged: Vec<_> = events
        .try_iter()
        .filter_map(|e| match e {
            PipelineEvent::FallbackEngaged { reason } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(
        engaged,
        vec![FallbackReason::SustainedFailures {
            consecutive_errors: 5
        }]
    );

    assert!(detector.stop(Duration::from_secs(1)));
    assert!(detector.start());
    assert!(!detector.is_fallback());
    assert!(detector.stop(Duration::from_secs(1)));
}

#[test]
fn test_idle_stop_is_bounded_by_dequeue_timeout() {
    let config = PipelineConfig {
        dequeue_timeout_ms: 100,
        ..PipelineConfig::default()
    };
    let detector = AsyncDetector::<Detection>::with_detector(
        slow_counting_detector(Duration::from_millis(1)),
        config,
    )
    .unwrap();
    assert!(detector.start());
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    assert!(detector.stop(Duration::from_secs(1)));
    // One dequeue timeout plus scheduling slack
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(detector.state(), ProcessState::Stopped);
}

#[test]
fn test_stop_during_slow_detection() {
    let config = PipelineConfig {
        detection_interval: 1,
        dequeue_timeout_ms: 50,
        ..PipelineConfig::default()
    };
    let detector = AsyncDetector::<Detection>::with_detector(
        slow_counting_detector(Duration::from_millis(150)),
        config,
    )
    .unwrap();
    assert!(detector.start());
    detector.submit_frame(&create_test_frame(1));
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    assert!(detector.stop(Duration::from_secs(1)));
    let elapsed = started.elapsed();

    // In-flight detection finishes, nothing more is started
    assert!(elapsed < Duration::from_millis(600), "stop took {elapsed:?}");
    assert_eq!(detector.get_result(), vec![Detection { id: 1 }]);
}

#[test]
fn test_lifecycle_idempotence() {
    let detector = AsyncDetector::<Detection>::with_detector(
        slow_counting_detector(Duration::from_millis(1)),
        PipelineConfig {
            dequeue_timeout_ms: 20,
            ..PipelineConfig::default()
        },
    )
    .unwrap();

    assert!(detector.stop(Duration::from_millis(10)));
    assert!(detector.start());
    assert!(detector.start());
    assert!(detector.is_running());
    assert!(detector.stop(Duration::from_secs(1)));
    assert!(detector.stop(Duration::from_secs(1)));
    assert!(detector.start());
    assert!(detector.stop(Duration::from_secs(1)));
}

#[test]
fn test_state_change_events_follow_lifecycle() {
    let detector = AsyncDetector::<Detection>::with_detector(
        slow_counting_detector(Duration::from_millis(1)),
        PipelineConfig {
            dequeue_timeout_ms: 20,
            ..PipelineConfig::default()
        },
    )
    .unwrap();
    let (events, id) = detector.subscribe();

    assert!(detector.start());
    assert!(detector.stop(Duration::from_secs(1)));

    let transitions: Vec<&'static str> = events
        .try_iter()
        .filter_map(|e| match e {
            PipelineEvent::StateChanged { new_state, .. } => Some(new_state.description()),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec!["Starting...", "Running (async)", "Stopping...", "Stopped"]
    );

    detector.unsubscribe(id);
    assert!(detector.start());
    assert!(events.try_recv().is_err());
}

#[test]
fn test_concurrent_readers_during_detection() {
    let config = PipelineConfig {
        detection_interval: 1,
        queue_capacity: 3,
        dequeue_timeout_ms: 20,
        ..PipelineConfig::default()
    };
    let detector = Arc::new(
        AsyncDetector::<Detection>::with_detector(
            |image: &FrameImage| -> DetectResult {
                let value = u64::from(image.get_pixel(0, 0)[0]);
                Ok(vec![Detection { id: value }; 16])
            },
            config,
        )
        .unwrap(),
    );
    assert!(detector.start());

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let detector = Arc::clone(&detector);
            thread::spawn(move || {
                for _ in 0..500 {
                    let results = detector.get_result();
                    if let Some(first) = results.first() {
                        assert_eq!(results.len(), 16);
                        assert!(results.iter().all(|d| d == first));
                    }
                }
            })
        })
        .collect();

    for i in 0..100u8 {
        detector.submit_frame(&create_test_frame(i));
        thread::sleep(Duration::from_millis(1));
    }
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(detector.stop(Duration::from_secs(1)));
}

#[test]
fn test_session_guard_stops_on_drop() {
    let detector = AsyncDetector::<Detection>::with_detector(
        slow_counting_detector(Duration::from_millis(5)),
        PipelineConfig {
            detection_interval: 1,
            dequeue_timeout_ms: 20,
            ..PipelineConfig::default()
        },
    )
    .unwrap();

    {
        let session = detector.session();
        assert!(session.started());
        session.submit_frame(&create_test_frame(1));
        assert!(wait_until(Duration::from_secs(2), || !session
            .get_result()
            .is_empty()));
    }

    assert!(detector.state().is_stopped());
    assert_eq!(detector.get_result(), vec![Detection { id: 1 }]);
}

#[test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!(
        "game-bot-vision-config-{}.json",
        std::process::id()
    ));
    std::fs::write(&path, r#"{ "queue_capacity": 6, "detection_interval": 2 }"#).unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.queue_capacity, 6);
    assert_eq!(config.effective_interval(), 2);
    assert_eq!(config.max_consecutive_errors, 5);

    let detector = AsyncDetector::<Detection>::new(config).unwrap();
    assert_eq!(detector.get_stats().queue_depth, 0);
}
