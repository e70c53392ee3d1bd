/// Bounded frame queue between the submitting thread and the worker
///
/// Submission never blocks: when the queue is full the frame is rejected and
/// counted, never swapped in for an older one. The caller decides whether to
/// retry.
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::detector::FrameImage;

/// One frame waiting for detection
#[derive(Debug)]
pub struct FrameTask {
    /// Private copy of the submitted pixels
    pub image: FrameImage,
    pub submitted_at: Instant,
    pub frame_number: u64,
}

pub struct FrameQueue {
    sender: Sender<FrameTask>,
    receiver: Receiver<FrameTask>,
    capacity: usize,
    next_frame: AtomicU64,
    overflow: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            next_frame: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
        }
    }

    /// Copy `image` into a new task and try to queue it.
    ///
    /// Every call consumes a frame number, accepted or not.
    pub fn enqueue(&self, image: &FrameImage) -> bool {
        let frame_number = self.next_frame.fetch_add(1, Ordering::SeqCst) + 1;
        let task = FrameTask {
            image: image.clone(),
            submitted_at: Instant::now(),
            frame_number,
        };

        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflow.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(frame_number, "Frame queue full, dropping frame");
                false
            }
            // Both ends live in `self`, so the channel cannot disconnect.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Wait up to `timeout` for the next task.
    pub fn dequeue(&self, timeout: Duration) -> Option<FrameTask> {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => Some(task),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drop every pending task, returning how many were discarded
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn depth(&self) -> usize {
        self.receiver.len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frame numbers handed out so far
    pub fn frames_assigned(&self) -> u64 {
        self.next_frame.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;

    fn frame(value: u8) -> FrameImage {
        FrameImage::from_pixel(8, 8, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_basic_enqueue_dequeue() {
        let queue = FrameQueue::new(3);

        assert!(queue.enqueue(&frame(1)));
        assert_eq!(queue.depth(), 1);

        let task = queue.dequeue(Duration::from_millis(10)).unwrap();
        assert_eq!(task.frame_number, 1);
        assert_eq!(task.image.get_pixel(0, 0), &Rgba([1, 1, 1, 255]));
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn test_dequeue_times_out_when_empty() {
        let queue = FrameQueue::new(3);
        let started = Instant::now();

        assert!(queue.dequeue(Duration::from_millis(50)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_image_is_copied_on_submit() {
        let queue = FrameQueue::new(3);
        let mut image = frame(10);

        queue.enqueue(&image);
        image.put_pixel(0, 0, Rgba([99, 99, 99, 255]));

        let task = queue.dequeue(Duration::from_millis(10)).unwrap();
        assert_eq!(task.image.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
    }

    #[test]
    fn test_frame_numbers_increase_in_submission_order() {
        let queue = FrameQueue::new(5);
        for i in 0..5 {
            queue.enqueue(&frame(i));
        }

        let numbers: Vec<u64> = (0..5)
            .map(|_| queue.dequeue(Duration::from_millis(10)).unwrap().frame_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(3, 10)]
    #[case(5, 5)]
    #[case(2, 0)]
    fn test_overflow_counted_exactly(#[case] capacity: usize, #[case] submissions: usize) {
        let queue = FrameQueue::new(capacity);
        let mut accepted = 0;

        for i in 0..submissions {
            if queue.enqueue(&frame(i as u8)) {
                accepted += 1;
            }
            assert!(queue.depth() <= capacity);
        }

        let expected_overflow = submissions.saturating_sub(capacity);
        assert_eq!(accepted, submissions - expected_overflow);
        assert_eq!(queue.overflow_count(), expected_overflow as u64);
        assert_eq!(queue.frames_assigned(), submissions as u64);
    }

    #[test]
    fn test_full_queue_keeps_oldest_frames() {
        let queue = FrameQueue::new(2);
        queue.enqueue(&frame(1));
        queue.enqueue(&frame(2));
        assert!(!queue.enqueue(&frame(3)));

        let first = queue.dequeue(Duration::from_millis(10)).unwrap();
        let second = queue.dequeue(Duration::from_millis(10)).unwrap();
        assert_eq!((first.frame_number, second.frame_number), (1, 2));
    }

    #[test]
    fn test_clear_drops_pending_tasks() {
        let queue = FrameQueue::new(3);
        queue.enqueue(&frame(1));
        queue.enqueue(&frame(2));

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.depth(), 0);
        assert!(queue.dequeue(Duration::from_millis(5)).is_none());
        // Overflow history survives a clear
        assert_eq!(queue.overflow_count(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.enqueue(&frame(1)));
        assert!(!queue.enqueue(&frame(2)));
    }

    #[test]
    fn test_concurrent_producers_never_exceed_capacity() {
        let queue = Arc::new(FrameQueue::new(4));
        let producers = 4;
        let per_producer = 50;

        let handles: Vec<_> = (0..producers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let image = frame(0);
                    (0..per_producer).filter(|_| queue.enqueue(&image)).count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let total = producers * per_producer;

        assert!(queue.depth() <= 4);
        assert_eq!(accepted, queue.depth());
        assert_eq!(queue.overflow_count() as usize, total - accepted);
        assert_eq!(queue.frames_assigned() as usize, total);
    }
}
