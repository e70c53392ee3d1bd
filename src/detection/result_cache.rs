/// Latest-value store for detection results
///
/// Writers (the worker, or the caller in fallback mode and `force_refresh`)
/// replace the entry; any number of readers take copies.
use parking_lot::RwLock;
use std::time::{Duration, Instant};

/// Copy of the cache entry handed to readers
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot<T> {
    pub results: Vec<T>,
    /// `None` until the first successful detection
    pub completed_at: Option<Instant>,
    pub frame_number: u64,
}

impl<T> CacheSnapshot<T> {
    /// Age at the time of the call; `Duration::MAX` if never written
    pub fn age(&self) -> Duration {
        age_of(self.completed_at)
    }
}

struct CacheEntry<T> {
    results: Vec<T>,
    completed_at: Option<Instant>,
    frame_number: u64,
}

pub struct ResultCache<T> {
    entry: RwLock<CacheEntry<T>>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new() -> Self {
        Self {
            entry: RwLock::new(CacheEntry {
                results: Vec::new(),
                completed_at: None,
                frame_number: 0,
            }),
        }
    }

    /// Replace the stored entry, stamping it with the current instant.
    ///
    /// The stamp is taken under the write lock so `completed_at` never goes
    /// backwards when writers race.
    pub fn update(&self, results: Vec<T>, frame_number: u64) {
        let mut entry = self.entry.write();
        *entry = CacheEntry {
            results,
            completed_at: Some(Instant::now()),
            frame_number,
        };
    }

    pub fn read(&self) -> CacheSnapshot<T> {
        let entry = self.entry.read();
        CacheSnapshot {
            results: entry.results.clone(),
            completed_at: entry.completed_at,
            frame_number: entry.frame_number,
        }
    }

    pub fn results(&self) -> Vec<T> {
        self.entry.read().results.clone()
    }

    pub fn frame_number(&self) -> u64 {
        self.entry.read().frame_number
    }

    pub fn age(&self) -> Duration {
        age_of(self.entry.read().completed_at)
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() <= max_age
    }

    pub fn has_result(&self) -> bool {
        self.entry.read().completed_at.is_some()
    }
}

impl<T: Clone> Default for ResultCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn age_of(completed_at: Option<Instant>) -> Duration {
    match completed_at {
        Some(at) => at.elapsed(),
        None => Duration::MAX,
    }
}
