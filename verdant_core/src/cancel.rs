use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often dispatchers wake to poll for cancellation while waiting on a
/// worker future.
pub(crate) const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Monotonic generation counter shared between a spawner and its in-flight
/// tile tasks.
///
/// Advancing the counter invalidates every watch taken before the advance.
/// Workers poll their watch between sweeps and bail out once it goes stale;
/// the dispatcher still waits for every task to drain before discarding.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    counter: Arc<AtomicU32>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates all outstanding watches and returns the new generation.
    pub fn advance(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Watch pinned to the current generation.
    pub fn watch(&self) -> CancelWatch {
        CancelWatch {
            counter: Arc::clone(&self.counter),
            pinned: self.current(),
        }
    }
}

/// Cheap cancellation probe handed to worker tasks.
#[derive(Debug, Clone)]
pub struct CancelWatch {
    counter: Arc<AtomicU32>,
    pinned: u32,
}

impl CancelWatch {
    /// Watch that can never fire; for synchronous, uncancellable runs.
    pub fn never() -> Self {
        CancelWatch {
            counter: Arc::new(AtomicU32::new(0)),
            pinned: 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.counter.load(Ordering::Relaxed) != self.pinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_existing_watches() {
        let generation = GenerationCounter::new();
        let watch = generation.watch();
        assert!(!watch.is_cancelled());
        generation.advance();
        assert!(watch.is_cancelled());
        // A fresh watch picks up the new generation.
        assert!(!generation.watch().is_cancelled());
    }

    #[test]
    fn never_watch_stays_live() {
        let watch = CancelWatch::never();
        assert!(!watch.is_cancelled());
    }
}
