use crate::cache::timer::DebounceTimer;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Default debounce window between the last mutation and the flush
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 5000;

/// Where the table stands relative to its flash image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Clean,
    /// Unflushed changes, debounce timer running
    DirtyPending,
    /// Timer expired, waiting for `process()`
    ReadyToFlush,
}

/// What the caller must do after a mutation was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    /// Timer armed (or a flush already signalled), nothing to do now
    Deferred,
    /// Debounce disabled, write the image before returning
    WriteThrough,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub mutations: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
}

/// Dirty tracking and debounce policy for the card table
///
/// Not synchronized on its own; the manager keeps it behind the same lock as
/// the table.
pub struct WriteBack {
    timer: DebounceTimer,
    window: Duration,
    dirty: bool,
    persist_check_touches: bool,
    stats: CacheStats,
}

impl WriteBack {
    pub fn new(window: Duration, persist_check_touches: bool) -> io::Result<Self> {
        Ok(Self {
            timer: DebounceTimer::spawn("rfid-write-timer")?,
            window,
            dirty: false,
            persist_check_touches,
            stats: CacheStats::default(),
        })
    }

    pub fn state(&self) -> CacheState {
        if !self.dirty {
            CacheState::Clean
        } else if self.timer.has_fired() {
            CacheState::ReadyToFlush
        } else {
            CacheState::DirtyPending
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_write_through(&self) -> bool {
        self.window.is_zero()
    }

    pub fn persist_check_touches(&self) -> bool {
        self.persist_check_touches
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Timer has expired and a flush is owed
    pub fn is_ready(&self) -> bool {
        self.timer.has_fired()
    }

    /// Record an applied mutation and restart the debounce window
    pub fn record_mutation(&mut self) -> MutationAction {
        self.dirty = true;
        self.stats.mutations += 1;

        if self.is_write_through() {
            self.timer.cancel();
            return MutationAction::WriteThrough;
        }

        // Once the timer has fired the next process() picks this change up too
        if !self.timer.has_fired() {
            self.timer.arm(self.window);
            debug!(window_ms = self.window.as_millis() as u64, "Write-back timer armed");
        }
        MutationAction::Deferred
    }

    /// Mark dirty for a change that is written out immediately regardless of the window
    pub fn record_forced_write(&mut self) {
        self.dirty = true;
        self.stats.mutations += 1;
        self.timer.cancel();
    }

    /// The image on flash now matches the table
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.stats.flushes += 1;
        self.timer.cancel();
        self.timer.clear_fired();
    }

    /// A flush failed; the table stays dirty and the next `process()` retries
    pub fn mark_failed(&mut self) {
        self.stats.failed_flushes += 1;
        self.timer.force_fire();
    }

    /// Forget a flush signal that has nothing left to write
    pub fn clear_ready(&self) {
        self.timer.clear_fired();
    }

    pub fn cancel_timer(&self) {
        self.timer.cancel();
    }

    /// Change the debounce window
    ///
    /// Returns true when the caller must write immediately: the window was
    /// dropped to zero while changes are pending. A shorter non-zero window
    /// restarts a pending countdown with the new length.
    pub fn set_window(&mut self, window: Duration) -> bool {
        let shrinking = window < self.window;
        self.window = window;

        if !(shrinking && self.dirty && !self.timer.has_fired()) {
            return false;
        }

        if window.is_zero() {
            self.timer.cancel();
            true
        } else {
            self.timer.arm(window);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_clean() {
        let cache = WriteBack::new(Duration::from_millis(50), false).unwrap();
        assert_eq!(cache.state(), CacheState::Clean);
        assert!(!cache.is_ready());
    }

    #[test]
    fn test_mutation_moves_through_states() {
        let mut cache = WriteBack::new(Duration::from_millis(40), false).unwrap();
        assert_eq!(cache.record_mutation(), MutationAction::Deferred);
        assert_eq!(cache.state(), CacheState::DirtyPending);

        thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.state(), CacheState::ReadyToFlush);
        assert!(cache.is_ready());

        cache.mark_clean();
        assert_eq!(cache.state(), CacheState::Clean);
        assert!(!cache.is_ready());
        assert_eq!(cache.stats().flushes, 1);
    }

    #[test]
    fn test_zero_window_is_write_through() {
        let mut cache = WriteBack::new(Duration::ZERO, false).unwrap();
        assert_eq!(cache.record_mutation(), MutationAction::WriteThrough);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.state(), CacheState::DirtyPending);
    }

    #[test]
    fn test_failure_keeps_dirty() {
        let mut cache = WriteBack::new(Duration::from_secs(10), false).unwrap();
        cache.record_mutation();
        cache.mark_failed();
        assert!(cache.is_dirty());
        assert_eq!(cache.stats().failed_flushes, 1);
        assert_eq!(cache.state(), CacheState::ReadyToFlush);
    }

    #[test]
    fn test_shrinking_window_to_zero_requests_write() {
        let mut cache = WriteBack::new(Duration::from_secs(10), false).unwrap();
        assert!(!cache.set_window(Duration::from_secs(5)));

        cache.record_mutation();
        assert!(cache.set_window(Duration::ZERO));
        assert!(cache.is_write_through());
    }

    #[test]
    fn test_shrinking_window_rearms_pending_timer() {
        let mut cache = WriteBack::new(Duration::from_secs(10), false).unwrap();
        cache.record_mutation();
        assert!(!cache.set_window(Duration::from_millis(30)));

        thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.state(), CacheState::ReadyToFlush);
    }

    #[test]
    fn test_failed_write_through_signals_driver() {
        let mut cache = WriteBack::new(Duration::ZERO, false).unwrap();
        assert_eq!(cache.record_mutation(), MutationAction::WriteThrough);
        cache.mark_failed();
        assert!(cache.is_ready());
        assert_eq!(cache.state(), CacheState::ReadyToFlush);
    }

    #[test]
    fn test_mutation_after_fire_keeps_ready() {
        let mut cache = WriteBack::new(Duration::from_millis(30), false).unwrap();
        cache.record_mutation();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.state(), CacheState::ReadyToFlush);

        assert_eq!(cache.record_mutation(), MutationAction::Deferred);
        assert_eq!(cache.state(), CacheState::ReadyToFlush);
        assert_eq!(cache.stats().mutations, 2);
    }
}
