// Card manager: the lock-guarded facade over the table, write-back cache and image file

pub mod json;

use crate::cache::coordinator::{CacheState, CacheStats, MutationAction, WriteBack};
use crate::core::config::Config;
use crate::core::error::{LoadError, RfidError};
use crate::models::card::CardRecord;
use crate::storage::image::{ImageFile, ImageFormat};
use crate::stores::card_table::{format_id, CardTable, DEFAULT_CAPACITY};
use crate::utils::time::unix_now;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything `CardManager::init` needs to open a store
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub capacity: usize,
    pub cache_timeout: Duration,
    pub persist_check_touches: bool,
    pub lock_timeouts: LockTimeouts,
}

/// Bounded waits for the table lock, per kind of call
#[derive(Debug, Clone, Copy)]
pub struct LockTimeouts {
    pub operation: Duration,
    pub config: Duration,
    pub format: Duration,
    pub render: Duration,
}

impl Default for LockTimeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_millis(2000),
            config: Duration::from_millis(1000),
            format: Duration::from_millis(5000),
            render: Duration::from_millis(500),
        }
    }
}

impl ManagerOptions {
    /// Defaults of the reference device, storing the image at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: ImageFormat::default(),
            capacity: DEFAULT_CAPACITY,
            cache_timeout: Duration::from_millis(crate::cache::coordinator::DEFAULT_CACHE_TIMEOUT_MS),
            persist_check_touches: false,
            lock_timeouts: LockTimeouts::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.storage.path.clone(),
            format: config.storage.format,
            capacity: config.storage.capacity,
            cache_timeout: Duration::from_millis(config.cache.timeout_ms),
            persist_check_touches: config.cache.persist_check_touches,
            lock_timeouts: LockTimeouts {
                operation: Duration::from_millis(config.lock.operation_timeout_ms),
                config: Duration::from_millis(config.lock.config_timeout_ms),
                format: Duration::from_millis(config.lock.format_timeout_ms),
                render: Duration::from_millis(config.lock.render_timeout_ms),
            },
        }
    }
}

/// How `init` arrived at the table it serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored,
    DefaultsFirstBoot,
    DefaultsAfterCorruption,
}

struct Inner {
    table: CardTable,
    cache: WriteBack,
    image: ImageFile,
}

/// Authorization card store shared by request handlers and the flush driver
///
/// All state sits behind one reentrant lock. The write routine re-acquires
/// it while a mutation already holds it, which is how write-through saves
/// happen inside `add_card` without releasing the table in between.
pub struct CardManager {
    inner: ReentrantMutex<RefCell<Inner>>,
    lock_timeouts: LockTimeouts,
    capacity: usize,
}

impl CardManager {
    /// Open the store, restoring the image or falling back to the default cards
    pub fn init(options: ManagerOptions) -> Result<(Self, LoadOutcome), RfidError> {
        let dir = storage_dir(&options.path);
        if !dir.is_dir() {
            error!(dir = %dir.display(), "Storage directory not found or not mounted");
            return Err(RfidError::StorageUnavailable(dir.display().to_string()));
        }

        let cache = WriteBack::new(options.cache_timeout, options.persist_check_touches)
            .map_err(|e| RfidError::io("starting the write-back timer", e))?;
        let image = ImageFile::new(options.path.clone(), options.format, options.capacity);

        let manager = Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                table: CardTable::new(options.capacity),
                cache,
                image,
            })),
            lock_timeouts: options.lock_timeouts,
            capacity: options.capacity,
        };

        // Nothing else can hold the lock yet
        let outcome = {
            let guard = manager.inner.lock();
            let loaded = guard.borrow().image.load();
            match loaded {
                Ok(table) => {
                    info!(
                        path = %options.path.display(),
                        cards = table.count(),
                        "Card database restored from image"
                    );
                    guard.borrow_mut().table = table;
                    LoadOutcome::Restored
                }
                Err(e) if e.is_recoverable() => {
                    let outcome = match e {
                        LoadError::NotFound => LoadOutcome::DefaultsFirstBoot,
                        _ => LoadOutcome::DefaultsAfterCorruption,
                    };
                    warn!(error = %e, "Card image unusable, loading default cards");
                    {
                        let mut inner = guard.borrow_mut();
                        inner.table.format_defaults();
                        inner.cache.record_forced_write();
                    }
                    manager.write_back()?;
                    info!(cards = guard.borrow().table.count(), "Default cards loaded and saved");
                    outcome
                }
                Err(e) => {
                    error!(error = %e, "Failed to read card image");
                    return Err(e.into());
                }
            }
        };

        Ok((manager, outcome))
    }

    /// Flush pending changes and stop the write-back timer
    pub fn deinit(self) -> Result<(), RfidError> {
        info!("Deinitializing card manager");
        let result = self.flush_cache();
        if let Err(e) = &result {
            warn!(error = %e, "Failed to flush card cache during deinitialization");
        }
        drop(self);
        result
    }

    pub fn add_card(&self, id: u32, name: &str) -> Result<(), RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "add_card")?;
        let action = {
            let mut inner = guard.borrow_mut();
            inner.table.add(id, name, unix_now())?;
            inner.cache.record_mutation()
        };
        self.after_mutation(action)
    }

    pub fn remove_card(&self, id: u32) -> Result<(), RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "remove_card")?;
        let action = {
            let mut inner = guard.borrow_mut();
            inner.table.remove(id)?;
            inner.cache.record_mutation()
        };
        self.after_mutation(action)
    }

    /// Authorize a card, stamping its last-seen time on success
    pub fn check_card(&self, id: u32) -> Result<bool, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "check_card")?;
        let action = {
            let mut inner = guard.borrow_mut();
            if !inner.table.check(id, unix_now()) {
                return Ok(false);
            }
            if !inner.cache.persist_check_touches() {
                return Ok(true);
            }
            inner.cache.record_mutation()
        };

        // The card is authorized whether or not the timestamp reached flash
        if let Err(e) = self.after_mutation(action) {
            warn!(card_id = %format_id(id), error = %e, "Failed to persist check timestamp");
        }
        Ok(true)
    }

    pub fn get_card(&self, id: u32) -> Result<CardRecord, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "get_card")?;
        let inner = guard.borrow();
        inner.table.get(id)
    }

    /// Live cards in slot order, at most `max`
    pub fn list_cards(&self, max: usize) -> Result<Vec<CardRecord>, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "list_cards")?;
        let cards = guard.borrow().table.list(max);
        debug!(listed = cards.len(), "Listed cards");
        Ok(cards)
    }

    pub fn get_card_count(&self) -> Result<usize, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "get_card_count")?;
        let count = guard.borrow().table.count();
        Ok(count)
    }

    /// Erase every card, reinstall the defaults and write them out immediately
    pub fn format_database(&self) -> Result<(), RfidError> {
        let guard = self.lock(self.lock_timeouts.format, "format_database")?;
        warn!("Formatting card database, all cards will be replaced by defaults");
        {
            let mut inner = guard.borrow_mut();
            inner.table.format_defaults();
            inner.cache.record_forced_write();
        }

        // A failed save stays owed to the periodic driver
        self.write_back()?;
        info!(cards = guard.borrow().table.count(), "Default cards loaded and saved during format");
        Ok(())
    }

    /// Change the debounce window at runtime, 0 switches to write-through
    pub fn set_cache_timeout(&self, timeout_ms: u64) -> Result<(), RfidError> {
        let guard = self.lock(self.lock_timeouts.config, "set_cache_timeout")?;
        let write_now = guard
            .borrow_mut()
            .cache
            .set_window(Duration::from_millis(timeout_ms));
        info!(timeout_ms, "Card cache timeout updated");

        if write_now {
            self.write_back()?;
        }
        Ok(())
    }

    /// Cancel the pending timer and write any unsaved changes now
    pub fn flush_cache(&self) -> Result<(), RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "flush_cache")?;
        guard.borrow().cache.cancel_timer();
        match self.write_back() {
            Ok(true) => info!("Card cache flushed to flash"),
            Ok(false) => debug!("No pending card changes to flush"),
            Err(e) => {
                error!(error = %e, "Failed to flush card cache");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Periodic driver entry point
    ///
    /// Writes the image once the debounce timer has signalled. A failed write
    /// is logged and retried on the next call. Returns true when an image
    /// was written.
    pub fn process(&self) -> bool {
        let ready = match self.lock(self.lock_timeouts.operation, "process") {
            Ok(guard) => {
                let ready = guard.borrow().cache.is_ready();
                ready
            }
            Err(e) => {
                warn!(error = %e, "Skipping write-back cycle");
                return false;
            }
        };
        if !ready {
            return false;
        }

        match self.write_back() {
            Ok(written) => {
                debug!(written, "Write-back cycle complete");
                written
            }
            Err(e) => {
                warn!(error = %e, "Write-back failed, retrying on next cycle");
                false
            }
        }
    }

    /// Render the live cards as JSON, never exceeding `capacity` bytes
    pub fn render_as_json(&self, capacity: usize) -> Result<String, RfidError> {
        let guard = self.lock(self.lock_timeouts.render, "render_as_json")?;
        let inner = guard.borrow();
        json::render_cards(&inner.table, capacity)
    }

    pub fn cache_state(&self) -> Result<CacheState, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "cache_state")?;
        let state = guard.borrow().cache.state();
        Ok(state)
    }

    pub fn cache_stats(&self) -> Result<CacheStats, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "cache_stats")?;
        let stats = guard.borrow().cache.stats();
        Ok(stats)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keep the table lock held for the duration of `f`
    #[cfg(test)]
    pub(crate) fn hold_lock_until<F: FnOnce()>(&self, f: F) {
        let _guard = self.inner.lock();
        f();
    }

    fn after_mutation(&self, action: MutationAction) -> Result<(), RfidError> {
        match action {
            MutationAction::Deferred => Ok(()),
            MutationAction::WriteThrough => self.write_back().map(|_| ()),
        }
    }

    /// Save the table if it is dirty; the shared write path of every caller
    ///
    /// Returns whether an image was written. Takes the lock itself, so it can
    /// be called both with and without the lock already held.
    fn write_back(&self) -> Result<bool, RfidError> {
        let guard = self.lock(self.lock_timeouts.operation, "write_back")?;
        let mut inner = guard.borrow_mut();

        if !inner.cache.is_dirty() {
            inner.cache.clear_ready();
            return Ok(false);
        }

        let Inner { table, cache, image } = &mut *inner;
        match image.save(table) {
            Ok(()) => {
                cache.mark_clean();
                debug!(cards = table.count(), "Card table written to flash");
                Ok(true)
            }
            Err(e) => {
                cache.mark_failed();
                error!(path = %image.path().display(), error = %e, "Failed to write card image");
                Err(e)
            }
        }
    }

    fn lock(
        &self,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<ReentrantMutexGuard<'_, RefCell<Inner>>, RfidError> {
        self.inner.try_lock_for(timeout).ok_or_else(|| {
            error!(operation, timeout_ms = timeout.as_millis() as u64, "Failed to take card table lock");
            RfidError::LockTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }
        })
    }
}

fn storage_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
