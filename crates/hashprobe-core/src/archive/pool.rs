//! Bounded pool of archive reader handles
//!
//! Extraction has to seek a shared backing store, so parallel workers each need their own
//! handle. The pool caps how many handles exist at once: `acquire` blocks while all of them
//! are checked out, and a handle goes back to the pool when its guard drops. A handle that
//! hit an I/O error is discarded instead and a fresh one is opened on the next acquire.
//!
//! When no pool is configured, [`ExtractionGate::Serialized`] funnels every extraction
//! through a single reader behind a mutex.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};

use super::ArchiveError;

type ReaderFactory<R> = Box<dyn Fn() -> Result<R, ArchiveError> + Send + Sync>;

#[derive(Debug)]
struct State<R> {
    idle: Vec<R>,
    /// Handles currently in existence, idle or checked out
    live: usize,
}

/// Counting-semaphore pool of reader handles
pub struct ReaderPool<R> {
    capacity: usize,
    state: Mutex<State<R>>,
    cv: Condvar,
    factory: ReaderFactory<R>,
}

impl<R> std::fmt::Debug for ReaderPool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderPool")
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<R: Send> ReaderPool<R> {
    /// Create a pool that opens at most `capacity` handles with `factory`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> Result<R, ArchiveError> + Send + Sync + 'static,
    {
        assert!(capacity > 0, "ReaderPool capacity must be > 0");
        Self {
            capacity,
            state: Mutex::new(State {
                idle: Vec::with_capacity(capacity),
                live: 0,
            }),
            cv: Condvar::new(),
            factory: Box::new(factory),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Handles currently open. Snapshot only.
    pub fn live(&self) -> usize {
        self.lock_or_recover().live
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, State<R>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Check a handle out, blocking until one is free
    pub fn acquire(&self) -> Result<PooledReader<'_, R>, ArchiveError> {
        let mut state = self.lock_or_recover();
        loop {
            if let Some(reader) = state.idle.pop() {
                return Ok(PooledReader {
                    pool: self,
                    reader: Some(reader),
                });
            }
            if state.live < self.capacity {
                state.live += 1;
                drop(state);
                return match (self.factory)() {
                    Ok(reader) => Ok(PooledReader {
                        pool: self,
                        reader: Some(reader),
                    }),
                    Err(e) => {
                        self.forget_one();
                        Err(e)
                    }
                };
            }
            state = match self.cv.wait(state) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
    }

    fn release(&self, reader: R) {
        let mut state = self.lock_or_recover();
        state.idle.push(reader);
        drop(state);
        self.cv.notify_one();
    }

    fn forget_one(&self) {
        let mut state = self.lock_or_recover();
        debug_assert!(state.live > 0, "ReaderPool over-release");
        state.live = state.live.saturating_sub(1);
        drop(state);
        self.cv.notify_one();
    }
}

/// RAII guard for a checked-out reader
pub struct PooledReader<'a, R: Send> {
    pool: &'a ReaderPool<R>,
    reader: Option<R>,
}

impl<R: Send> PooledReader<'_, R> {
    /// Drop the handle instead of returning it; the pool opens a replacement later
    pub fn discard(mut self) {
        self.reader = None;
        self.pool.forget_one();
    }
}

impl<R: Send> Deref for PooledReader<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.reader.as_ref().expect("reader present until drop")
    }
}

impl<R: Send> DerefMut for PooledReader<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.reader.as_mut().expect("reader present until drop")
    }
}

impl<R: Send> Drop for PooledReader<'_, R> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.pool.release(reader);
        }
    }
}

/// How extraction calls get a reader
pub enum ExtractionGate<R: Send> {
    /// Up to N concurrent readers
    Pooled(ReaderPool<R>),
    /// One reader, one extraction at a time
    Serialized(Mutex<R>),
}

impl<R: Send> std::fmt::Debug for ExtractionGate<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionGate::Pooled(pool) => write!(f, "Pooled({})", pool.capacity()),
            ExtractionGate::Serialized(_) => write!(f, "Serialized"),
        }
    }
}

impl<R: Send> ExtractionGate<R> {
    /// Run `f` with exclusive access to a reader.
    ///
    /// In pooled mode a handle whose operation failed with a non-entry-specific error is
    /// discarded rather than returned.
    pub fn with_reader<T, F>(&self, f: F) -> Result<T, ArchiveError>
    where
        F: FnOnce(&mut R) -> Result<T, ArchiveError>,
    {
        match self {
            ExtractionGate::Pooled(pool) => {
                let mut reader = pool.acquire()?;
                let result = f(&mut *reader);
                if let Err(ref e) = result {
                    if !e.is_entry_specific() {
                        tracing::debug!("Discarding reader after error: {}", e);
                        reader.discard();
                    }
                }
                result
            }
            ExtractionGate::Serialized(reader) => {
                let mut guard = match reader.lock() {
                    Ok(guard) => guard,
                    Err(poison) => poison.into_inner(),
                };
                f(&mut *guard)
            }
        }
    }
}
