//! AML `Mutex` and `Event` objects.
//!
//! Both park through the kernel's [`Handler::wait_on`]/[`Handler::wake`]
//! pair on an atomic word, so a blocked `Acquire` or `Wait` never spins in
//! the interpreter. Every mutex acquisition made by AML code is recorded in
//! a [`SyncTracker`], which enforces ACPI's rule that a thread acquires
//! mutexes in non-decreasing sync-level order.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::handler::{Handler, ThreadId};
use crate::{AmlError, RegionError};

/// `Acquire`/`Wait` timeout meaning "wait forever".
pub const WAIT_FOREVER: u16 = 0xFFFF;

static NEXT_MUTEX_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default)]
struct MutexState {
    owner: Option<ThreadId>,
    recursion: u32,
}

/// An AML mutex: recursive, owned by a thread, ordered by sync level.
#[derive(Debug)]
pub struct AmlMutex {
    id: usize,
    sync_level: u8,
    global: bool,
    state: spin::Mutex<MutexState>,
    /// Bumped on every final release; waiters park on it.
    release_seq: AtomicU32,
}

impl AmlMutex {
    /// A new, unowned mutex.
    #[must_use]
    pub fn new(sync_level: u8) -> Self {
        Self {
            id: NEXT_MUTEX_ID.fetch_add(1, Ordering::Relaxed),
            sync_level: sync_level & 0x0F,
            global: false,
            state: spin::Mutex::new(MutexState::default()),
            release_seq: AtomicU32::new(0),
        }
    }

    /// The `\_GL_` mutex, which additionally takes the firmware Global Lock.
    #[must_use]
    pub fn global() -> Self {
        Self {
            global: true,
            ..Self::new(0)
        }
    }

    /// Declared sync level (0-15).
    #[must_use]
    pub fn sync_level(&self) -> u8 {
        self.sync_level
    }

    /// Current owner, if held.
    #[must_use]
    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    /// Current recursion depth (0 when free).
    #[must_use]
    pub fn recursion(&self) -> u32 {
        self.state.lock().recursion
    }

    /// `Some(first)` once taken, where `first` is whether this was the
    /// outermost acquisition; `None` while another thread owns it.
    fn try_take(&self, me: ThreadId) -> Option<bool> {
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.recursion = 1;
                Some(true)
            }
            Some(owner) if owner == me => {
                state.recursion += 1;
                Some(false)
            }
            Some(_) => None,
        }
    }

    /// Blocks until the mutex is taken or the deadline passes.
    ///
    /// The firmware Global Lock is taken with the outermost acquisition of
    /// `\_GL_` only; failing to get it undoes the acquisition.
    fn take(&self, handler: &dyn Handler, me: ThreadId, timeout: u16) -> bool {
        let deadline = deadline(handler, timeout);
        let first = loop {
            let seq = self.release_seq.load(Ordering::Acquire);
            if let Some(first) = self.try_take(me) {
                break first;
            }
            let Some(remaining) = remaining(handler, deadline) else {
                return false;
            };
            handler.wait_on(&self.release_seq, seq, remaining);
        };
        if self.global && first {
            if let Some(lock) = handler.global_lock() {
                if !lock.acquire(remaining(handler, deadline).unwrap_or(Some(0))) {
                    self.give(handler, me);
                    return false;
                }
            }
        }
        true
    }

    /// Drops one level of recursion; returns whether the mutex became free.
    fn give(&self, handler: &dyn Handler, me: ThreadId) -> bool {
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return false;
        }
        state.recursion -= 1;
        if state.recursion > 0 {
            return false;
        }
        state.owner = None;
        drop(state);
        self.release_seq.fetch_add(1, Ordering::Release);
        handler.wake(&self.release_seq, 1);
        true
    }

    fn release_global(&self, handler: &dyn Handler) {
        if self.global {
            if let Some(lock) = handler.global_lock() {
                lock.release();
            }
        }
    }
}

/// A counting AML event.
#[derive(Debug, Default)]
pub struct AmlEvent {
    count: AtomicU32,
}

impl AmlEvent {
    /// A new, unsignalled event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending signal count.
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// `Signal`: add one to the count and wake a waiter.
    pub fn signal(&self, handler: &dyn Handler) {
        self.count.fetch_add(1, Ordering::AcqRel);
        handler.wake(&self.count, 1);
    }

    /// `Reset`: drop all pending signals.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// `Wait`: consume one signal, blocking up to `timeout` ms. Returns
    /// `false` on timeout.
    pub fn wait(&self, handler: &dyn Handler, timeout: u16) -> bool {
        let deadline = deadline(handler, timeout);
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current > 0 {
                if self
                    .count
                    .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
                continue;
            }
            let Some(remaining) = remaining(handler, deadline) else {
                return false;
            };
            handler.wait_on(&self.count, 0, remaining);
        }
    }
}

fn deadline(handler: &dyn Handler, timeout: u16) -> Option<u64> {
    (timeout != WAIT_FOREVER).then(|| handler.uptime_ms().saturating_add(u64::from(timeout)))
}

/// Time left until `deadline`: `Some(None)` waits forever, `None` means the
/// deadline has passed.
#[allow(clippy::option_option)]
fn remaining(handler: &dyn Handler, deadline: Option<u64>) -> Option<Option<u64>> {
    match deadline {
        None => Some(None),
        Some(d) => {
            let now = handler.uptime_ms();
            (now < d).then(|| Some(d - now))
        }
    }
}

/// Mutexes each thread currently holds through AML `Acquire`, in
/// acquisition order.
#[derive(Debug, Default)]
pub struct SyncTracker {
    held: spin::Mutex<BTreeMap<ThreadId, Vec<Arc<AmlMutex>>>>,
}

impl SyncTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sync level `thread` currently holds.
    #[must_use]
    pub fn current_level(&self, thread: ThreadId) -> Option<u8> {
        self.held
            .lock()
            .get(&thread)
            .and_then(|held| held.iter().map(|m| m.sync_level).max())
    }

    /// Number of distinct mutexes `thread` holds.
    #[must_use]
    pub fn held_count(&self, thread: ThreadId) -> usize {
        self.held.lock().get(&thread).map_or(0, Vec::len)
    }

    /// `Acquire(mutex, timeout)`.
    ///
    /// Re-acquiring a mutex the thread already owns only bumps its recursion
    /// count. Otherwise the sync-level order is checked before blocking.
    /// Returns `Ok(false)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::MutexOrderViolation`] if the thread holds a mutex
    /// with a higher sync level than `mutex`.
    pub fn acquire(
        &self,
        handler: &dyn Handler,
        mutex: &Arc<AmlMutex>,
        timeout: u16,
    ) -> Result<bool, AmlError> {
        let me = handler.current_thread();
        if mutex.owner() == Some(me) {
            return Ok(mutex.try_take(me).is_some());
        }
        if let Some(held) = self.current_level(me) {
            if mutex.sync_level < held {
                return Err(AmlError::MutexOrderViolation {
                    held,
                    requested: mutex.sync_level,
                });
            }
        }
        if !mutex.take(handler, me, timeout) {
            return Ok(false);
        }
        self.held.lock().entry(me).or_default().push(Arc::clone(mutex));
        Ok(true)
    }

    /// `Release(mutex)`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::MutexNotOwned`] if the calling thread does not own
    /// `mutex`.
    pub fn release(&self, handler: &dyn Handler, mutex: &Arc<AmlMutex>) -> Result<(), AmlError> {
        let me = handler.current_thread();
        if mutex.owner() != Some(me) {
            return Err(AmlError::MutexNotOwned);
        }
        if mutex.recursion() == 1 {
            mutex.release_global(handler);
            self.forget(me, mutex);
        }
        mutex.give(handler, me);
        Ok(())
    }

    fn forget(&self, me: ThreadId, mutex: &AmlMutex) {
        let mut held = self.held.lock();
        if let Some(list) = held.get_mut(&me) {
            if let Some(pos) = list.iter().rposition(|m| m.id == mutex.id) {
                list.remove(pos);
            }
            if list.is_empty() {
                held.remove(&me);
            }
        }
    }

    /// Fully releases every mutex `thread` acquired beyond the first `keep`,
    /// returning how many were released. Used to clean up after methods
    /// that return while still holding mutexes.
    pub fn release_beyond(&self, handler: &dyn Handler, keep: usize) -> usize {
        let me = handler.current_thread();
        let leaked: Vec<Arc<AmlMutex>> = {
            let mut held = self.held.lock();
            let Some(list) = held.get_mut(&me) else {
                return 0;
            };
            let leaked = list.split_off(keep.min(list.len()));
            if list.is_empty() {
                held.remove(&me);
            }
            leaked
        };
        for mutex in leaked.iter().rev() {
            mutex.release_global(handler);
            while !mutex.give(handler, me) && mutex.owner() == Some(me) {}
        }
        leaked.len()
    }
}

/// Takes `mutex` for interpreter-internal serialization (region locks),
/// bypassing sync-level tracking. Waits forever for the mutex itself.
///
/// # Errors
///
/// [`RegionError::GlobalLockUnavailable`] if `mutex` is `\_GL_` and the
/// firmware lock was refused. The mutex is not held afterwards.
pub fn lock_internal(handler: &dyn Handler, mutex: &AmlMutex) -> Result<(), AmlError> {
    let me = handler.current_thread();
    if mutex.take(handler, me, WAIT_FOREVER) {
        Ok(())
    } else {
        Err(RegionError::GlobalLockUnavailable.into())
    }
}

/// Counterpart of [`lock_internal`].
pub fn unlock_internal(handler: &dyn Handler, mutex: &AmlMutex) {
    let me = handler.current_thread();
    if mutex.recursion() == 1 {
        mutex.release_global(handler);
    }
    mutex.give(handler, me);
}
