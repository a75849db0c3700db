//! Reusable byte buffers for package readers.
//!
//! A reader leases one buffer large enough for its whole input stream and
//! gives it back when it is dropped. Buffers are never shrunk; a lease takes
//! the first idle buffer whose capacity is at least the requested size and
//! allocates a new one otherwise.
//!
//! Retention is bounded by an optional idle policy: when no lease has been
//! outstanding for the quiescence window, [`BufferPool::sweep_if_idle`] drops
//! every pooled buffer and runs the registered sweep hooks (the session uses
//! this to drop its shared-object caches). [`BufferPool::lease`] starts a
//! single background reaper that performs that sweep and exits; the next
//! lease after a sweep starts it again.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::util::{Error, Result};

/// Callback run after the idle sweep has emptied the pool.
pub type SweepHook = Box<dyn Fn() + Send + Sync>;

/// Longest the reaper sleeps between idle checks.
const MAX_REAPER_TICK: Duration = Duration::from_secs(1);

/// Pool of reusable byte buffers shared by all readers of a session.
pub struct BufferPool {
    /// Idle buffers, available for lease.
    idle: Mutex<Vec<Vec<u8>>>,
    /// Number of buffers currently leased out.
    active: AtomicUsize,
    /// Time of the last lease or release.
    last_activity: Mutex<Instant>,
    /// Quiescence window; `None` disables idle sweeping.
    idle_timeout: Option<Duration>,
    /// Set while a reaper thread is alive.
    reaper_running: AtomicBool,
    hooks: Mutex<Vec<SweepHook>>,
    allocations: AtomicUsize,
}

impl BufferPool {
    /// Create a pool without idle sweeping.
    pub fn new() -> Arc<Self> {
        Self::with_idle_timeout(None)
    }

    /// Create a pool that releases everything after `timeout` of inactivity.
    pub fn with_idle_timeout(timeout: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            last_activity: Mutex::new(Instant::now()),
            idle_timeout: timeout,
            reaper_running: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
            allocations: AtomicUsize::new(0),
        })
    }

    /// Register a callback to run after each idle sweep.
    pub fn on_sweep(&self, hook: SweepHook) {
        self.hooks.lock().push(hook);
    }

    /// Lease a buffer of at least `min_size` bytes.
    ///
    /// The returned buffer is exclusively owned by the caller until it is
    /// dropped. Its length is its full capacity; contents are unspecified.
    pub fn lease(self: &Arc<Self>, min_size: usize) -> Result<PooledBuffer> {
        if min_size == 0 {
            return Err(Error::InvalidArgument("buffer lease size must be positive".into()));
        }

        // Counted under the idle lock so a sweep never sees a lease half-taken
        let reused = {
            let mut idle = self.idle.lock();
            self.active.fetch_add(1, Ordering::AcqRel);
            self.touch();
            idle.iter()
                .position(|b| b.len() >= min_size)
                .map(|i| idle.swap_remove(i))
        };
        let buf = match reused {
            Some(buf) => buf,
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(size = min_size, "allocating pooled buffer");
                vec![0u8; min_size]
            }
        };

        self.ensure_reaper();

        Ok(PooledBuffer { buf: Some(buf), pool: Arc::downgrade(self) })
    }

    /// Return a buffer to the pool. Called by [`PooledBuffer`]'s drop.
    fn release(&self, buf: Vec<u8>) {
        let mut idle = self.idle.lock();
        idle.push(buf);
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.touch();
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Number of leases currently outstanding.
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of idle buffers held for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Total buffers allocated over the pool's lifetime.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Drop all idle buffers and run the sweep hooks.
    pub fn clear(&self) {
        let mut idle = self.idle.lock();
        self.clear_locked(&mut idle);
    }

    /// Runs with the idle lock held, so no lease can start until the hooks return.
    fn clear_locked(&self, idle: &mut Vec<Vec<u8>>) {
        let dropped = std::mem::take(idle).len();
        tracing::debug!(dropped, "buffer pool cleared");
        for hook in self.hooks.lock().iter() {
            hook();
        }
    }

    /// Sweep if no reader is active and the quiescence window has elapsed.
    ///
    /// Returns true when the sweep ran.
    pub fn sweep_if_idle(&self, quiescence: Duration) -> bool {
        let mut idle = self.idle.lock();
        if self.active() != 0 {
            return false;
        }
        if self.last_activity.lock().elapsed() < quiescence {
            return false;
        }
        self.clear_locked(&mut idle);
        true
    }

    /// Start the background reaper unless one is already running.
    fn ensure_reaper(self: &Arc<Self>) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };
        if self
            .reaper_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let weak = Arc::downgrade(self);
        let tick = timeout.min(MAX_REAPER_TICK);
        let spawned = thread::Builder::new()
            .name("assetpack-pool-reaper".into())
            .spawn(move || reaper_loop(weak, timeout, tick));
        if let Err(e) = spawned {
            tracing::warn!("failed to start buffer pool reaper: {}", e);
            self.reaper_running.store(false, Ordering::Release);
        }
    }

    #[cfg(test)]
    fn reaper_running(&self) -> bool {
        self.reaper_running.load(Ordering::Acquire)
    }
}

fn reaper_loop(pool: Weak<BufferPool>, timeout: Duration, tick: Duration) {
    loop {
        thread::sleep(tick);
        let Some(pool) = pool.upgrade() else {
            return;
        };
        // Hand off before the final check: a lease from here on starts its own reaper
        pool.reaper_running.store(false, Ordering::Release);
        if pool.sweep_if_idle(timeout) {
            tracing::debug!("buffer pool reaper finished after idle sweep");
            return;
        }
        if pool
            .reaper_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
    }
}

/// A buffer on lease from a [`BufferPool`]; returned to the pool on drop.
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Weak<BufferPool>,
}

impl PooledBuffer {
    /// Capacity of the leased buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.len()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.release(buf);
            }
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer").field("capacity", &self.capacity()).finish()
    }
}
