//! The shared device context.
//!
//! Engines run on a single device whose context may be globally exclusive.
//! Every engine creation and `process` call goes through [`DeviceContext::run`],
//! which holds one of the device's slots for the duration of the call. With
//! one slot engine work is serialized while file I/O and encoding on other
//! workers keep running in parallel.
//!
//! Engine work executes on the device's own rayon pool. The calling worker
//! blocks on a plain wait while it does, so it never picks up another asset
//! (and another lease request) from the batch pool while holding a slot.

use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace};

use crate::errors::{Result, SuperpixelError};

#[derive(Clone)]
pub struct DeviceContext {
    state: Arc<DeviceState>,
}

struct DeviceState {
    slots: usize,
    threads: usize,
    free: Mutex<usize>,
    condition: Condvar,
    pool: Mutex<Option<Arc<ThreadPool>>>,
}

/// Right to use one device slot. Released on drop.
struct DeviceLease {
    state: Arc<DeviceState>,
    waited: Duration,
}

impl DeviceContext {
    /// A device that admits one engine at a time.
    pub fn exclusive() -> Self {
        Self::build(1, default_threads())
    }

    pub fn with_slots(slots: usize) -> Result<Self> {
        Self::new(slots, default_threads())
    }

    /// `slots` concurrent engines sharing a pool of `threads` device workers.
    pub fn new(slots: usize, threads: usize) -> Result<Self> {
        if slots == 0 {
            return Err(SuperpixelError::Device {
                message: "device context needs at least one engine slot".to_string(),
            });
        }
        if threads == 0 {
            return Err(SuperpixelError::Device {
                message: "device context needs at least one worker thread".to_string(),
            });
        }
        Ok(Self::build(slots, threads))
    }

    fn build(slots: usize, threads: usize) -> Self {
        Self {
            state: Arc::new(DeviceState {
                slots,
                threads,
                free: Mutex::new(slots),
                condition: Condvar::new(),
                pool: Mutex::new(None),
            }),
        }
    }

    /// Runs `op` on the device under a slot lease and returns its result.
    ///
    /// Blocks until a slot is free. Panics inside `op` resume on the caller.
    pub fn run<R, OP>(&self, op: OP) -> Result<R>
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        let pool = self.pool()?;
        let lease = self.acquire();
        trace!(waited = ?lease.waited(), "device lease acquired");

        let outcome = thread::scope(|scope| scope.spawn(move || pool.install(op)).join());
        drop(lease);

        match outcome {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn pool(&self) -> Result<Arc<ThreadPool>> {
        let mut pool = self.state.pool.lock();
        if let Some(pool) = pool.as_ref() {
            return Ok(Arc::clone(pool));
        }

        let built = ThreadPoolBuilder::new()
            .num_threads(self.state.threads)
            .thread_name(|i| format!("device-{i}"))
            .build()
            .map_err(|e| SuperpixelError::Device {
                message: format!("failed to start device workers: {e}"),
            })?;
        debug!(
            slots = self.state.slots,
            threads = self.state.threads,
            "device workers started"
        );
        let built = Arc::new(built);
        *pool = Some(Arc::clone(&built));
        Ok(built)
    }

    fn acquire(&self) -> DeviceLease {
        let started = Instant::now();
        let mut free = self.state.free.lock();
        self.state.condition.wait_while(&mut free, |&mut c| c == 0);
        *free -= 1;
        DeviceLease {
            state: Arc::clone(&self.state),
            waited: started.elapsed(),
        }
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::exclusive()
    }
}

impl DeviceLease {
    const fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        let mut free = self.state.free.lock();
        *free += 1;
        self.state.condition.notify_one();
    }
}

fn default_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}
