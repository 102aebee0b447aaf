//! Single-frame-at-a-time admission.
//!
//! The gate owns the value doing the work. A caller either gets it right away
//! or is turned away; nobody waits in line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Backend is busy. Try again later.")]
    Busy,
    #[error("frame processing aborted: {0}")]
    Aborted(String),
}

pub struct FrameGate<T> {
    inner: Arc<Mutex<T>>,
    busy: Arc<AtomicBool>,
}

impl<T> Clone for FrameGate<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            busy: self.busy.clone(),
        }
    }
}

/// Clears the busy flag however the job ends, panics included.
struct BusyFlag(Arc<AtomicBool>);

impl Drop for BusyFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A job's hold on the gate. Fields drop in order, so the lock is free
/// before the flag reads idle.
struct Running<T> {
    guard: OwnedMutexGuard<T>,
    _flag: BusyFlag,
}

impl<T: Send + 'static> FrameGate<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run `job` on a blocking thread if nothing else is running, else fail with [`GateError::Busy`].
    pub async fn try_run<R, F>(&self, job: F) -> Result<R, GateError>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let guard = self
            .inner
            .clone()
            .try_lock_owned()
            .map_err(|_| GateError::Busy)?;
        self.busy.store(true, Ordering::Release);
        let running = Running {
            guard,
            _flag: BusyFlag(self.busy.clone()),
        };

        tokio::task::spawn_blocking(move || {
            let mut running = running;
            job(&mut running.guard)
        })
        .await
        .map_err(|e| GateError::Aborted(e.to_string()))
    }
}
