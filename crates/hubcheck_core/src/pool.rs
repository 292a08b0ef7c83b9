//! OS-thread worker pool used by code under test to run blocking calls off the cooperative thread.
//!
//! The harness only needs one thing from a pool: draining every outstanding job before the leak check, so
//! that work returning control to the hub cannot race the snapshot.

use std::any::Any;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Pool surface the harness drives during teardown.
pub trait WorkerPool {
    /// Wait for every outstanding job to finish and release the workers.
    fn kill_all(&self);

    /// Number of submitted jobs not yet drained.
    fn outstanding(&self) -> usize;
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Thread-per-job pool.
#[derive(Default)]
pub struct ThreadPool {
    jobs: Mutex<Vec<JoinHandle<()>>>,
    next_id: Mutex<u64>,
}

impl ThreadPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn thread_name(&self) -> String {
        let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
        *next += 1;
        format!("tpool-{}", *next)
    }

    /// Run `f` on a worker thread and block until it returns.
    pub fn execute<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = thread::Builder::new().name(self.thread_name()).spawn(f)?;
        handle.join().map_err(|payload| PoolError::Panicked(panic_message(payload.as_ref())))
    }

    /// Queue `f` in the background. It is joined by [`WorkerPool::kill_all`].
    pub fn submit<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.thread_name();
        debug!(worker = %name, "job submitted");
        let handle = thread::Builder::new().name(name).spawn(f)?;
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
        Ok(())
    }
}

impl WorkerPool for ThreadPool {
    fn kill_all(&self) {
        let jobs: Vec<JoinHandle<()>> = std::mem::take(&mut *self.jobs.lock().unwrap_or_else(|e| e.into_inner()));
        debug!(count = jobs.len(), "draining worker pool");
        for job in jobs {
            let name = job.thread().name().unwrap_or("tpool").to_string();
            if let Err(payload) = job.join() {
                warn!(worker = %name, "worker panicked: {}", panic_message(payload.as_ref()));
            }
        }
    }

    fn outstanding(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.kill_all();
    }
}
