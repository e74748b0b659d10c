//! Where decode jobs run.
//!
//! The pipeline hands every decode to an [`Executor`] and never waits on it.
//! [`DecodePool`] runs jobs on a tokio runtime's blocking pool, which suits
//! decoders that block on file I/O.

use std::io;

use log::debug;
use tokio::runtime::{Builder, Runtime};

/// A unit of decode work. It reports its own result through the pipeline's
/// completion channel.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Start `job` without blocking the caller.
    fn execute(&self, job: Job);
}

/// Decode workers backed by a tokio blocking pool.
pub struct DecodePool {
    runtime: Option<Runtime>,
}

impl DecodePool {
    /// Create a pool running at most `threads` decodes at once.
    pub fn new(threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("gridload-decode")
            .build()?;
        debug!("decode pool: started with {threads} blocking threads");
        Ok(Self {
            runtime: Some(runtime),
        })
    }
}

impl Executor for DecodePool {
    fn execute(&self, job: Job) {
        if let Some(runtime) = &self.runtime {
            // Detached: the result travels back over the completion channel.
            drop(runtime.spawn_blocking(job));
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        // A hung decode must not hold up the owner.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("decode pool: shut down");
        }
    }
}
