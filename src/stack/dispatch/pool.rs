use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::{runtime::Handle, sync::Semaphore};
use tracing::trace;

use super::error::{DispatchError, DispatchResult};

/// A unit of work handed to a [`ThreadPool`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The worker pool deliveries are offloaded to.
pub trait ThreadPool: Send + Sync {
    /// Hands `task` to a worker. On `Err` the task has been dropped without
    /// running.
    fn execute(&self, task: Task) -> DispatchResult<()>;
}

/// Runs tasks on tokio's blocking threads, with at most `capacity` of them
/// admitted at once. Anything past that is rejected rather than queued.
///
/// A task handed over while the runtime is shutting down is rejected. A task
/// already admitted when shutdown starts may still be dropped by tokio without
/// running; this pool cannot report that.
pub struct TokioThreadPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TokioThreadPool {
    pub fn new(handle: Handle, capacity: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Creates a pool on the runtime this is called from.
    pub fn current(capacity: usize) -> DispatchResult<Self> {
        Ok(Self::new(Handle::try_current()?, capacity))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks that could still be admitted right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl ThreadPool for TokioThreadPool {
    fn execute(&self, task: Task) -> DispatchResult<()> {
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            DispatchError::Rejected(format!(
                "all {} permits are in use",
                self.capacity
            ))
        })?;
        trace!(available = self.permits.available_permits(), "task admitted");
        let dropped = Arc::new(AtomicBool::new(false));
        let unrun = Unrun(Some(dropped.clone()));
        self.handle.spawn_blocking(move || {
            let _permit = permit;
            unrun.disarm();
            task();
        });
        // tokio drops the task on the spot when it refuses it
        if dropped.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected(
                "runtime is shutting down".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Flags a task that was dropped before it ran.
struct Unrun(Option<Arc<AtomicBool>>);

impl Unrun {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for Unrun {
    fn drop(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
