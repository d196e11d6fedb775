use std::{fmt, sync::Arc};

use parking_lot::Mutex;

type ReleaseFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct State<T> {
    count: usize,
    on_release: Option<ReleaseFn<T>>,
}

/// Reference count for a shared resource of type `T`.
///
/// The release callback runs once for every transition from 1 to 0. Calling
/// [`RefcountImpl::decr`] at 0 does nothing. The callback runs after the lock
/// is dropped, so it may call back into the counter.
pub struct RefcountImpl<T> {
    state: Mutex<State<T>>,
}

impl<T> RefcountImpl<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                count: 0,
                on_release: None,
            }),
        }
    }

    pub fn incr(&self) -> usize {
        let mut state = self.state.lock();
        state.count += 1;
        state.count
    }

    /// Returns the count after decrementing.
    pub fn decr(&self, resource: &T) -> usize {
        let release = {
            let mut state = self.state.lock();
            match state.count {
                0 => return 0,
                1 => {
                    state.count = 0;
                    state.on_release.clone()
                }
                _ => {
                    state.count -= 1;
                    return state.count;
                }
            }
        };
        if let Some(release) = release {
            release(resource);
        }
        0
    }

    /// Installs the release callback, replacing any previous one.
    pub fn on_release<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.state.lock().on_release = Some(Arc::new(f));
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().count
    }
}

impl<T> Default for RefcountImpl<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RefcountImpl<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refs={}", self.ref_count())
    }
}

/// A resource bundled with its own reference count.
pub struct Refcounted<T> {
    resource: T,
    refs: RefcountImpl<T>,
}

impl<T> Refcounted<T> {
    pub fn new(resource: T) -> Self {
        Self {
            resource,
            refs: RefcountImpl::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.resource
    }

    pub fn incr(&self) -> usize {
        self.refs.incr()
    }

    pub fn decr(&self) -> usize {
        self.refs.decr(&self.resource)
    }

    pub fn ref_count(&self) -> usize {
        self.refs.ref_count()
    }

    pub fn on_release<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.refs.on_release(f);
    }
}
