use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{
    limiter::{effective_wait, lock, Callback, Limiter},
    timer::{Scheduler, TokioScheduler},
};

struct State<C, A, R, H> {
    timer: Option<H>,
    latest: Option<(C, A)>,
    previous: Option<Instant>,
    result: Option<R>,
}

struct Inner<C, A, R, S: Scheduler> {
    callback: Callback<C, A, R>,
    threshold: Duration,
    immediate: bool,
    scope: Option<C>,
    scheduler: S,
    state: Mutex<State<C, A, R, S::Handle>>,
}

/// A callback that fires at most once per `threshold` window.
///
/// With `immediate` set, a call fires straight away when more than `threshold`
/// has passed since the last firing and is dropped otherwise. Without it, the
/// first call of a window schedules one firing `threshold` later, and every
/// call made before that firing only replaces the context and arguments it
/// will use.
///
/// Both edges never fire from the same instance.
pub struct Throttled<C, A, R, S: Scheduler = TokioScheduler> {
    inner: Arc<Inner<C, A, R, S>>,
}

/// Wraps `callback` in a [`Throttled`] scheduled on the current tokio runtime.
///
/// A zero `threshold` means [`DEFAULT_WAIT`](crate::DEFAULT_WAIT). When `scope`
/// is set it replaces the receiver of every call.
pub fn throttle<C, A, R, F>(
    callback: F,
    threshold: Duration,
    immediate: bool,
    scope: Option<C>,
) -> Result<Throttled<C, A, R>>
where
    F: Fn(C, A) -> R + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    A: Send + 'static,
    R: Clone + Send + 'static,
{
    let scheduler = TokioScheduler::current().context("throttle requires a tokio runtime")?;
    Ok(Throttled::with_scheduler(
        callback, threshold, immediate, scope, scheduler,
    ))
}

impl<C, A, R, S> Throttled<C, A, R, S>
where
    C: Clone + Send + Sync + 'static,
    A: Send + 'static,
    R: Clone + Send + 'static,
    S: Scheduler,
{
    pub fn with_scheduler<F>(
        callback: F,
        threshold: Duration,
        immediate: bool,
        scope: Option<C>,
        scheduler: S,
    ) -> Self
    where
        F: Fn(C, A) -> R + Send + Sync + 'static,
    {
        let inner = Inner {
            callback: Arc::new(callback),
            threshold: effective_wait(threshold),
            immediate,
            scope,
            scheduler,
            state: Mutex::new(State {
                timer: None,
                latest: None,
                previous: None,
                result: None,
            }),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registers a call and returns the most recent output of the callback,
    /// which is stale unless this call fired it.
    pub fn invoke(&self, receiver: C, args: A) -> Option<R> {
        let inner = &self.inner;
        let now = inner.scheduler.now();
        let context = inner.scope.clone().unwrap_or(receiver);

        let mut state = lock(&inner.state);

        if inner.immediate {
            // A window end past the clock's range never elapses.
            let due = state.previous.map_or(true, |previous| {
                previous
                    .checked_add(inner.threshold)
                    .map_or(false, |end| now > end)
            });
            if !due {
                trace!("throttled call dropped");
                return state.result.clone();
            }

            state.previous = Some(now);
            drop(state);

            debug!("throttle firing on leading edge");
            let result = (inner.callback)(context, args);
            lock(&inner.state).result = Some(result.clone());
            return Some(result);
        }

        state.latest = Some((context, args));
        if state.timer.is_none() {
            let expiry = Arc::clone(inner);
            let handle = inner
                .scheduler
                .schedule_once(inner.threshold, Box::new(move || expiry.expire()));
            state.timer = Some(handle);
            debug!(
                threshold = ?inner.threshold,
                "throttle timer scheduled"
            );
        } else {
            trace!("throttled call coalesced");
        }

        state.result.clone()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner.state).timer.is_some()
    }

    pub fn threshold(&self) -> Duration {
        self.inner.threshold
    }
}

impl<A, R, S> Throttled<(), A, R, S>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    S: Scheduler,
{
    pub fn call(&self, args: A) -> Option<R> {
        self.invoke((), args)
    }
}

impl<C, A, R, S: Scheduler> Inner<C, A, R, S> {
    fn expire(&self) {
        let latest = {
            let mut state = lock(&self.state);
            state.timer = None;
            state.latest.take()
        };

        if let Some((context, args)) = latest {
            debug!("throttle firing on trailing edge");
            let result = (self.callback)(context, args);
            lock(&self.state).result = Some(result);
        }
    }
}

impl<C, A, R, S> Limiter<C, A> for Throttled<C, A, R, S>
where
    C: Clone + Send + Sync + 'static,
    A: Send + 'static,
    R: Clone + Send + 'static,
    S: Scheduler,
{
    type Output = R;

    fn invoke(&self, receiver: C, args: A) -> Option<R> {
        Throttled::invoke(self, receiver, args)
    }

    fn is_pending(&self) -> bool {
        Throttled::is_pending(self)
    }
}

impl<C, A, R, S: Scheduler> Clone for Throttled<C, A, R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, A, R, S: Scheduler> fmt::Debug for Throttled<C, A, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("threshold", &self.inner.threshold)
            .field("immediate", &self.inner.immediate)
            .field("pending", &lock(&self.inner.state).timer.is_some())
            .finish_non_exhaustive()
    }
}
