use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::{
    limiter::{effective_wait, lock, Callback, Limiter},
    timer::{Scheduler, TokioScheduler},
};

struct Pending<H> {
    generation: u64,
    handle: H,
}

struct State<C, A, H> {
    timer: Option<Pending<H>>,
    generation: u64,
    latest: Option<(C, A)>,
}

struct Inner<C, A, R, S: Scheduler> {
    callback: Callback<C, A, R>,
    delay: Duration,
    immediate: bool,
    scope: Option<C>,
    scheduler: S,
    state: Mutex<State<C, A, S::Handle>>,
}

/// A callback that only fires once calls to it stop for `delay`.
///
/// In trailing mode the callback runs `delay` after the last call of a burst,
/// with that call's context and arguments. With `immediate` set it runs on the
/// first call of a burst instead, and a burst only ends once `delay` passes
/// without a call.
pub struct Debounced<C, A, R, S: Scheduler = TokioScheduler> {
    inner: Arc<Inner<C, A, R, S>>,
}

/// Wraps `callback` in a [`Debounced`] scheduled on the current tokio runtime.
///
/// A zero `delay` means [`DEFAULT_WAIT`](crate::DEFAULT_WAIT). When `scope` is
/// set it replaces the receiver of every call.
pub fn debounce<C, A, R, F>(
    callback: F,
    delay: Duration,
    immediate: bool,
    scope: Option<C>,
) -> Result<Debounced<C, A, R>>
where
    F: Fn(C, A) -> R + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    A: Send + 'static,
    R: 'static,
{
    let scheduler = TokioScheduler::current().context("debounce requires a tokio runtime")?;
    Ok(Debounced::with_scheduler(
        callback, delay, immediate, scope, scheduler,
    ))
}

impl<C, A, R, S> Debounced<C, A, R, S>
where
    C: Clone + Send + Sync + 'static,
    A: Send + 'static,
    R: 'static,
    S: Scheduler,
{
    pub fn with_scheduler<F>(
        callback: F,
        delay: Duration,
        immediate: bool,
        scope: Option<C>,
        scheduler: S,
    ) -> Self
    where
        F: Fn(C, A) -> R + Send + Sync + 'static,
    {
        let inner = Inner {
            callback: Arc::new(callback),
            delay: effective_wait(delay),
            immediate,
            scope,
            scheduler,
            state: Mutex::new(State {
                timer: None,
                generation: 0,
                latest: None,
            }),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registers a call, restarting the quiet period. Returns the callback's
    /// output only when this call fired it on the leading edge.
    pub fn invoke(&self, receiver: C, args: A) -> Option<R> {
        let inner = &self.inner;
        let context = inner.scope.clone().unwrap_or(receiver);

        let mut state = lock(&inner.state);
        let call_now = inner.immediate && state.timer.is_none();

        if let Some(pending) = state.timer.take() {
            trace!(generation = pending.generation, "debounce timer cancelled");
            inner.scheduler.cancel(pending.handle);
        }

        // Only the trailing edge reads the recorded call.
        let leading = if inner.immediate {
            Some((context, args))
        } else {
            state.latest = Some((context, args));
            None
        };

        state.generation += 1;
        let generation = state.generation;
        let expiry = Arc::clone(inner);
        let handle = inner
            .scheduler
            .schedule_once(inner.delay, Box::new(move || expiry.expire(generation)));
        state.timer = Some(Pending { generation, handle });
        drop(state);

        debug!(
            generation,
            delay = ?inner.delay,
            "debounce timer scheduled"
        );

        match leading {
            Some((context, args)) if call_now => {
                debug!("debounce firing on leading edge");
                Some((inner.callback)(context, args))
            }
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner.state).timer.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl<A, R, S> Debounced<(), A, R, S>
where
    A: Send + 'static,
    R: 'static,
    S: Scheduler,
{
    pub fn call(&self, args: A) -> Option<R> {
        self.invoke((), args)
    }
}

impl<C, A, R, S: Scheduler> Inner<C, A, R, S> {
    fn expire(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.timer.as_ref().map(|pending| pending.generation) != Some(generation) {
            trace!(generation, "stale debounce timer ignored");
            return;
        }

        state.timer = None;
        let latest = if self.immediate {
            None
        } else {
            state.latest.take()
        };
        drop(state);

        if let Some((context, args)) = latest {
            debug!(generation, "debounce firing on trailing edge");
            (self.callback)(context, args);
        }
    }
}

impl<C, A, R, S> Limiter<C, A> for Debounced<C, A, R, S>
where
    C: Clone + Send + Sync + 'static,
    A: Send + 'static,
    R: 'static,
    S: Scheduler,
{
    type Output = R;

    fn invoke(&self, receiver: C, args: A) -> Option<R> {
        Debounced::invoke(self, receiver, args)
    }

    fn is_pending(&self) -> bool {
        Debounced::is_pending(self)
    }
}

impl<C, A, R, S: Scheduler> Clone for Debounced<C, A, R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, A, R, S: Scheduler> fmt::Debug for Debounced<C, A, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.inner.delay)
            .field("immediate", &self.inner.immediate)
            .field("pending", &lock(&self.inner.state).timer.is_some())
            .finish_non_exhaustive()
    }
}
