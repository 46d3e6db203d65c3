//! The delayed-execution primitive the limiters are built on.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Instant},
};

/// Work run once when a scheduled timer fires.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Single-shot timers plus the clock they are measured against.
pub trait Scheduler: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Runs `action` once, `after` from now.
    fn schedule_once(&self, after: Duration, action: Action) -> Self::Handle;

    /// Prevents a scheduled action from running. Cancelling a timer that has
    /// already fired is a no-op.
    fn cancel(&self, handle: Self::Handle);

    fn now(&self) -> Instant;
}

/// Schedules timers as tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Binds to the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().context("no tokio runtime is running")?;
        Ok(Self::new(runtime))
    }
}

impl Scheduler for TokioScheduler {
    type Handle = JoinHandle<()>;

    fn schedule_once(&self, after: Duration, action: Action) -> JoinHandle<()> {
        // Deadlines past the clock's range wait on tokio's far-future sleep.
        let deadline = Instant::now().checked_add(after);
        self.runtime.spawn(async move {
            match deadline {
                Some(when) => time::sleep_until(when).await,
                None => time::sleep(after).await,
            }
            action();
        })
    }

    fn cancel(&self, handle: JoinHandle<()>) {
        handle.abort();
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}
