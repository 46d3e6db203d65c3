use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// Wait applied when a wrapper is built with a zero delay or threshold.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(250);

pub(crate) fn effective_wait(wait: Duration) -> Duration {
    if wait.is_zero() {
        DEFAULT_WAIT
    } else {
        wait
    }
}

pub(crate) type Callback<C, A, R> = Arc<dyn Fn(C, A) -> R + Send + Sync>;

// A panicking callback never runs under the lock, so poisoning carries no torn state.
pub(crate) fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A call-rate limiter wrapping a callback of `(context, args) -> output`.
pub trait Limiter<C, A> {
    type Output;

    /// Runs the wrapped callback against `receiver` (unless the limiter was
    /// built with a scope) if the limiting policy lets this call through.
    fn invoke(&self, receiver: C, args: A) -> Option<Self::Output>;

    /// Whether a deferred firing is currently scheduled.
    fn is_pending(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_wait_falls_back_to_default() {
        assert_eq!(effective_wait(Duration::ZERO), DEFAULT_WAIT);
        assert_eq!(effective_wait(Duration::from_millis(40)), Duration::from_millis(40));
    }

    #[test]
    fn lock_recovers_from_poisoning() {
        let state = Arc::new(Mutex::new(1));
        let poisoner = state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(state.is_poisoned());
        *lock(&state) += 1;
        assert_eq!(*lock(&state), 2);
    }
}
