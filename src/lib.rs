//! Debounce and throttle wrappers for high-frequency callbacks.

pub mod debounce;
pub mod limiter;
pub mod throttle;
pub mod timer;

pub use debounce::{debounce, Debounced};
pub use limiter::{Limiter, DEFAULT_WAIT};
pub use throttle::{throttle, Throttled};
pub use timer::{Action, Scheduler, TokioScheduler};
