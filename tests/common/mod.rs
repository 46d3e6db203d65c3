#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use fire_limit::{Action, Scheduler};
use tokio::time::Instant;

struct Timer {
    id: u64,
    when: Instant,
    action: Action,
}

struct Queue {
    start: Instant,
    now: Instant,
    next_id: u64,
    timers: Vec<Timer>,
}

/// A virtual clock whose timers only fire when the test advances it.
#[derive(Clone)]
pub struct ManualScheduler {
    queue: Arc<Mutex<Queue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            queue: Arc::new(Mutex::new(Queue {
                start,
                now: start,
                next_id: 0,
                timers: Vec::new(),
            })),
        }
    }

    pub fn elapsed(&self) -> Duration {
        let queue = self.queue.lock().unwrap();
        queue.now - queue.start
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().timers.len()
    }

    /// Moves the clock forward by `by`, running every timer that falls due in
    /// deadline order, each at its own deadline.
    pub fn advance(&self, by: Duration) {
        let target = self.queue.lock().unwrap().now + by;

        loop {
            let due = {
                let mut queue = self.queue.lock().unwrap();
                let next = queue
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.when <= target)
                    .min_by_key(|(_, timer)| (timer.when, timer.id))
                    .map(|(index, _)| index);

                match next {
                    Some(index) => {
                        let timer = queue.timers.remove(index);
                        queue.now = timer.when;
                        Some(timer.action)
                    }
                    None => {
                        queue.now = target;
                        None
                    }
                }
            };

            match due {
                Some(action) => action(),
                None => break,
            }
        }
    }

    /// Advances the clock to `at` measured from the scheduler's creation.
    pub fn advance_to(&self, at: Duration) {
        let elapsed = self.elapsed();
        assert!(at >= elapsed, "clock cannot move backwards");
        self.advance(at - elapsed);
    }
}

impl Scheduler for ManualScheduler {
    type Handle = u64;

    fn schedule_once(&self, after: Duration, action: Action) -> u64 {
        let mut queue = self.queue.lock().unwrap();
        let id = queue.next_id;
        queue.next_id += 1;
        let when = queue.now + after;
        queue.timers.push(Timer { id, when, action });
        id
    }

    fn cancel(&self, handle: u64) {
        self.queue
            .lock()
            .unwrap()
            .timers
            .retain(|timer| timer.id != handle);
    }

    fn now(&self) -> Instant {
        self.queue.lock().unwrap().now
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Records `(elapsed, scope, arg)` for every firing.
pub type Firings<C> = Arc<Mutex<Vec<(Duration, C, u32)>>>;

pub fn recording<C>(scheduler: &ManualScheduler) -> (Firings<C>, impl Fn(C, u32) -> u32 + Send + Sync)
where
    C: Send + 'static,
{
    let firings: Firings<C> = Arc::new(Mutex::new(Vec::new()));
    let sink = firings.clone();
    let clock = scheduler.clone();
    let callback = move |context: C, n: u32| {
        sink.lock().unwrap().push((clock.elapsed(), context, n));
        n
    };
    (firings, callback)
}
