use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::trace;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TickControl {
    Continue,
    Halt,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Tick {
    pub elapsed: Duration,
    // How far past its own deadline this tick fired.
    pub lateness: Duration,
}

/// Fixed-cadence deadline tracking. Deadlines advance by whole intervals from
/// the start instant, so a late tick never pushes later ticks back and the
/// summed `elapsed` values always equal the time since the start.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    next_deadline: Instant,
    last_tick: Instant,
}

impl Cadence {
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_deadline: start + interval,
            last_tick: start,
        }
    }

    /// At most one tick is produced per call however late `now` is.
    pub fn poll(&mut self, now: Instant) -> Option<Tick> {
        if now < self.next_deadline {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.last_tick);
        let lateness = now.saturating_duration_since(self.next_deadline);
        self.last_tick = now;
        self.next_deadline += self.interval;
        let mut skipped = 0_u32;
        while self.next_deadline <= now {
            self.next_deadline += self.interval;
            skipped += 1;
        }
        if skipped > 0 {
            trace!("tick ran late, skipped {skipped} deadline(s)");
        }
        Some(Tick { elapsed, lateness })
    }

    pub fn time_until_deadline(&self, now: Instant) -> Duration {
        self.next_deadline.saturating_duration_since(now)
    }
}

#[derive(Default)]
struct CancelToken {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    fn cancel(&self) {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.signal.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

pub struct TickScheduler {
    cancel: Arc<CancelToken>,
    join: Option<JoinHandle<()>>,
}

impl TickScheduler {
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(Tick) -> TickControl + Send + 'static,
    {
        let cancel = Arc::new(CancelToken::default());
        let cancel_for_thread = Arc::clone(&cancel);
        let join = thread::spawn(move || {
            let mut cadence = Cadence::new(Instant::now(), interval);
            loop {
                let now = Instant::now();
                if let Some(tick) = cadence.poll(now) {
                    if cancel_for_thread.is_cancelled() {
                        break;
                    }
                    if on_tick(tick) == TickControl::Halt {
                        break;
                    }
                    continue;
                }
                if cancel_for_thread.wait(cadence.time_until_deadline(now)) {
                    break;
                }
            }
        });
        Self {
            cancel,
            join: Some(join),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels and waits for the thread to exit. Must not be called from the
    /// tick callback itself.
    pub fn shutdown(mut self) {
        self.cancel_and_join();
    }

    fn cancel_and_join(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}
