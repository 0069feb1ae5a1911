use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::clock::side::SideId;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ClockEvent {
    TimeUpdated { side: SideId, remaining: Duration },
    WarningCrossed(SideId),
    Flagged(SideId),
    TurnSwitched(SideId),
    RunningChanged(bool),
}

impl ClockEvent {
    fn slot(&self) -> usize {
        match self {
            ClockEvent::TimeUpdated {
                side: SideId::White,
                ..
            } => 0,
            ClockEvent::TimeUpdated {
                side: SideId::Black,
                ..
            } => 1,
            ClockEvent::WarningCrossed(_) => 2,
            ClockEvent::Flagged(_) => 3,
            ClockEvent::RunningChanged(_) => 4,
            ClockEvent::TurnSwitched(_) => 5,
        }
    }
}

// Time updates get a slot per side so a reset reports both clocks.
const SLOT_COUNT: usize = 6;

/// Receives engine events. Called with the engine lock held, so it must not
/// block or call back into the engine.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ClockEvent);
}

/// Coalescing sink holding at most one pending event per kind. A newer event
/// of the same kind replaces the undelivered one.
#[derive(Default)]
pub struct EventMailbox {
    pending: Mutex<[Option<ClockEvent>; SLOT_COUNT]>,
    ready: Condvar,
}

impl EventMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for events and drains every pending slot.
    pub fn recv_timeout(&self, timeout: Duration) -> Vec<ClockEvent> {
        let Ok(guard) = self.pending.lock() else {
            return Vec::new();
        };
        let Ok((mut guard, _)) = self
            .ready
            .wait_timeout_while(guard, timeout, |slots| slots.iter().all(Option::is_none))
        else {
            return Vec::new();
        };
        guard.iter_mut().filter_map(Option::take).collect()
    }
}

impl EventSink for EventMailbox {
    fn publish(&self, event: ClockEvent) {
        // A poisoned mailbox drops the event; delivery never fails the engine.
        if let Ok(mut slots) = self.pending.lock() {
            slots[event.slot()] = Some(event);
            self.ready.notify_all();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<ClockEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<ClockEvent> {
            self.events.lock().expect("recording lock").clone()
        }

        pub fn count(&self, matches: impl Fn(&ClockEvent) -> bool) -> usize {
            self.events().iter().filter(|event| matches(event)).count()
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: ClockEvent) {
            self.events.lock().expect("recording lock").push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn mailbox_keeps_latest_event_per_kind() {
        let mailbox = EventMailbox::new();
        for millis in [900, 800, 700] {
            mailbox.publish(ClockEvent::TimeUpdated {
                side: SideId::White,
                remaining: Duration::from_millis(millis),
            });
        }
        mailbox.publish(ClockEvent::RunningChanged(true));

        let drained = mailbox.recv_timeout(Duration::from_millis(10));
        assert_eq!(
            drained,
            vec![
                ClockEvent::TimeUpdated {
                    side: SideId::White,
                    remaining: Duration::from_millis(700),
                },
                ClockEvent::RunningChanged(true),
            ]
        );
        assert!(mailbox.recv_timeout(Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn mailbox_reports_time_for_both_sides() {
        let mailbox = EventMailbox::new();
        mailbox.publish(ClockEvent::TimeUpdated {
            side: SideId::White,
            remaining: Duration::from_secs(60),
        });
        mailbox.publish(ClockEvent::TimeUpdated {
            side: SideId::Black,
            remaining: Duration::from_secs(60),
        });
        assert_eq!(mailbox.recv_timeout(Duration::from_millis(10)).len(), 2);
    }

    #[test]
    fn flag_is_delivered_before_the_clock_stops() {
        let mailbox = EventMailbox::new();
        mailbox.publish(ClockEvent::TimeUpdated {
            side: SideId::White,
            remaining: Duration::ZERO,
        });
        mailbox.publish(ClockEvent::Flagged(SideId::White));
        mailbox.publish(ClockEvent::RunningChanged(false));

        assert_eq!(
            mailbox.recv_timeout(Duration::from_millis(10)),
            vec![
                ClockEvent::TimeUpdated {
                    side: SideId::White,
                    remaining: Duration::ZERO,
                },
                ClockEvent::Flagged(SideId::White),
                ClockEvent::RunningChanged(false),
            ]
        );
    }

    #[test]
    fn mailbox_wakes_waiting_subscriber() {
        let mailbox = Arc::new(EventMailbox::new());
        let publisher = Arc::clone(&mailbox);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.publish(ClockEvent::Flagged(SideId::Black));
        });

        let drained = mailbox.recv_timeout(Duration::from_secs(5));
        handle.join().expect("publisher thread");
        assert_eq!(drained, vec![ClockEvent::Flagged(SideId::Black)]);
    }
}
