use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::duration::{duration_as_millis, format_clock_time};
use crate::clock::error::ClockError;
use crate::clock::events::{ClockEvent, EventSink};
use crate::clock::scheduler::{TickControl, TickScheduler};
use crate::clock::side::{Side, SideId, TickOutcome, TimeControl};
use crate::config::Preset;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_WARNING_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ClockSettings {
    pub tick_interval: Duration,
    pub warning_threshold: Duration,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    Idle,
    Running,
    Paused,
    Flagged,
}

impl ClockStatus {
    pub fn label(self) -> &'static str {
        match self {
            ClockStatus::Idle => "idle",
            ClockStatus::Running => "running",
            ClockStatus::Paused => "paused",
            ClockStatus::Flagged => "flagged",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SideSnapshot {
    #[serde(rename = "remaining_ms", serialize_with = "duration_as_millis")]
    pub remaining: Duration,
    pub warned: bool,
    pub critical: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ClockSnapshot {
    pub white: SideSnapshot,
    pub black: SideSnapshot,
    pub active_side: SideId,
    pub running: bool,
    pub flagged: bool,
    pub status: ClockStatus,
    pub time_control: TimeControl,
}

impl ClockSnapshot {
    pub fn side(&self, side: SideId) -> &SideSnapshot {
        match side {
            SideId::White => &self.white,
            SideId::Black => &self.black,
        }
    }

    // The star marks the side to move.
    pub fn summary(&self) -> String {
        let render = |side: SideId| {
            let marker = if self.active_side == side { "*" } else { "" };
            format!(
                "{side} {}{marker}",
                format_clock_time(self.side(side).remaining)
            )
        };
        format!(
            "{} | {} | {}",
            render(SideId::White),
            render(SideId::Black),
            self.status.label()
        )
    }
}

struct ClockState {
    white: Side,
    black: Side,
    active: SideId,
    running: bool,
    flagged: bool,
    started: bool,
    time_control: TimeControl,
    // Bumped whenever the clock stops; ticks from an older run are ignored.
    epoch: u64,
    scheduler: Option<TickScheduler>,
}

impl ClockState {
    fn new(time_control: TimeControl) -> Self {
        Self {
            white: Side::new(&time_control),
            black: Side::new(&time_control),
            active: SideId::White,
            running: false,
            flagged: false,
            started: false,
            time_control,
            epoch: 0,
            scheduler: None,
        }
    }

    fn side(&self, side: SideId) -> &Side {
        match side {
            SideId::White => &self.white,
            SideId::Black => &self.black,
        }
    }

    fn side_mut(&mut self, side: SideId) -> &mut Side {
        match side {
            SideId::White => &mut self.white,
            SideId::Black => &mut self.black,
        }
    }

    fn status(&self) -> ClockStatus {
        if self.flagged {
            ClockStatus::Flagged
        } else if self.running {
            ClockStatus::Running
        } else if self.started {
            ClockStatus::Paused
        } else {
            ClockStatus::Idle
        }
    }

    fn snapshot(&self, warning_threshold: Duration) -> ClockSnapshot {
        let side_snapshot = |side: &Side| SideSnapshot {
            remaining: side.remaining(),
            warned: side.warned(),
            critical: side.is_critical(warning_threshold),
        };
        ClockSnapshot {
            white: side_snapshot(&self.white),
            black: side_snapshot(&self.black),
            active_side: self.active,
            running: self.running,
            flagged: self.flagged,
            status: self.status(),
            time_control: self.time_control,
        }
    }
}

struct Shared {
    state: Mutex<ClockState>,
    sink: Arc<dyn EventSink>,
    settings: ClockSettings,
    scheduled: bool,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ClockState> {
        // Every operation validates before mutating, so a poisoned guard
        // still holds a consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_time(&self, state: &ClockState, side: SideId) {
        self.sink.publish(ClockEvent::TimeUpdated {
            side,
            remaining: state.side(side).remaining(),
        });
    }

    // Returns any leftover ticker; join it only after the lock is released.
    fn begin_running(self: &Arc<Self>, state: &mut ClockState) -> Option<TickScheduler> {
        let retired = state.scheduler.take();
        if let Some(old) = &retired {
            old.cancel();
        }

        state.running = true;
        state.started = true;
        state.epoch += 1;
        if self.scheduled {
            let epoch = state.epoch;
            let weak: Weak<Shared> = Arc::downgrade(self);
            state.scheduler = Some(TickScheduler::spawn(
                self.settings.tick_interval,
                move |tick| match weak.upgrade() {
                    Some(shared) => shared.tick(Some(epoch), tick.elapsed),
                    None => TickControl::Halt,
                },
            ));
        }
        info!("clock started, {} to move", state.active);
        self.sink.publish(ClockEvent::RunningChanged(true));
        retired
    }

    fn halt(&self, state: &mut ClockState) -> Option<TickScheduler> {
        state.running = false;
        state.epoch += 1;
        self.sink.publish(ClockEvent::RunningChanged(false));
        let retired = state.scheduler.take();
        if let Some(scheduler) = &retired {
            scheduler.cancel();
        }
        retired
    }

    fn tick(&self, epoch: Option<u64>, elapsed: Duration) -> TickControl {
        let mut state = self.lock_state();
        if !state.running || epoch.is_some_and(|current| current != state.epoch) {
            return TickControl::Halt;
        }

        let active = state.active;
        let threshold = self.settings.warning_threshold;
        let outcome = state.side_mut(active).tick(elapsed, threshold);
        self.publish_time(&state, active);
        match outcome {
            TickOutcome::Continuing => TickControl::Continue,
            TickOutcome::CrossedWarning => {
                debug!("{active} dropped under {}", format_clock_time(threshold));
                self.sink.publish(ClockEvent::WarningCrossed(active));
                TickControl::Continue
            }
            TickOutcome::Flagged => {
                // The ticker is still running on this thread; it exits on
                // Halt and is joined by the next reset or drop.
                state.running = false;
                state.flagged = true;
                state.epoch += 1;
                info!("{active} flagged");
                self.sink.publish(ClockEvent::Flagged(active));
                self.sink.publish(ClockEvent::RunningChanged(false));
                TickControl::Halt
            }
        }
    }
}

fn retire(scheduler: Option<TickScheduler>) {
    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
    }
}

pub struct ClockEngine {
    shared: Arc<Shared>,
}

impl ClockEngine {
    pub fn new(
        time_control: TimeControl,
        settings: ClockSettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::build(time_control, settings, sink, true)
    }

    /// Only advances through explicit `tick` calls.
    pub fn manual(
        time_control: TimeControl,
        settings: ClockSettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::build(time_control, settings, sink, false)
    }

    fn build(
        time_control: TimeControl,
        settings: ClockSettings,
        sink: Arc<dyn EventSink>,
        scheduled: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ClockState::new(time_control)),
                sink,
                settings,
                scheduled,
            }),
        }
    }

    pub fn settings(&self) -> ClockSettings {
        self.shared.settings
    }

    pub fn start(&self) -> Result<(), ClockError> {
        let retired = {
            let mut state = self.shared.lock_state();
            if state.flagged {
                return Err(rejected(ClockError::transition(
                    "start",
                    "the clock has flagged; reset it first",
                )));
            }
            if state.running {
                return Ok(());
            }
            self.shared.begin_running(&mut state)
        };
        retire(retired);
        Ok(())
    }

    /// Stops the clock. Once this returns no further tick can change the
    /// remaining time.
    pub fn stop(&self) {
        let retired = {
            let mut state = self.shared.lock_state();
            if !state.running {
                return;
            }
            info!("clock stopped");
            self.shared.halt(&mut state)
        };
        retire(retired);
    }

    pub fn toggle(&self) -> Result<bool, ClockError> {
        let (running, retired) = {
            let mut state = self.shared.lock_state();
            if state.flagged {
                return Err(rejected(ClockError::transition(
                    "toggle",
                    "the clock has flagged; reset it first",
                )));
            }
            if state.running {
                info!("clock stopped");
                (false, self.shared.halt(&mut state))
            } else {
                (true, self.shared.begin_running(&mut state))
            }
        };
        retire(retired);
        Ok(running)
    }

    /// The press that starts the clock credits no increment.
    pub fn press(&self, side: SideId) -> Result<(), ClockError> {
        let retired = {
            let mut state = self.shared.lock_state();
            if state.flagged {
                return Err(rejected(ClockError::transition(
                    "press",
                    "the clock has flagged; reset it first",
                )));
            }
            if side != state.active {
                return Err(rejected(ClockError::transition(
                    "press",
                    format!("it is {}'s turn, not {side}'s", state.active),
                )));
            }

            let retired = if state.running {
                state.side_mut(side).apply_increment();
                self.shared.publish_time(&state, side);
                None
            } else {
                self.shared.begin_running(&mut state)
            };
            state.active = side.other();
            debug!("{side} moved, {} to move", state.active);
            self.shared
                .sink
                .publish(ClockEvent::TurnSwitched(state.active));
            retired
        };
        retire(retired);
        Ok(())
    }

    pub fn tick(&self, elapsed: Duration) -> TickControl {
        self.shared.tick(None, elapsed)
    }

    pub fn reset(&self, time_control: Option<TimeControl>) {
        let (halted, leftover) = {
            let mut state = self.shared.lock_state();
            let halted = if state.running {
                self.shared.halt(&mut state)
            } else {
                None
            };
            let leftover = state.scheduler.take();

            if let Some(time_control) = time_control {
                state.time_control = time_control;
            }
            let time_control = state.time_control;
            state.flagged = false;
            state.started = false;
            state.white.reset(&time_control);
            state.black.reset(&time_control);
            state.active = SideId::White;
            info!("clock reset to {time_control}");
            self.shared.publish_time(&state, SideId::White);
            self.shared.publish_time(&state, SideId::Black);
            self.shared
                .sink
                .publish(ClockEvent::TurnSwitched(SideId::White));
            (halted, leftover)
        };
        retire(halted);
        retire(leftover);
    }

    /// Applies a time control typed into the setup form. Invalid input keeps
    /// the current configuration and leaves the clock untouched.
    pub fn configure(
        &self,
        starting_time: &str,
        increment: &str,
    ) -> Result<TimeControl, ClockError> {
        let time_control = TimeControl::parse(starting_time, increment).map_err(rejected)?;
        self.reset(Some(time_control));
        Ok(time_control)
    }

    pub fn apply_preset(&self, preset: &Preset) {
        debug!("applying preset {}", preset.id);
        self.reset(Some(preset.time_control));
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        self.shared
            .lock_state()
            .snapshot(self.shared.settings.warning_threshold)
    }
}

impl Drop for ClockEngine {
    fn drop(&mut self) {
        let retired = {
            let mut state = self.shared.lock_state();
            state.running = false;
            state.epoch += 1;
            state.scheduler.take()
        };
        retire(retired);
    }
}

fn rejected(err: ClockError) -> ClockError {
    warn!("{err}");
    err
}
