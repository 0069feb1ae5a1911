use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::clock::duration::{duration_as_millis, format_clock_time, parse_clock_time};
use crate::clock::error::ClockError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideId {
    White,
    Black,
}

impl SideId {
    pub fn other(self) -> Self {
        match self {
            SideId::White => SideId::Black,
            SideId::Black => SideId::White,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SideId::White => "white",
            SideId::Black => "black",
        }
    }
}

impl fmt::Display for SideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Starting time and per-move increment applied to both sides on reset.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct TimeControl {
    #[serde(rename = "starting_time_ms", serialize_with = "duration_as_millis")]
    pub starting_time: Duration,
    #[serde(rename = "increment_ms", serialize_with = "duration_as_millis")]
    pub increment: Duration,
}

impl TimeControl {
    pub fn new(starting_time: Duration, increment: Duration) -> Result<Self, ClockError> {
        if starting_time.is_zero() {
            return Err(ClockError::format(
                &format_clock_time(starting_time),
                "starting time must be greater than zero",
            ));
        }
        Ok(Self {
            starting_time,
            increment,
        })
    }

    /// Parses the setup form's two `minutes:seconds` fields. Nothing is
    /// returned unless both are valid.
    pub fn parse(starting_time: &str, increment: &str) -> Result<Self, ClockError> {
        let starting = parse_clock_time(starting_time)?;
        let increment = parse_clock_time(increment)?;
        if starting.is_zero() {
            return Err(ClockError::format(
                starting_time,
                "starting time must be greater than zero",
            ));
        }
        Ok(Self {
            starting_time: starting,
            increment,
        })
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self {
            starting_time: Duration::from_secs(15),
            increment: Duration::from_secs(5),
        }
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} +{}s",
            format_clock_time(self.starting_time),
            self.increment.as_secs()
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TickOutcome {
    Continuing,
    CrossedWarning,
    Flagged,
}

#[derive(Debug, Clone)]
pub struct Side {
    remaining: Duration,
    increment: Duration,
    warned: bool,
}

impl Side {
    pub fn new(time_control: &TimeControl) -> Self {
        Self {
            remaining: time_control.starting_time,
            increment: time_control.increment,
            warned: false,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn warned(&self) -> bool {
        self.warned
    }

    pub fn is_critical(&self, threshold: Duration) -> bool {
        self.remaining < threshold
    }

    pub fn apply_increment(&mut self) {
        self.remaining = self.remaining.saturating_add(self.increment);
    }

    /// Deducts `elapsed` and reports the threshold crossed by this call, if
    /// any. Reaching zero outranks the warning when both happen at once.
    pub fn tick(&mut self, elapsed: Duration, warning_threshold: Duration) -> TickOutcome {
        let before = self.remaining;
        self.remaining = before.saturating_sub(elapsed);

        if !before.is_zero() && self.remaining.is_zero() {
            return TickOutcome::Flagged;
        }
        if !self.warned && before >= warning_threshold && self.remaining < warning_threshold {
            self.warned = true;
            return TickOutcome::CrossedWarning;
        }
        TickOutcome::Continuing
    }

    pub fn reset(&mut self, time_control: &TimeControl) {
        self.remaining = time_control.starting_time;
        self.increment = time_control.increment;
        self.warned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(10);

    fn side_with(remaining: Duration) -> Side {
        let control = TimeControl::new(remaining, Duration::from_secs(2)).expect("time control");
        Side::new(&control)
    }

    #[test]
    fn warning_fires_once_per_countdown() {
        let mut side = side_with(Duration::from_millis(10_500));
        let mut warnings = 0;
        let mut first_warning_at = None;
        for step in 0..50 {
            if side.tick(Duration::from_millis(100), THRESHOLD) == TickOutcome::CrossedWarning {
                warnings += 1;
                first_warning_at.get_or_insert(step);
            }
        }
        assert_eq!(warnings, 1);
        assert_eq!(first_warning_at, Some(5));
        assert!(side.warned());
    }

    #[test]
    fn warning_does_not_repeat_after_increment_lifts_time() {
        let mut side = side_with(Duration::from_millis(10_100));
        assert_eq!(
            side.tick(Duration::from_millis(200), THRESHOLD),
            TickOutcome::CrossedWarning
        );
        side.apply_increment();
        side.apply_increment();
        assert_eq!(side.remaining(), Duration::from_millis(13_900));
        for _ in 0..40 {
            assert_ne!(
                side.tick(Duration::from_millis(100), THRESHOLD),
                TickOutcome::CrossedWarning
            );
        }
    }

    #[test]
    fn reaching_zero_floors_and_flags_once() {
        let mut side = side_with(Duration::from_millis(50));
        assert_eq!(
            side.tick(Duration::from_secs(1), THRESHOLD),
            TickOutcome::Flagged
        );
        assert_eq!(side.remaining(), Duration::ZERO);
        assert_eq!(
            side.tick(Duration::from_secs(1), THRESHOLD),
            TickOutcome::Continuing
        );
        assert_eq!(side.remaining(), Duration::ZERO);
    }

    #[test]
    fn flag_takes_precedence_over_skipped_warning() {
        let mut side = side_with(Duration::from_secs(12));
        assert_eq!(
            side.tick(Duration::from_secs(15), THRESHOLD),
            TickOutcome::Flagged
        );
        assert!(!side.warned());
    }

    #[test]
    fn starting_under_threshold_never_warns() {
        let mut side = side_with(Duration::from_secs(5));
        assert_eq!(
            side.tick(Duration::from_millis(100), THRESHOLD),
            TickOutcome::Continuing
        );
        assert!(side.is_critical(THRESHOLD));
    }

    #[test]
    fn reset_restores_time_control_and_clears_warning() {
        let mut side = side_with(Duration::from_millis(10_050));
        side.tick(Duration::from_millis(100), THRESHOLD);
        assert!(side.warned());

        let next = TimeControl::new(Duration::from_secs(180), Duration::from_secs(2))
            .expect("time control");
        side.reset(&next);
        assert_eq!(side.remaining(), Duration::from_secs(180));
        assert_eq!(side.increment, Duration::from_secs(2));
        assert!(!side.warned());
    }

    #[test]
    fn time_control_parse_is_all_or_nothing() {
        let parsed = TimeControl::parse("05:00", "00:03").expect("valid");
        assert_eq!(parsed.starting_time, Duration::from_secs(300));
        assert_eq!(parsed.increment, Duration::from_secs(3));

        assert!(TimeControl::parse("05:00", "bad").is_err());
        assert!(TimeControl::parse("00:00", "00:03").is_err());
        assert_eq!(parsed.to_string(), "05:00 +3s");
    }
}
