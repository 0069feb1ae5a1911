use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::clock::scheduler::{TickControl, TickScheduler};

pub struct TickStats {
    interval: Duration,
    total_ticks: u64,
    late_ticks: u64,
    total_elapsed: Duration,
    max_lateness: Duration,
    lateness_histogram: [u64; 6],
}

impl TickStats {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            total_ticks: 0,
            late_ticks: 0,
            total_elapsed: Duration::ZERO,
            max_lateness: Duration::ZERO,
            lateness_histogram: [0; 6],
        }
    }

    pub fn record_tick(&mut self, elapsed: Duration, lateness: Duration) {
        self.total_ticks += 1;
        self.total_elapsed += elapsed;
        self.max_lateness = self.max_lateness.max(lateness);
        if lateness > self.interval / 10 {
            self.late_ticks += 1;
        }
        self.update_histogram(lateness);
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }

    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    pub fn nominal_elapsed(&self) -> Duration {
        self.interval
            .saturating_mul(u32::try_from(self.total_ticks).unwrap_or(u32::MAX))
    }

    /// Signed difference between measured and nominal session time, in ms.
    pub fn drift_ms(&self) -> f64 {
        (self.total_elapsed.as_secs_f64() - self.nominal_elapsed().as_secs_f64()) * 1_000.0
    }

    pub fn max_lateness(&self) -> Duration {
        self.max_lateness
    }

    pub fn histogram(&self) -> [u64; 6] {
        self.lateness_histogram
    }

    fn update_histogram(&mut self, lateness: Duration) {
        let ms = lateness.as_secs_f64() * 1_000.0;
        let bucket = if ms <= 1.0 {
            0
        } else if ms <= 5.0 {
            1
        } else if ms <= 10.0 {
            2
        } else if ms <= 50.0 {
            3
        } else if ms <= 100.0 {
            4
        } else {
            5
        };
        self.lateness_histogram[bucket] += 1;
    }
}

/// Drives a real tick scheduler for `ticks` iterations and prints how closely
/// it tracked the nominal cadence.
pub fn run_diagnostics(interval: Duration, ticks: u32) -> Result<()> {
    if ticks == 0 {
        bail!("--diagnostic-ticks must be greater than zero");
    }

    println!("Chess clock diagnostics");
    println!("Tick interval: {} ms", interval.as_millis());
    println!("Running {ticks} tick pacing benchmark...");

    let stats = Arc::new(Mutex::new(TickStats::new(interval)));
    let stats_for_tick = Arc::clone(&stats);
    let (done_tx, done_rx) = mpsc::channel();
    let mut count = 0_u32;
    let scheduler = TickScheduler::spawn(interval, move |tick| {
        count += 1;
        stats_for_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_tick(tick.elapsed, tick.lateness);
        if count >= ticks {
            let _ = done_tx.send(());
            TickControl::Halt
        } else {
            TickControl::Continue
        }
    });

    let budget = interval.saturating_mul(ticks.saturating_mul(2)) + Duration::from_secs(5);
    let finished = done_rx.recv_timeout(budget).is_ok();
    scheduler.shutdown();
    if !finished {
        bail!("tick scheduler did not finish within {} ms", budget.as_millis());
    }

    let stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
    println!("Pacing summary:");
    println!("  Ticks: {}", stats.total_ticks());
    println!("  Nominal elapsed: {} ms", stats.nominal_elapsed().as_millis());
    println!("  Measured elapsed: {} ms", stats.total_elapsed().as_millis());
    println!("  Cumulative drift: {:+.3} ms", stats.drift_ms());
    println!("  Late ticks: {}", stats.late_ticks());
    println!(
        "  Max lateness: {:.3} ms",
        stats.max_lateness().as_secs_f64() * 1_000.0
    );
    println!("  Lateness histogram buckets (<=1, <=5, <=10, <=50, <=100, >100 ms):");
    println!("  {:?}", stats.histogram());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_drift_and_late_ticks() {
        let mut stats = TickStats::new(Duration::from_millis(100));
        stats.record_tick(Duration::from_millis(100), Duration::ZERO);
        stats.record_tick(Duration::from_millis(130), Duration::from_millis(30));
        stats.record_tick(Duration::from_millis(75), Duration::from_millis(5));

        assert_eq!(stats.total_ticks(), 3);
        assert_eq!(stats.late_ticks(), 1);
        assert_eq!(stats.nominal_elapsed(), Duration::from_millis(300));
        assert!((stats.drift_ms() - 5.0).abs() < 1e-6);
        assert_eq!(stats.max_lateness(), Duration::from_millis(30));
        assert_eq!(stats.histogram(), [1, 1, 0, 1, 0, 0]);
    }

    #[test]
    fn a_single_stall_counts_as_one_late_tick() {
        use std::time::Instant;

        use crate::clock::scheduler::Cadence;

        let interval = Duration::from_millis(5);
        let start = Instant::now();
        let mut cadence = Cadence::new(start, interval);
        let mut stats = TickStats::new(interval);
        let mut now = start;
        while stats.total_ticks() < 200 {
            now += cadence.time_until_deadline(now);
            if stats.total_ticks() == 60 {
                now += Duration::from_millis(60);
            }
            if let Some(tick) = cadence.poll(now) {
                stats.record_tick(tick.elapsed, tick.lateness);
            }
        }

        assert_eq!(stats.late_ticks(), 1);
        assert_eq!(stats.max_lateness(), Duration::from_millis(60));
        assert_eq!(stats.histogram(), [199, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn rejects_zero_ticks() {
        assert!(run_diagnostics(Duration::from_millis(1), 0).is_err());
    }
}
