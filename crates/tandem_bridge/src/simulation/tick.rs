//! # Simulation Tick Loop
//!
//! Fixed wall-clock interval, independent of the render frame rate.
//!
//! ## Design
//!
//! The tick loop must:
//! - Fire at the configured rate, sleeping between ticks
//! - Measure how long each tick took
//! - Count ticks skipped because the consumer still held the buffer

use std::time::{Duration, Instant};

/// Fixed-interval tick controller.
pub struct TickLoop {
    /// Target tick duration.
    tick_duration: Duration,
    /// Time of the last `should_tick` poll.
    last_tick: Instant,
    /// Time owed to ticks not yet run.
    accumulator: Duration,
    /// Ticks started.
    tick_count: u64,
    /// Timing statistics.
    stats: TickStats,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest tick observed, in microseconds.
    pub min_tick_us: u64,
    /// Longest tick observed, in microseconds.
    pub max_tick_us: u64,
    /// Rolling average tick duration, in microseconds.
    pub avg_tick_us: u64,
    /// Ticks that overran their budget.
    pub late_ticks: u64,
    /// Ticks skipped because the buffer was still in flight.
    pub skipped_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(tick_duration),
            late_ticks: 0,
            skipped_ticks: 0,
            total_ticks: 0,
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl TickLoop {
    /// Creates a tick loop firing `tick_rate` times per second.
    ///
    /// # Panics
    ///
    /// Panics if `tick_rate` is zero.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        assert!(tick_rate > 0, "tick rate must be positive");
        let tick_duration = Duration::from_micros(1_000_000 / u64::from(tick_rate));

        Self {
            tick_duration,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Returns true if a tick is due.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;

        self.accumulator >= self.tick_duration
    }

    /// Marks the start of a tick.
    ///
    /// Returns the start time for duration measurement.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        // Never owe more than one tick: a stall is absorbed by the engine's
        // bounded sub-steps, not by a burst of back-to-back ticks
        self.accumulator = self.accumulator.min(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Marks the end of a tick and records its duration.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = micros(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);

        // Rolling average
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Records a tick that found the buffer still in flight.
    pub fn record_skip(&mut self) {
        self.stats.skipped_ticks += 1;
    }

    /// Sleeps until the next tick is due, spinning for the last stretch.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_tick.elapsed();

        if elapsed < self.tick_duration {
            let remaining = self.tick_duration - elapsed;

            if remaining > Duration::from_micros(1000) {
                std::thread::sleep(remaining - Duration::from_micros(500));
            }

            while self.last_tick.elapsed() < self.tick_duration {
                std::hint::spin_loop();
            }
        }
    }

    /// Forgets time owed so far; the next tick is one interval away.
    pub fn restart(&mut self) {
        self.last_tick = Instant::now();
        self.accumulator = Duration::ZERO;
    }

    /// Returns the number of ticks started.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Returns the target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(tandem_shared::TICK_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_loop_creation() {
        let tick_loop = TickLoop::new(60);
        assert_eq!(tick_loop.tick_count(), 0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_micros(16666));
    }

    #[test]
    fn test_tick_execution() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(5));

        assert!(tick_loop.should_tick());
        let start = tick_loop.begin_tick();
        tick_loop.end_tick(start);

        assert_eq!(tick_loop.tick_count(), 1);
        assert_eq!(tick_loop.stats().total_ticks, 1);
    }

    #[test]
    fn test_stall_does_not_queue_a_burst() {
        let mut tick_loop = TickLoop::new(10);
        std::thread::sleep(Duration::from_millis(250));

        assert!(tick_loop.should_tick());
        let _ = tick_loop.begin_tick();
        // At most one more tick is owed right away
        assert!(tick_loop.should_tick());
        let _ = tick_loop.begin_tick();
        assert!(!tick_loop.should_tick());
    }

    #[test]
    fn test_skips_are_counted_separately() {
        let mut tick_loop = TickLoop::new(60);
        tick_loop.record_skip();
        tick_loop.record_skip();
        assert_eq!(tick_loop.stats().skipped_ticks, 2);
        assert_eq!(tick_loop.stats().total_ticks, 0);

        tick_loop.reset_stats();
        assert_eq!(tick_loop.stats().skipped_ticks, 0);
    }

    #[test]
    fn test_restart_forgets_owed_time() {
        let mut tick_loop = TickLoop::new(10);
        std::thread::sleep(Duration::from_millis(150));
        tick_loop.restart();
        assert!(!tick_loop.should_tick());
    }
}
