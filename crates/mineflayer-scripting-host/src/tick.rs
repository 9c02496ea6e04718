use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Rate at which the physics step is driven once logged in
pub const PHYSICS_FPS: u32 = 10;

/// Fixed-rate physics clock
///
/// Each tick reports the wall-clock seconds since the previous one, like a
/// stopwatch that is read and reset in one step.
pub struct TickDriver {
    stopwatch: Instant,
    interval: Interval,
}

impl TickDriver {
    /// Start the stopwatch and arm the first tick one period from now
    pub fn start(fps: u32) -> Self {
        let period = Duration::from_secs(1) / fps.max(1);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            stopwatch: Instant::now(),
            interval,
        }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Seconds since the previous restart; resets the stopwatch
    pub fn restart(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.stopwatch);
        self.stopwatch = now;
        elapsed.as_secs_f32()
    }

    /// Wait for the next tick and return the elapsed seconds
    pub async fn tick(&mut self) -> f32 {
        self.interval.tick().await;
        self.restart()
    }
}
