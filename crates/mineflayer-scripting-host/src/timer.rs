use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// Shortest period a repeating timer may run at
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Script-visible identifier for a logical timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Interpret a number handed in by a script as a timer id
    ///
    /// Anything that is not a non-negative integer can never name a live
    /// timer, so it maps to `None`.
    pub fn from_script(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
            Some(TimerId(value as u64))
        } else {
            None
        }
    }

    /// Value handed back to scripts
    pub fn to_script(self) -> f64 {
        self.0 as f64
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scheduled logical timer and the task standing in for its platform timer
struct ScriptTimer<T> {
    repeats: bool,
    payload: T,
    task: JoinHandle<()>,
}

/// Multiplexes logical script timers onto tokio timer tasks
///
/// Every logical timer owns one spawned task that sleeps (one-shot) or
/// ticks (repeating) and posts the timer's id into the expiration channel.
/// The owner of the receiving end calls [`TimerMultiplexer::expire`] for
/// each id it receives; an id whose timer was cleared in the meantime is
/// simply unknown by then.
pub struct TimerMultiplexer<T> {
    timers: HashMap<TimerId, ScriptTimer<T>>,
    next_id: u64,
    expirations: UnboundedSender<TimerId>,
}

impl<T> TimerMultiplexer<T> {
    /// Create a multiplexer posting expirations into `expirations`
    pub fn new(expirations: UnboundedSender<TimerId>) -> Self {
        Self {
            timers: HashMap::new(),
            // 0 is falsy in scripts, so ids start at 1
            next_id: 1,
            expirations,
        }
    }

    /// Arm a new logical timer and return its id
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, payload: T, period: Duration, repeat: bool) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let tx = self.expirations.clone();
        let task = if repeat {
            let period = period.max(MIN_INTERVAL);
            tokio::spawn(async move {
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if tx.send(id).is_err() {
                        break;
                    }
                }
            })
        } else {
            tokio::spawn(async move {
                time::sleep(period).await;
                let _ = tx.send(id);
            })
        };

        trace!(target: "scripting", "Armed timer {} ({:?}, repeat: {})", id, period, repeat);
        self.timers.insert(
            id,
            ScriptTimer {
                repeats: repeat,
                payload,
                task,
            },
        );
        id
    }

    /// Handle an expiration posted by a timer task
    ///
    /// One-shot timers are retired before their payload is handed out, so
    /// whatever the callback does afterwards cannot touch the entry.
    /// Returns `None` for ids that are no longer live.
    pub fn expire(&mut self, id: TimerId) -> Option<T>
    where
        T: Clone,
    {
        let repeats = self.timers.get(&id)?.repeats;
        if repeats {
            return self.timers.get(&id).map(|timer| timer.payload.clone());
        }

        let timer = self.timers.remove(&id)?;
        timer.task.abort();
        Some(timer.payload)
    }

    /// Retire a timer; unknown ids are ignored
    pub fn clear(&mut self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some(timer) => {
                timer.task.abort();
                trace!(target: "scripting", "Cleared timer {}", id);
                true
            }
            None => false,
        }
    }

    /// Retire every live timer
    pub fn clear_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Get the number of live timers
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl<T> Drop for TimerMultiplexer<T> {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_one_shot_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMultiplexer::new(tx);
        let id = timers.schedule("once", Duration::from_millis(20), false);
        assert!(timers.is_active(id));

        let fired = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired, id);

        // Retired before the payload is handed out
        assert_eq!(timers.expire(fired), Some("once"));
        assert_eq!(timers.active_count(), 0);
        assert_eq!(timers.expire(fired), None);
    }

    #[tokio::test]
    async fn test_repeating_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMultiplexer::new(tx);
        let id = timers.schedule("again", Duration::from_millis(10), true);

        for _ in 0..3 {
            let fired = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(fired, id);
            assert_eq!(timers.expire(fired), Some("again"));
        }
        assert!(timers.is_active(id));

        assert!(timers.clear(id));
        assert_eq!(timers.active_count(), 0);
        // Anything already queued is stale now
        while let Ok(stale) = rx.try_recv() {
            assert_eq!(timers.expire(stale), None);
        }
    }

    #[tokio::test]
    async fn test_clear_before_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMultiplexer::new(tx);
        let id = timers.schedule((), Duration::from_millis(30), false);

        assert!(timers.clear(id));
        assert!(!timers.clear(id)); // Already removed
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_ids_are_fresh() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = TimerMultiplexer::new(tx);
        let first = timers.schedule((), Duration::from_secs(10), false);
        timers.clear(first);
        let second = timers.schedule((), Duration::from_secs(10), true);
        let third = timers.schedule((), Duration::from_secs(10), false);

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(first < second && second < third);
        assert_eq!(timers.active_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_period_interval_still_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMultiplexer::new(tx);
        let id = timers.schedule((), Duration::ZERO, true);

        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(id));
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(id));
        timers.clear_all();
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_timer_id_from_script() {
        assert_eq!(TimerId::from_script(3.0), Some(TimerId(3)));
        assert_eq!(TimerId::from_script(0.0), Some(TimerId(0)));
        assert_eq!(TimerId::from_script(-1.0), None);
        assert_eq!(TimerId::from_script(1.5), None);
        assert_eq!(TimerId::from_script(f64::NAN), None);
        assert_eq!(TimerId(7).to_script(), 7.0);
    }
}
