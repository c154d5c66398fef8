//! Clock port.
//!
//! The scheduler reads wall-clock time through this trait so that tests can
//! substitute a deterministic source.
//!
//! - `SystemClock`: production, `Utc::now()`
//! - `SimulatedClock`: follows tokio's timer clock, so under
//!   `tokio::time::pause` the scheduler's notion of "now" advances with
//!   virtual time

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that maps tokio's (pausable) timer clock onto chrono time.
///
/// `now()` returns `epoch + elapsed-since-construction`, where elapsed is
/// measured on `tokio::time::Instant`. Must be constructed inside a tokio
/// runtime.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedClock {
    epoch: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl SimulatedClock {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::from_std(self.started.elapsed()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_tracks_utc_now() {
        let clock = SystemClock;
        let before = Utc::now();
        let actual = clock.now();
        let after = Utc::now();

        assert!(actual >= before);
        assert!(actual <= after);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_clock_follows_virtual_time() {
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = SimulatedClock::new(epoch);

        assert_eq!(clock.now(), epoch);

        tokio::time::sleep(std::time::Duration::from_secs(90)).await;
        assert_eq!(clock.now(), epoch + chrono::Duration::seconds(90));
    }
}
