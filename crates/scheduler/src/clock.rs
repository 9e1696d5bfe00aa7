//! `Clock` — the consumed interface (§6) behind every `now()`/sleep in this
//! crate, so tests can inject a deterministic one instead of wall-clock
//! time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic-enough wall time for trigger-time comparisons and
    /// timestamping persisted rows.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`. Used for the scheduler's
    /// between-poll sleep and the executor runtime's retry backoff.
    async fn sleep(&self, duration: Duration);
}

/// Production clock: `chrono::Utc::now()` plus `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Test clock with a settable `now()`; `sleep` yields once rather than
    /// actually waiting, so tests stay fast and deterministic.
    pub struct FakeClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FakeClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self { now: Mutex::new(now) }
        }

        pub fn advance(&self, duration: Duration) {
            let mut now = self.now.lock();
            *now += chrono::Duration::from_std(duration).unwrap();
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }

        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }
    }
}
