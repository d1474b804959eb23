//! A `Sleeper` that records naps instead of taking them.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scribly_notifications::Sleeper;

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct InstantSleeper {
    naps: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    /// Delays requested so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn naps(&self) -> Vec<Duration> {
        self.naps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.naps.lock().unwrap().push(duration);
    }
}
