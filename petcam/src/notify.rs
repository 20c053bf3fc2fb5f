//! Alert side-effect and its cooldown.
//!
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Fire-and-forget alert collaborator.
///
/// Implementations must not block and must not propagate failure.
pub trait Notifier: Send + Sync {
    fn alert(&self);
}

/// Rings the terminal bell.
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn alert(&self) {
        let mut stdout = std::io::stdout();
        if let Err(err) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
            log::warn!("Could not ring alert bell: {err}");
        }
    }
}

/// Minimum-interval policy between consecutive alerts.
pub struct AlertThrottle {
    cooldown: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: Mutex::new(None),
        }
    }

    /// Claim an alert slot. Returns false while the cooldown since the last
    /// claimed slot has not fully elapsed.
    pub fn acquire(&self) -> bool {
        let now = Instant::now();
        let mut last_fired = self.last_fired.lock().unwrap();

        match *last_fired {
            Some(fired_at) if now.duration_since(fired_at) <= self.cooldown => false,
            _ => {
                *last_fired = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_blocks_within_cooldown() {
        let throttle = AlertThrottle::new(Duration::from_millis(2000));

        assert!(throttle.acquire());
        assert!(!throttle.acquire());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(!throttle.acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_reopens_after_cooldown() {
        let throttle = AlertThrottle::new(Duration::from_millis(2000));

        assert!(throttle.acquire());
        tokio::time::advance(Duration::from_millis(2100)).await;
        assert!(throttle.acquire());
    }
}
