//! Fixed-window request counter shared by the gateway (outbound) and the
//! server guard (inbound).

use std::time::Duration;

use tokio::time::Instant;

/// Counts admissions in a window that resets `window` after it opened.
#[derive(Debug)]
pub struct RollingWindow {
    limit: u32,
    window: Duration,
    opened_at: Instant,
    count: u32,
}

impl RollingWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            opened_at: Instant::now(),
            count: 0,
        }
    }

    /// Admit one request at `now`, or return how long until the window resets.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if now.saturating_duration_since(self.opened_at) >= self.window {
            self.opened_at = now;
            self.count = 0;
        }
        if self.count < self.limit {
            self.count += 1;
            Ok(())
        } else {
            Err((self.opened_at + self.window).saturating_duration_since(now))
        }
    }

    /// Requests admitted in the current window.
    pub fn used(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn blocks_after_limit_until_window_resets() {
        let mut window = RollingWindow::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(window.try_acquire(start).is_ok());
        assert!(window.try_acquire(start).is_ok());

        let wait = window.try_acquire(start + Duration::from_secs(10)).unwrap_err();
        assert_eq!(wait, Duration::from_secs(50));
        assert_eq!(window.used(), 2);

        assert!(window.try_acquire(start + Duration::from_secs(60)).is_ok());
        assert_eq!(window.used(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_is_clamped() {
        let mut window = RollingWindow::new(0, Duration::from_secs(1));
        assert_eq!(window.limit(), 1);
        assert!(window.try_acquire(Instant::now()).is_ok());
    }
}
