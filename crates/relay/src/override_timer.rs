/// Caller-side deadline for a manual relay override.
///
/// The actuator never expires an override on its own; the application polls
/// this timer and releases the override once it reports expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverrideTimer {
    timeout_ms: u64,
    started_ms: Option<u64>,
}

impl Default for OverrideTimer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT_MS)
    }
}

impl OverrideTimer {
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            started_ms: None,
        }
    }

    /// Arm (or re-arm) the timer at `now_ms`.
    pub fn start(&mut self, now_ms: u64) {
        self.started_ms = Some(now_ms);
    }

    pub fn cancel(&mut self) {
        self.started_ms = None;
    }

    pub fn is_active(&self) -> bool {
        self.started_ms.is_some()
    }

    /// Time left before expiry; `None` when not armed.
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.started_ms
            .map(|start| self.timeout_ms.saturating_sub(now_ms.saturating_sub(start)))
    }

    /// True once the armed timer has run past its timeout. Disarms itself so
    /// expiry is reported once.
    pub fn poll_expired(&mut self, now_ms: u64) -> bool {
        match self.started_ms {
            Some(start) if now_ms.saturating_sub(start) > self.timeout_ms => {
                self.started_ms = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timer_never_expires() {
        let mut t = OverrideTimer::default();
        assert!(!t.is_active());
        assert!(!t.poll_expired(u64::MAX));
        assert_eq!(t.remaining_ms(10), None);
    }

    #[test]
    fn expires_once_after_timeout() {
        let mut t = OverrideTimer::new(1000);
        t.start(500);
        assert_eq!(t.remaining_ms(900), Some(600));
        assert!(!t.poll_expired(1500));
        assert!(t.poll_expired(1501));
        assert!(!t.is_active());
        assert!(!t.poll_expired(5000));
    }

    #[test]
    fn cancel_disarms() {
        let mut t = OverrideTimer::new(10);
        t.start(0);
        t.cancel();
        assert!(!t.poll_expired(100));
    }

    #[test]
    fn clock_behind_start_counts_as_no_elapsed_time() {
        let mut t = OverrideTimer::new(10);
        t.start(100);
        assert_eq!(t.remaining_ms(50), Some(10));
        assert!(!t.poll_expired(50));
    }
}
