// Viewport debouncer - coalesces zoom/pan bursts into one refetch pass
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceState {
    Idle,
    PendingFetch,
    Fetching,
}

/// Single-timer debounce state machine. Time is passed in by the caller so the
/// machine itself never sleeps; the controller runtime sleeps until [`Debouncer::deadline`].
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    busy_retry: Duration,
    deadline: Option<Instant>,
    fetching: bool,
}

impl Debouncer {
    pub fn new(delay: Duration, busy_retry: Duration) -> Self {
        Self {
            delay,
            busy_retry,
            deadline: None,
            fetching: false,
        }
    }

    pub fn state(&self) -> DebounceState {
        if self.fetching {
            DebounceState::Fetching
        } else if self.deadline.is_some() {
            DebounceState::PendingFetch
        } else {
            DebounceState::Idle
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A viewport change (re)starts the timer.
    pub fn viewport_changed(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns `true` when a fetch pass should start now. While a pass is still
    /// running a due timer is pushed back by the busy-retry interval instead.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                if self.fetching {
                    tracing::debug!("Fetch pass still running, deferring refetch by {:?}", self.busy_retry);
                    self.deadline = Some(now + self.busy_retry);
                    false
                } else {
                    self.deadline = None;
                    self.fetching = true;
                    true
                }
            }
            _ => false,
        }
    }

    pub fn pass_finished(&mut self) {
        self.fetching = false;
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.fetching = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn debouncer() -> Debouncer {
        Debouncer::new(ms(500), ms(200))
    }

    #[test]
    fn test_burst_coalesces_into_one_pass() {
        let t0 = Instant::now();
        let mut d = debouncer();
        let mut fired = Vec::new();

        for at in [0, 100, 200, 300] {
            d.viewport_changed(t0 + ms(at));
        }
        assert_eq!(d.state(), DebounceState::PendingFetch);

        for step in (0..=1500).step_by(10) {
            if d.poll(t0 + ms(step)) {
                fired.push(step);
                d.pass_finished();
            }
        }
        assert_eq!(fired, vec![800]);
        assert_eq!(d.state(), DebounceState::Idle);
    }

    #[test]
    fn test_not_due_before_delay() {
        let t0 = Instant::now();
        let mut d = debouncer();
        d.viewport_changed(t0);
        assert!(!d.poll(t0 + ms(499)));
        assert!(d.poll(t0 + ms(500)));
        assert_eq!(d.state(), DebounceState::Fetching);
    }

    #[test]
    fn test_busy_pass_defers_by_retry_interval() {
        let t0 = Instant::now();
        let mut d = debouncer();
        d.viewport_changed(t0);
        assert!(d.poll(t0 + ms(500)));

        // another change arrives while the first pass is still running
        d.viewport_changed(t0 + ms(600));
        assert!(!d.poll(t0 + ms(1100)));
        assert_eq!(d.deadline(), Some(t0 + ms(1300)));
        assert_eq!(d.state(), DebounceState::Fetching);

        d.pass_finished();
        assert_eq!(d.state(), DebounceState::PendingFetch);
        assert!(d.poll(t0 + ms(1300)));
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let t0 = Instant::now();
        let mut d = debouncer();
        d.viewport_changed(t0);
        d.cancel();
        assert_eq!(d.state(), DebounceState::Idle);
        assert!(!d.poll(t0 + ms(1000)));
    }
}
