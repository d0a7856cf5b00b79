use std::time::Duration;

/// Per-heater idle timeout.
///
/// Armed when the controller starts waiting on the user; once the deadline passes the
/// heater owner is expected to drop heating until the timer is reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NozzleIdleTimer {
    deadline: Option<Duration>,
    timed_out: bool,
}

impl NozzleIdleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now: Duration, timeout: Duration) {
        self.deadline = Some(now + timeout);
        self.timed_out = false;
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.timed_out = false;
    }

    /// Advance the timer. Returns true on the tick the timeout fires.
    pub fn update(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.timed_out = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_deadline() {
        let mut timer = NozzleIdleTimer::new();
        timer.start(Duration::from_secs(10), Duration::from_secs(45));
        assert!(!timer.update(Duration::from_secs(54)));
        assert!(timer.update(Duration::from_secs(55)));
        assert!(timer.timed_out());
        assert!(!timer.update(Duration::from_secs(56)));
        assert!(timer.timed_out());
    }

    #[test]
    fn test_reset_clears_timeout() {
        let mut timer = NozzleIdleTimer::new();
        timer.start(Duration::ZERO, Duration::from_millis(100));
        timer.update(Duration::from_millis(100));
        timer.reset();
        assert!(!timer.timed_out());
        assert!(!timer.is_armed());
    }
}
