//! Impatience beeps while the controller waits on the user.
//!
//! One beep per second up to `max_beeps`, then five quicker beeps at 500 ms, then
//! silence. A negative `max_beeps` keeps beeping once a second forever.

use std::time::Duration;

use crate::machine::HostUi;

const BEEP_DURATION_MS: u16 = 50;
const BEEP_HIGH_HZ: u16 = 880;
const BEEP_LOW_HZ: u16 = 660;
const SLOW_INTERVAL: Duration = Duration::from_millis(1000);
const FAST_INTERVAL: Duration = Duration::from_millis(500);
const FAST_BEEPS: i32 = 5;

#[derive(Debug, Clone, Default)]
pub struct BeepCadence {
    next_buzz: Duration,
    count: i32,
    max_beeps: i8,
}

impl BeepCadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart from the initial burst and beep immediately.
    pub fn first(&mut self, max_beeps: i8, now: Duration, ui: &mut dyn HostUi) {
        self.max_beeps = max_beeps;
        self.next_buzz = Duration::ZERO;
        self.count = 0;
        self.tick(now, ui);
    }

    pub fn tick(&mut self, now: Duration, ui: &mut dyn HostUi) {
        if now < self.next_buzz {
            return;
        }
        let always = self.max_beeps < 0;
        let max = i32::from(self.max_beeps);
        if always || self.count < max + FAST_BEEPS {
            let interval = if always || self.count < max { SLOW_INTERVAL } else { FAST_INTERVAL };
            self.next_buzz = now + interval;
            let tone = if self.count & 1 == 0 { BEEP_HIGH_HZ } else { BEEP_LOW_HZ };
            ui.buzz(BEEP_DURATION_MS, tone);
            self.count += 1;
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{HostAction, PromptKind};
    use crate::session::{PauseMessage, PauseMode};

    #[derive(Default)]
    struct Buzzes(Vec<u16>);

    impl HostUi for Buzzes {
        fn show_status(&mut self, _: PauseMessage, _: PauseMode, _: Option<usize>) {}
        fn open_prompt(&mut self, _: PromptKind, _: &str, _: Option<&str>) {}
        fn close_prompt(&mut self) {}
        fn host_action(&mut self, _: HostAction) {}
        fn buzz(&mut self, _duration_ms: u16, frequency_hz: u16) {
            self.0.push(frequency_hz);
        }
    }

    fn run(cadence: &mut BeepCadence, ui: &mut Buzzes, until_ms: u64) {
        for ms in (0..=until_ms).step_by(100) {
            cadence.tick(Duration::from_millis(ms), ui);
        }
    }

    #[test]
    fn test_slow_then_fast_then_silent() {
        let mut ui = Buzzes::default();
        let mut cadence = BeepCadence::new();
        cadence.first(2, Duration::ZERO, &mut ui);
        run(&mut cadence, &mut ui, 20_000);
        // two slow beeps plus five fast ones, nothing after
        assert_eq!(ui.0.len(), 7);
        assert_eq!(cadence.count(), 7);
        assert_eq!(ui.0[0], BEEP_HIGH_HZ);
        assert_eq!(ui.0[1], BEEP_LOW_HZ);
    }

    #[test]
    fn test_negative_count_beeps_forever() {
        let mut ui = Buzzes::default();
        let mut cadence = BeepCadence::new();
        cadence.first(-1, Duration::ZERO, &mut ui);
        run(&mut cadence, &mut ui, 59_900);
        assert_eq!(ui.0.len(), 60);
    }

    #[test]
    fn test_zero_count_gives_fast_burst() {
        let mut ui = Buzzes::default();
        let mut cadence = BeepCadence::new();
        cadence.first(0, Duration::ZERO, &mut ui);
        run(&mut cadence, &mut ui, 10_000);
        assert_eq!(ui.0.len(), 5);
    }
}
