use std::time::Duration;

use crate::idle_timer::NozzleIdleTimer;

const AMBIENT_TEMP: f64 = 25.0;
/// °C/s at full power.
const MAX_HEAT_RATE: f64 = 12.0;
const HEATING_LOSS: f64 = 0.02;
const COOLING_LOSS: f64 = 0.1;
const TARGET_WINDOW: f64 = 1.0;

/// First-order hotend model with a nozzle idle timer.
///
/// Heats at full power towards the target and coasts towards ambient once above it.
/// A timed-out idle timer keeps the stored target but drives the heater as if it
/// were zero.
#[derive(Debug, Clone)]
pub struct SimHeater {
    pub target: f64,
    pub current: f64,
    pub fault: bool,
    pub idle: NozzleIdleTimer,
}

impl Default for SimHeater {
    fn default() -> Self {
        Self {
            target: 0.0,
            current: AMBIENT_TEMP,
            fault: false,
            idle: NozzleIdleTimer::new(),
        }
    }
}

impl SimHeater {
    pub fn effective_target(&self) -> f64 {
        if self.idle.timed_out() || self.fault { 0.0 } else { self.target }
    }

    pub fn update(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let target = self.effective_target();
        if target > self.current {
            let gain = MAX_HEAT_RATE * dt;
            let loss = HEATING_LOSS * (self.current - AMBIENT_TEMP) * dt;
            self.current = (self.current + gain - loss).min(target);
        } else {
            let loss = COOLING_LOSS * (self.current - AMBIENT_TEMP) * dt;
            self.current = (self.current - loss).max(target.max(AMBIENT_TEMP).min(self.current));
        }
    }

    pub fn reached_target(&self) -> bool {
        !self.fault && !self.idle.timed_out() && self.current >= self.target - TARGET_WINDOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heats_to_target_and_holds() {
        let mut heater = SimHeater {
            target: 200.0,
            ..SimHeater::default()
        };
        for _ in 0..400 {
            heater.update(Duration::from_millis(100));
        }
        assert_eq!(heater.current, 200.0);
        assert!(heater.reached_target());
    }

    #[test]
    fn test_idle_timeout_cools_but_keeps_target() {
        let mut heater = SimHeater {
            target: 200.0,
            current: 200.0,
            ..SimHeater::default()
        };
        heater.idle.start(Duration::ZERO, Duration::from_secs(1));
        heater.idle.update(Duration::from_secs(2));
        heater.update(Duration::from_secs(1));
        assert!(heater.current < 200.0);
        assert_eq!(heater.target, 200.0);
        assert!(!heater.reached_target());
    }
}
