use std::time::Duration;

use crate::controller::PauseController;
use crate::session::{PauseMessage, PauseMode};

impl PauseController {
    /// Make sure the active extruder can move filament.
    ///
    /// Raises a too-cold target to the minimum extrusion temperature. With `wait` the
    /// call suspends until the heater reaches target, faults or times out; without it
    /// the current readiness is returned immediately and no extrusion may be issued on
    /// `false`.
    pub async fn ensure_safe_temperature(&mut self, wait: bool, mode: PauseMode) -> bool {
        let extruder = self.active_extruder();
        let min_temp = self.config.thermal.min_extrude_temp;
        if self.machine.thermal.target_temperature(extruder) < min_temp {
            tracing::info!("Raising extruder {} target to {:.0}°C for filament moves", extruder, min_temp);
            self.machine.thermal.set_target_temperature(extruder, min_temp);
        }

        self.machine.ui.show_status(PauseMessage::Heating, mode, Some(extruder));

        if wait {
            self.wait_for_hotend(extruder).await
        } else {
            self.machine.thermal.is_hot_enough(extruder)
        }
    }

    /// Block (cooperatively) until `heater` reaches its target.
    pub(crate) async fn wait_for_hotend(&mut self, heater: usize) -> bool {
        let deadline = self.now() + Duration::from_secs(self.config.thermal.heatup_timeout_secs);
        loop {
            if self.machine.thermal.has_fault(heater) {
                tracing::warn!("Heater {} fault while waiting for temperature", heater);
                return false;
            }
            if self.machine.thermal.reached_target(heater) {
                tracing::debug!(
                    "Heater {} at {:.1}°C",
                    heater,
                    self.machine.thermal.current_temperature(heater)
                );
                return true;
            }
            if self.now() >= deadline {
                tracing::warn!("Heater {} did not reach target in time", heater);
                return false;
            }
            self.idle().await;
        }
    }
}
