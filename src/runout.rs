//! Filament runout detection and dispatch.
//!
//! [`RunoutMonitor`] holds the per-extruder edge-trigger state. The controller side
//! decides what a runout does: hand off to another toolhead, or queue the configured
//! recovery script so the pause happens on a later command cycle.

use crate::config::RunoutConfig;
use crate::controller::PauseController;
use crate::machine::{HostAction, PromptKind};

/// Commands whose presence in the runout script means the script itself pauses.
const PAUSING_COMMANDS: [&str; 3] = ["M600", "M125", "M25"];

#[derive(Debug, Clone)]
pub struct RunoutMonitor {
    enabled: bool,
    ran_out: bool,
    /// An attached host owns runout recovery; the script is not queued.
    host_handling: bool,
    /// Print driven by an external front end; runouts are handled there.
    host_print_mode: bool,
    triggered: Vec<bool>,
    absent_counts: Vec<u32>,
    threshold: u32,
}

impl RunoutMonitor {
    pub fn new(config: &RunoutConfig, extruders: usize) -> Self {
        let extruders = extruders.max(1);
        Self {
            enabled: config.enabled,
            ran_out: false,
            host_handling: false,
            host_print_mode: false,
            triggered: vec![false; extruders],
            absent_counts: vec![0; extruders],
            threshold: config.debounce_threshold,
        }
    }

    /// Clear the ran-out flag and every triggered extruder.
    pub fn reset(&mut self) {
        self.ran_out = false;
        self.triggered.iter_mut().for_each(|t| *t = false);
        self.absent_counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Filament is back on `extruder`: re-arm its trigger.
    pub fn filament_present(&mut self, extruder: usize) {
        if let Some(t) = self.triggered.get_mut(extruder) {
            *t = false;
        }
        if let Some(c) = self.absent_counts.get_mut(extruder) {
            *c = 0;
        }
        self.ran_out = false;
    }

    pub fn is_triggered(&self, extruder: usize) -> bool {
        self.triggered.get(extruder).copied().unwrap_or(false)
    }

    pub fn set_triggered(&mut self, extruder: usize, value: bool) {
        if let Some(t) = self.triggered.get_mut(extruder) {
            *t = value;
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn ran_out(&self) -> bool {
        self.ran_out
    }

    pub fn host_handling(&self) -> bool {
        self.host_handling
    }

    pub fn set_host_handling(&mut self, value: bool) {
        self.host_handling = value;
    }

    pub fn set_host_print_mode(&mut self, value: bool) {
        self.host_print_mode = value;
    }

    /// Count one "absent" reading. Returns true once the debounce threshold is reached.
    pub(crate) fn note_absent(&mut self, extruder: usize) -> bool {
        let Some(count) = self.absent_counts.get_mut(extruder) else {
            return false;
        };
        *count = count.saturating_add(1);
        if *count >= self.threshold {
            *count = 0;
            self.ran_out = true;
            true
        } else {
            false
        }
    }
}

impl PauseController {
    /// Edge-triggered runout report for `extruder`. Repeated calls before the filament
    /// is seen again dispatch only once.
    pub async fn runout_detected(&mut self, extruder: usize) {
        if self.runout.host_print_mode {
            tracing::debug!("Runout on extruder {} left to host print mode", extruder);
            return;
        }
        if extruder >= self.runout.triggered.len() {
            tracing::warn!("Runout reported for unknown extruder {}", extruder);
            return;
        }
        if self.runout.is_triggered(extruder) {
            return;
        }
        tracing::info!("Runout detected on extruder {}", extruder);
        self.runout.set_triggered(extruder, true);
        self.on_filament_runout(extruder).await;
    }

    pub fn filament_present(&mut self, extruder: usize) {
        self.runout.filament_present(extruder);
    }

    async fn on_filament_runout(&mut self, extruder: usize) {
        if let Some(migration) = self.machine.migration.as_mut() {
            if migration.in_progress() {
                tracing::debug!("Migration already in progress, ignoring runout");
                return;
            }
            if migration.auto_mode() {
                tracing::info!("Runout on extruder {}, migrating to next toolhead", extruder);
                if migration.migrate().await {
                    return;
                }
                tracing::warn!("Toolhead migration failed, falling back to runout script");
            }
        }

        let tool = self.prompt_tool(extruder);
        self.machine
            .ui
            .open_prompt(PromptKind::FilamentRunout, &format!("FilamentRunout T{}", tool), Some("Continue"));

        let run_script = !self.runout.host_handling;
        let script = self.config.runout.script.clone();
        if run_script && PAUSING_COMMANDS.iter().any(|c| script.contains(c)) {
            self.machine.ui.host_action(HostAction::Paused);
        } else {
            self.machine.ui.host_action(HostAction::FilamentRunout { tool });
            self.machine.ui.host_action(HostAction::Pause);
        }

        if run_script {
            let command = if self.config.runout.multi_sensor {
                script.replace("%c", &tool.to_string())
            } else {
                script
            };
            tracing::debug!("Runout command: {}", command);
            self.machine.queue.inject(&command);
        }
    }

    /// One sensor sampling pass. Absent readings are debounced before a runout fires.
    pub async fn poll_runout_sensor(&mut self) {
        if !self.runout.enabled || self.runout.ran_out {
            return;
        }
        let readings: Vec<bool> = match self.machine.sensor.as_ref() {
            Some(sensor) => (0..sensor.sensor_count()).map(|e| sensor.is_present(e)).collect(),
            None => return,
        };
        for (extruder, present) in readings.into_iter().enumerate() {
            if present {
                if let Some(c) = self.runout.absent_counts.get_mut(extruder) {
                    *c = 0;
                }
            } else if self.runout.note_absent(extruder) {
                self.runout_detected(extruder).await;
                break;
            }
        }
    }
}
