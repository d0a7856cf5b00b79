// src/confirm.rs - Waiting for the user to continue a paused print
use std::time::Duration;

use crate::controller::PauseController;
use crate::machine::PromptKind;
use crate::session::PauseMessage;

const RESUME_PROMPT: &str = "Nozzle Parked - Ready to Resume Print?";
const REHEAT_PROMPT: &str = "Heater Timed Out - Reheat?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmState {
    Waiting,
    NozzleTimedOut,
    /// Reheat prompt is open; no idle timeout applies here.
    ReheatPending,
    UserConfirmed,
}

impl PauseController {
    /// Park here until the user (or host) confirms.
    ///
    /// Every hotend gets an idle timer. When any of them times out the resume prompt
    /// is replaced by a reheat prompt; once that is confirmed every hotend is brought
    /// back to the target it had when the wait started and the original prompt
    /// returns. The wait flag is clear when this returns.
    pub async fn wait_for_confirmation(&mut self, is_reload: bool, max_beeps: i8) {
        let hotends = self.machine.thermal.hotend_count();
        let saved_targets: Vec<f64> = (0..hotends)
            .map(|h| self.machine.thermal.target_temperature(h))
            .collect();

        self.start_idle_timers();
        self.machine.wait_for_user.arm();
        self.show_continue_prompt(is_reload);
        let now = self.now();
        self.beep.first(max_beeps, now, self.machine.ui.as_mut());
        self.machine
            .ui
            .open_prompt(PromptKind::UserContinue, RESUME_PROMPT, Some("Continue"));

        let mut state = ConfirmState::Waiting;
        loop {
            let next = match state {
                ConfirmState::Waiting => {
                    if !self.machine.wait_for_user.is_waiting() {
                        ConfirmState::UserConfirmed
                    } else {
                        let now = self.now();
                        self.beep.tick(now, self.machine.ui.as_mut());
                        if self.any_nozzle_timed_out() {
                            ConfirmState::NozzleTimedOut
                        } else {
                            self.idle().await;
                            ConfirmState::Waiting
                        }
                    }
                }
                ConfirmState::NozzleTimedOut => {
                    tracing::warn!("Heater timed out - waiting for reheat confirmation");
                    self.machine.ui.close_prompt();
                    self.machine
                        .ui
                        .open_prompt(PromptKind::UserContinue, REHEAT_PROMPT, Some("Reheat"));
                    self.machine.ui.show_status(PauseMessage::Heat, self.session.mode(), None);
                    self.machine.wait_for_user.arm();
                    ConfirmState::ReheatPending
                }
                ConfirmState::ReheatPending => {
                    if self.machine.wait_for_user.is_waiting() {
                        self.idle().await;
                        ConfirmState::ReheatPending
                    } else {
                        self.reheat(&saved_targets).await;
                        self.machine
                            .ui
                            .open_prompt(PromptKind::UserContinue, RESUME_PROMPT, Some("Continue"));
                        self.start_idle_timers();
                        self.machine.wait_for_user.arm();
                        self.show_continue_prompt(is_reload);
                        let now = self.now();
                        self.beep.first(max_beeps, now, self.machine.ui.as_mut());
                        ConfirmState::Waiting
                    }
                }
                ConfirmState::UserConfirmed => break,
            };
            if next != state {
                tracing::debug!("Confirmation wait: {:?} -> {:?}", state, next);
            }
            state = next;
        }
        tracing::info!("User confirmed, continuing");
    }

    async fn reheat(&mut self, saved_targets: &[f64]) {
        tracing::info!("Reheating nozzle");
        for (heater, &target) in saved_targets.iter().enumerate() {
            self.machine.thermal.reset_idle_timer(heater);
            self.machine.thermal.set_target_temperature(heater, target);
        }
        let mode = self.session.mode();
        if !self.ensure_safe_temperature(true, mode).await {
            tracing::warn!("Reheat did not reach temperature");
        }
    }

    fn start_idle_timers(&mut self) {
        let timeout = Duration::from_secs(self.config.pause.nozzle_timeout_secs);
        for heater in 0..self.machine.thermal.hotend_count() {
            self.machine.thermal.start_idle_timer(heater, timeout);
        }
    }

    fn any_nozzle_timed_out(&self) -> bool {
        (0..self.machine.thermal.hotend_count()).any(|h| self.machine.thermal.idle_timed_out(h))
    }

    fn show_continue_prompt(&mut self, is_reload: bool) {
        let (message, text) = if is_reload {
            (PauseMessage::Insert, "Insert filament and confirm to continue")
        } else {
            (PauseMessage::Waiting, "Press button to resume print")
        };
        tracing::info!("{}", text);
        let extruder = self.active_extruder();
        self.machine.ui.show_status(message, self.session.mode(), Some(extruder));
    }
}
