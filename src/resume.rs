// src/resume.rs - Resuming a paused print
use crate::controller::PauseController;
use crate::error::{FilamentError, PauseError};
use crate::filament::LoadParams;
use crate::machine::{HostAction, Position, PromptKind};
use crate::session::{PauseMessage, PauseMode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumeParams {
    pub slow_length: f64,
    pub fast_length: f64,
    pub purge_length: f64,
    pub max_beeps: i8,
    /// Hotend temperature to resume at; zero keeps the current target.
    pub target_temp: f64,
}

impl Default for ResumeParams {
    fn default() -> Self {
        Self {
            slow_length: 0.0,
            fast_length: 0.0,
            purge_length: 0.0,
            max_beeps: 0,
            target_temp: 0.0,
        }
    }
}

impl PauseController {
    /// Undo a pause: reload, return to the captured position and restart the print.
    ///
    /// Does nothing when no pause is active. A confirmation wait before loading only
    /// happens if a nozzle idle timeout fired during the pause.
    pub async fn resume_print(&mut self, params: ResumeParams) -> Result<(), PauseError> {
        if !self.session.is_paused() {
            tracing::debug!("Resume requested with no active pause");
            return Ok(());
        }
        tracing::info!("Resuming print");

        let mut nozzle_timed_out = false;
        for heater in 0..self.machine.thermal.hotend_count() {
            nozzle_timed_out |= self.machine.thermal.idle_timed_out(heater);
            self.machine.thermal.reset_idle_timer(heater);
        }

        let extruder = self.active_extruder();
        if params.target_temp > self.machine.thermal.target_temperature(extruder) {
            self.machine.thermal.set_target_temperature(extruder, params.target_temp);
        }

        let load = self
            .load_filament(LoadParams {
                slow_length: params.slow_length,
                fast_length: params.fast_length,
                purge_length: params.purge_length,
                max_beeps: params.max_beeps,
                show_ui: true,
                wait_for_user: nozzle_timed_out,
                mode: PauseMode::Same,
            })
            .await;
        FilamentError::tolerate_cold(load)?;

        if params.target_temp > 0.0 {
            self.machine.thermal.set_target_temperature(extruder, params.target_temp);
            if !self.wait_for_hotend(extruder).await {
                tracing::warn!("Extruder {} did not reach {:.0}°C before resuming", extruder, params.target_temp);
            }
        }

        let mode = self.session.mode();
        self.ensure_safe_temperature(false, mode).await;
        self.machine.ui.show_status(PauseMessage::Resume, mode, Some(extruder));

        // kept until E is committed so a failed return can be retried
        let resume = self
            .session
            .resume_position()
            .unwrap_or_else(|| self.machine.motion.current_position());
        self.return_to_print(resume).await?;

        self.machine.motion.set_extruder_position(resume.e);
        self.session.clear_resume_position();

        self.machine.ui.host_action(HostAction::Resumed);
        self.session.pop_reason();
        self.machine.ui.open_prompt(PromptKind::Info, "Resuming", Some("Dismiss"));

        if self.machine.timer.is_paused() {
            self.machine.timer.start();
        }

        if self.session.is_paused() {
            self.session.pop_reason();
            if let Some(media) = self.machine.media.as_mut() {
                media.resume_from_checkpoint();
            }
            if let Some(recovery) = self.machine.recovery.as_mut().filter(|r| r.enabled()) {
                if let Err(e) = recovery.checkpoint(false, 0.0, false) {
                    tracing::warn!("Resume checkpoint not written: {}", e);
                }
            }
        }

        if self.config.pause.pause_fans {
            self.machine.thermal.set_fans_paused(false);
        }

        self.runout.reset();
        tracing::info!("Print resumed (depth {})", self.session.depth());
        Ok(())
    }

    /// Retract, travel back XY then Z, and compensate extrusion for what the pause took.
    async fn return_to_print(&mut self, resume: Position) -> Result<(), PauseError> {
        let retract_length = self.config.pause.retract_length;
        let retract_feedrate = self.config.pause.retract_feedrate;

        self.e_move(-retract_length, retract_feedrate).await?;

        if !self.machine.motion.axes_should_home() {
            let current = self.machine.motion.current_position();
            let xy = Position::new(resume.x, resume.y, current.z, current.e);
            let xy_feedrate = self.config.pause.park_xy_feedrate;
            self.machine.motion.issue_move(xy, xy_feedrate).await?;

            let z = Position::new(resume.x, resume.y, resume.z, current.e);
            let z_feedrate = self.config.pause.park_z_feedrate;
            self.machine.motion.issue_move(z, z_feedrate).await?;
        }

        self.e_move(retract_length, retract_feedrate).await?;

        let extruder = self.active_extruder();
        let fw = self
            .machine
            .fwretract
            .as_ref()
            .filter(|fw| fw.is_retracted(extruder))
            .map(|fw| (fw.retract_length(), fw.retract_feedrate()));
        if let Some((length, feedrate)) = fw {
            self.e_move(-length, feedrate).await?;
        }

        if resume.e < 0.0 {
            self.e_move(resume.e, retract_feedrate).await?;
        }
        let prime = self.config.pause.resume_prime;
        if prime != 0.0 {
            let purge_feedrate = self.config.filament.purge_feedrate;
            self.e_move(prime, purge_feedrate).await?;
        }
        Ok(())
    }
}
