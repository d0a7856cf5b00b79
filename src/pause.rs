// src/pause.rs - Pausing a print and parking the head
use crate::controller::PauseController;
use crate::error::{FilamentError, PauseError};
use crate::machine::{HostAction, PromptKind, XyzPos};
use crate::session::{PauseMessage, PauseMode};

/// What a pause should do besides suspending the print.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PauseRequest {
    /// Retract before parking, mm (negative retracts). Zero skips it.
    pub retract: f64,
    pub park_point: XyzPos,
    pub show_ui: bool,
    /// Unload length after parking, mm (negative pulls filament out). Zero skips it.
    pub unload_length: f64,
    pub mode: PauseMode,
    /// Dual-carriage: extruder the unload targets while duplication is off.
    pub dxc_extruder: Option<usize>,
}

impl PauseRequest {
    pub fn new(retract: f64, park_point: XyzPos, unload_length: f64) -> Self {
        Self {
            retract,
            park_point,
            show_ui: true,
            unload_length,
            mode: PauseMode::PausePrint,
            dxc_extruder: None,
        }
    }
}

impl PauseController {
    /// Suspend the running print and park the toolhead.
    ///
    /// Rejected with [`PauseError::AlreadyPaused`] while any pause is active, before
    /// anything is moved or reported. A cold extruder during the unload is tolerated:
    /// the head is already parked, so the pause still counts as done.
    pub async fn pause_print(&mut self, request: PauseRequest) -> Result<(), PauseError> {
        if self.session.is_paused() {
            let depth = self.session.depth();
            tracing::warn!("Pause requested while already paused (depth {}), ignoring", depth);
            return Err(PauseError::AlreadyPaused { depth });
        }

        self.machine.ui.host_action(HostAction::Paused);
        let title = if self.session.is_filament_change_pause() { "Filament Change" } else { "Pause" };
        self.machine.ui.open_prompt(PromptKind::Info, title, Some("Dismiss"));

        self.session.set_mode(request.mode);
        self.session.push_reason();

        let was_media_printing = self.machine.media_printing();
        if was_media_printing {
            if let Some(media) = self.machine.media.as_mut() {
                media.pause();
            }
            self.session.push_reason();
        }

        self.machine.timer.pause();

        let position = self.machine.motion.current_position();
        self.session.capture(position);
        let do_park = !self.machine.motion.axes_should_home();
        tracing::info!(
            "Print paused at X{:.2} Y{:.2} Z{:.2} E{:.2} (depth {}, park={})",
            position.x,
            position.y,
            position.z,
            position.e,
            self.session.depth(),
            do_park
        );

        if was_media_printing {
            self.write_pause_checkpoint(request.park_point, do_park);
        }

        self.machine.motion.drain_queue().await?;

        if self.config.pause.pause_fans {
            self.machine.thermal.set_fans_paused(true);
        }

        let extruder = self.active_extruder();
        if request.retract != 0.0 && self.machine.thermal.is_hot_enough(extruder) {
            let feedrate = self.config.pause.retract_feedrate;
            self.e_move(request.retract, feedrate).await?;
        }

        if do_park {
            if request.show_ui {
                self.machine.ui.show_status(PauseMessage::Parking, request.mode, Some(extruder));
            }
            self.machine.motion.park(request.park_point).await?;
        }

        let unload = self.unload_single_carriage(&request).await;
        FilamentError::tolerate_cold(unload)?;

        self.disable_active_extruder().await;
        Ok(())
    }

    /// Best-effort power-loss checkpoint written before the park move.
    fn write_pause_checkpoint(&mut self, park_point: XyzPos, do_park: bool) {
        let park_raise = if do_park {
            let z_max = self.config.pause.z_max;
            self.machine.motion.park_height(park_point.z, z_max) - self.machine.motion.current_position().z
        } else {
            self.config.pause.power_loss_zraise
        };
        if let Some(recovery) = self.machine.recovery.as_mut() {
            if !recovery.enabled() {
                return;
            }
            if let Err(e) = recovery.checkpoint(true, park_raise, do_park) {
                tracing::warn!("Pause checkpoint not written: {}", e);
            }
        }
    }

    /// Unload with duplication turned off, then put duplication back as it was.
    async fn unload_single_carriage(&mut self, request: &PauseRequest) -> Result<(), FilamentError> {
        if request.unload_length == 0.0 {
            return Ok(());
        }
        let active = self.active_extruder();
        let saved = self.machine.dual_carriage.as_mut().map(|dxc| {
            let was_duplicating = dxc.duplication_enabled();
            dxc.set_duplication(false, request.dxc_extruder.unwrap_or(active));
            was_duplicating
        });

        let result = self
            .unload_filament(request.unload_length, request.show_ui, PauseMode::ChangeFilament)
            .await;

        if let (Some(was_duplicating), Some(dxc)) = (saved, self.machine.dual_carriage.as_mut()) {
            dxc.set_duplication(was_duplicating, active);
        }
        result
    }
}
