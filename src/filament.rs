// src/filament.rs - Filament load/unload sequencing
use crate::controller::PauseController;
use crate::error::FilamentError;
use crate::machine::PromptKind;
use crate::session::{PauseMessage, PauseMode};

/// Parameters for a load sequence. Lengths are in mm; zero skips the move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadParams {
    pub slow_length: f64,
    pub fast_length: f64,
    pub purge_length: f64,
    /// Beeps before the cadence quickens; negative beeps forever.
    pub max_beeps: i8,
    pub show_ui: bool,
    /// Block for a user confirmation before inserting filament.
    pub wait_for_user: bool,
    pub mode: PauseMode,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            slow_length: 0.0,
            fast_length: 0.0,
            purge_length: 0.0,
            max_beeps: 0,
            show_ui: true,
            wait_for_user: false,
            mode: PauseMode::Same,
        }
    }
}

impl PauseController {
    /// Insert filament: optional user wait, then slow, fast and purge moves in that order.
    ///
    /// Returns [`FilamentError::HeaterNotReady`] without moving anything when the
    /// extruder is too cold.
    pub async fn load_filament(&mut self, params: LoadParams) -> Result<(), FilamentError> {
        let extruder = self.active_extruder();
        self.session.set_mode(params.mode);

        if !self.ensure_safe_temperature(false, params.mode).await {
            if params.show_ui {
                self.machine.ui.show_status(PauseMessage::Status, params.mode, None);
            }
            return Err(FilamentError::HeaterNotReady { extruder });
        }

        if params.wait_for_user {
            self.wait_for_insert(extruder, params.max_beeps, params.show_ui, params.mode).await;
        }

        if params.show_ui {
            self.machine.ui.show_status(PauseMessage::Load, params.mode, Some(extruder));
        }
        let filament = &self.config.filament;
        let (slow_feedrate, fast_feedrate, purge_feedrate) =
            (filament.slow_load_feedrate, filament.fast_load_feedrate, filament.purge_feedrate);

        if params.slow_length != 0.0 {
            self.e_move(params.slow_length, slow_feedrate).await?;
        }
        if params.fast_length != 0.0 {
            self.e_move(params.fast_length, fast_feedrate).await?;
        }
        if params.purge_length > 0.0 {
            if params.show_ui {
                self.machine.ui.show_status(PauseMessage::Purge, params.mode, Some(extruder));
            }
            self.e_move(params.purge_length, purge_feedrate).await?;
        }

        self.machine.ui.close_prompt();
        Ok(())
    }

    /// Simple confirmation loop used before loading. No idle timeout handling here.
    async fn wait_for_insert(&mut self, extruder: usize, max_beeps: i8, show_ui: bool, mode: PauseMode) {
        tracing::info!("Insert filament and confirm to continue");
        if show_ui {
            self.machine.ui.show_status(PauseMessage::Insert, mode, Some(extruder));
        }
        let now = self.now();
        self.beep.first(max_beeps, now, self.machine.ui.as_mut());
        self.machine.wait_for_user.arm();

        let tool = self.prompt_tool(extruder);
        self.machine
            .ui
            .open_prompt(PromptKind::UserContinue, &format!("Load Filament T{}", tool), Some("Continue"));

        while self.machine.wait_for_user.is_waiting() {
            let now = self.now();
            self.beep.tick(now, self.machine.ui.as_mut());
            self.idle().await;
        }
        tracing::debug!("Load confirmed");
    }

    /// Tool digit shown in prompts; single-sensor machines always report T0.
    pub(crate) fn prompt_tool(&self, extruder: usize) -> char {
        let index = if self.config.runout.multi_sensor { extruder } else { 0 };
        char::from_digit(index as u32, 10).unwrap_or('0')
    }

    /// Pull filament out of the hotend.
    ///
    /// Retracts, dwells and purges once to shape the tip, then performs the main unload
    /// move with the configured unload acceleration. The planner's retract acceleration
    /// is restored whether or not the unload move succeeds.
    pub async fn unload_filament(
        &mut self,
        unload_length: f64,
        show_ui: bool,
        mode: PauseMode,
    ) -> Result<(), FilamentError> {
        self.unload_filament_scaled(unload_length, show_ui, mode, 1.0).await
    }

    /// Unload variant for a blended (mixing) filament path: every length and feedrate
    /// is multiplied by `mix_multiplier`.
    pub async fn unload_filament_scaled(
        &mut self,
        unload_length: f64,
        show_ui: bool,
        mode: PauseMode,
        mix_multiplier: f64,
    ) -> Result<(), FilamentError> {
        let extruder = self.active_extruder();
        self.session.set_mode(mode);

        if !self.ensure_safe_temperature(false, mode).await {
            return Err(FilamentError::HeaterNotReady { extruder });
        }
        if show_ui {
            self.machine.ui.show_status(PauseMessage::Unload, mode, Some(extruder));
        }

        let filament = self.config.filament.clone();
        let retract_feedrate = self.config.pause.retract_feedrate;

        self.e_move(-filament.unload_purge_retract * mix_multiplier, retract_feedrate * mix_multiplier)
            .await?;
        self.dwell(filament.unload_purge_delay_ms).await;
        self.e_move(
            (filament.unload_purge_retract + filament.unload_purge_length) * mix_multiplier,
            filament.unload_purge_feedrate * mix_multiplier,
        )
        .await?;

        let saved_accel = self.machine.motion.retract_acceleration();
        if filament.unload_accel > 0.0 {
            self.machine.motion.set_retract_acceleration(filament.unload_accel);
        }
        let unload = self
            .e_move(unload_length * mix_multiplier, filament.unload_feedrate * mix_multiplier)
            .await;
        self.machine.motion.set_retract_acceleration(saved_accel);
        unload?;

        self.disable_active_extruder().await;
        tracing::info!("Unloaded {:.1}mm from extruder {}", unload_length.abs() * mix_multiplier, extruder);
        Ok(())
    }
}
