// src/procedures.rs - Complete filament procedures built from pause, wait and resume
use crate::controller::PauseController;
use crate::error::{FilamentError, MotionError, PauseError};
use crate::filament::LoadParams;
use crate::machine::XyzPos;
use crate::pause::PauseRequest;
use crate::resume::ResumeParams;
use crate::session::{PauseMessage, PauseMode};

/// Per-axis replacement for a configured park point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParkOverride {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl ParkOverride {
    pub fn apply(&self, point: XyzPos) -> XyzPos {
        XyzPos::new(
            self.x.unwrap_or(point.x),
            self.y.unwrap_or(point.y),
            self.z.unwrap_or(point.z),
        )
    }
}

/// Filament change in the middle of a print. `None` fields use configured values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilamentChangeRequest {
    pub extruder: Option<usize>,
    pub retract: Option<f64>,
    pub park: ParkOverride,
    pub unload_length: Option<f64>,
    pub load_length: Option<f64>,
    /// Negative beeps until confirmed.
    pub beep_count: i8,
    /// Resume at this hotend temperature.
    pub resume_temp: Option<f64>,
}

impl Default for FilamentChangeRequest {
    fn default() -> Self {
        Self {
            extruder: None,
            retract: None,
            park: ParkOverride::default(),
            unload_length: None,
            load_length: None,
            beep_count: -1,
            resume_temp: None,
        }
    }
}

/// Park the head and hold until confirmed; no filament is moved beyond the retract.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParkRequest {
    pub retract: Option<f64>,
    pub park: ParkOverride,
    pub show_ui: bool,
}

/// Load filament to the nozzle outside of a pause.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadRequest {
    pub extruder: Option<usize>,
    /// Z raise while loading; defaults to the park point Z.
    pub z_raise: Option<f64>,
    pub length: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum UnloadTarget {
    #[default]
    Active,
    Extruder(usize),
    /// Every hotend in turn, each with its own configured unload length.
    AllExtruders,
    /// Whole mixing path at once: lengths and feedrates scaled by the stepper count.
    Mixed { steppers: u8 },
}

/// Unload filament from the nozzle outside of a pause.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnloadRequest {
    pub target: UnloadTarget,
    pub z_raise: Option<f64>,
    pub length: Option<f64>,
}

impl PauseController {
    /// Pause with unload, wait for the user, then reload and resume.
    pub async fn change_filament(&mut self, request: FilamentChangeRequest) -> Result<(), PauseError> {
        let previous = self.active_extruder();
        let target = request.extruder.unwrap_or(previous);
        tracing::info!("Filament change for extruder {}", target);

        let duplicating = self
            .machine
            .dual_carriage
            .as_ref()
            .is_some_and(|d| d.duplication_enabled());
        if target != previous && !duplicating {
            self.machine.motion.tool_change(target).await?;
        }

        let retract = -request.retract.unwrap_or(self.config.pause.retract_length).abs();
        let park_point = request.park.apply(self.config.pause.park_point(target));
        let settings = self.config.filament.settings_for(self.active_extruder());
        let unload_length = -request.unload_length.unwrap_or(settings.unload_length).abs();
        let fast_length = request.load_length.unwrap_or(settings.load_length).abs();
        tracing::info!(
            "Parking at X{:.1} Y{:.1} Z{:.1}",
            park_point.x,
            park_point.y,
            park_point.z
        );

        self.session.set_filament_change_pause(true);
        let mut pause = PauseRequest::new(retract, park_point, unload_length);
        pause.mode = PauseMode::ChangeFilament;
        pause.dxc_extruder = Some(target);

        let result = match self.pause_print(pause).await {
            Ok(()) => {
                self.wait_for_confirmation(false, request.beep_count).await;
                tracing::info!("Filament change done, resuming print");
                self.resume_print(ResumeParams {
                    slow_length: self.config.filament.slow_load_length,
                    fast_length,
                    purge_length: self.config.filament.purge_length,
                    max_beeps: request.beep_count,
                    target_temp: request.resume_temp.unwrap_or(0.0),
                })
                .await
            }
            Err(e) => {
                tracing::warn!("Filament change not started: {}", e);
                Err(e)
            }
        };
        self.session.set_filament_change_pause(false);

        if self.active_extruder() != previous {
            self.machine.motion.tool_change(previous).await?;
        }
        result
    }

    /// Park and wait, then resume restoring the retract as a purge.
    pub async fn park_head(&mut self, request: ParkRequest) -> Result<(), PauseError> {
        let retract = -request.retract.unwrap_or(self.config.pause.retract_length).abs();
        let extruder = self.active_extruder();
        let park_point = request.park.apply(self.config.pause.park_point(extruder));
        let media_printing = self.machine.media_printing();

        self.machine
            .ui
            .show_status(PauseMessage::Parking, PauseMode::PausePrint, Some(extruder));

        let mut pause = PauseRequest::new(retract, park_point, 0.0);
        pause.show_ui = request.show_ui;
        self.pause_print(pause).await?;

        // Media prints with no way to confirm stay parked until resumed from the media side.
        if self.machine.ui.supports_prompts() || !media_printing || request.show_ui {
            self.wait_for_confirmation(false, 0).await;
            self.resume_print(ResumeParams {
                purge_length: -retract,
                ..ResumeParams::default()
            })
            .await?;
        }
        Ok(())
    }

    /// Raise Z, load to the nozzle and lower Z again.
    ///
    /// A confirmation wait is only inserted while the heater is still coming up.
    pub async fn load_to_nozzle(&mut self, request: LoadRequest) -> Result<(), FilamentError> {
        let previous = self.active_extruder();
        let target = request.extruder.unwrap_or(previous);

        let mut park_z = request.z_raise.unwrap_or(self.config.pause.park_point(target).z);
        if request.z_raise.is_none() && self.machine.motion.axes_should_home() {
            park_z = 0.0;
        }

        self.machine
            .ui
            .show_status(PauseMessage::Load, PauseMode::LoadFilament, Some(target));
        if target != previous {
            self.machine.motion.tool_change(target).await?;
        }

        let current_z = self.machine.motion.current_position().z;
        let park_raise = park_z.min(self.config.pause.z_max - current_z);
        self.move_z_by(park_raise).await?;

        let settings = self.config.filament.settings_for(self.active_extruder());
        let params = LoadParams {
            slow_length: self.config.filament.slow_load_length,
            fast_length: request.length.unwrap_or(settings.load_length).abs(),
            purge_length: self.config.filament.purge_length,
            max_beeps: self.config.filament.alert_beeps,
            show_ui: true,
            wait_for_user: self.machine.thermal.still_heating(target),
            mode: PauseMode::LoadFilament,
        };
        let result = self.load_filament(params).await;

        self.move_z_by(-park_raise).await?;
        if self.active_extruder() != previous {
            self.machine.motion.tool_change(previous).await?;
        }
        self.machine.ui.show_status(PauseMessage::Status, PauseMode::Same, None);
        result
    }

    /// Raise Z, unload one or every extruder and lower Z again.
    pub async fn unload_from_nozzle(&mut self, request: UnloadRequest) -> Result<(), FilamentError> {
        let previous = self.active_extruder();
        let target = match request.target {
            UnloadTarget::Extruder(e) => e,
            _ => previous,
        };

        let mut park_z = request.z_raise.unwrap_or(self.config.pause.park_point(target).z);
        if request.z_raise.is_none() && self.machine.motion.axes_should_home() {
            park_z = 0.0;
        }

        self.machine
            .ui
            .show_status(PauseMessage::Unload, PauseMode::UnloadFilament, Some(target));
        if target != previous {
            self.machine.motion.tool_change(target).await?;
        }

        if park_z > 0.0 {
            let z = (self.machine.motion.current_position().z + park_z).min(self.config.pause.z_max);
            self.move_to_z(z).await?;
        }

        let result = match request.target {
            UnloadTarget::AllExtruders => self.unload_every_extruder().await,
            UnloadTarget::Mixed { steppers } => {
                let length = self.unload_length_for(request.length, self.active_extruder());
                self.unload_filament_scaled(length, true, PauseMode::UnloadFilament, f64::from(steppers))
                    .await
            }
            UnloadTarget::Active | UnloadTarget::Extruder(_) => {
                let length = self.unload_length_for(request.length, self.active_extruder());
                self.unload_filament(length, true, PauseMode::UnloadFilament).await
            }
        };

        if park_z > 0.0 {
            let z = (self.machine.motion.current_position().z - park_z).max(0.0);
            self.move_to_z(z).await?;
        }
        if self.active_extruder() != previous {
            self.machine.motion.tool_change(previous).await?;
        }
        self.machine.ui.show_status(PauseMessage::Status, PauseMode::Same, None);
        result
    }

    fn unload_length_for(&self, requested: Option<f64>, extruder: usize) -> f64 {
        -requested
            .unwrap_or(self.config.filament.settings_for(extruder).unload_length)
            .abs()
    }

    /// Unload each hotend in turn. A cold hotend is skipped, the first one is reported.
    async fn unload_every_extruder(&mut self) -> Result<(), FilamentError> {
        let mut first_cold = None;
        for extruder in 0..self.machine.thermal.hotend_count() {
            if extruder != self.active_extruder() {
                self.machine.motion.tool_change(extruder).await?;
            }
            let length = -self.config.filament.settings_for(extruder).unload_length;
            match self.unload_filament(length, true, PauseMode::UnloadFilament).await {
                Err(FilamentError::HeaterNotReady { extruder }) => {
                    tracing::warn!("Extruder {} too cold, not unloaded", extruder);
                    first_cold.get_or_insert(extruder);
                }
                other => other?,
            }
        }
        match first_cold {
            Some(extruder) => Err(FilamentError::HeaterNotReady { extruder }),
            None => Ok(()),
        }
    }

    async fn move_to_z(&mut self, z: f64) -> Result<(), MotionError> {
        let mut target = self.machine.motion.current_position();
        target.z = z;
        let feedrate = self.config.pause.park_z_feedrate;
        self.machine.motion.issue_move(target, feedrate).await
    }
}
