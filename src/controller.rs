// src/controller.rs - Pause controller context object
use std::time::Duration;

use crate::beep::BeepCadence;
use crate::config::PauseConfig;
use crate::error::MotionError;
use crate::machine::Machine;
use crate::runout::RunoutMonitor;
use crate::session::PauseSession;
use crate::wait::WaitForUser;

/// Dwell after dropping extruder holding current, lets the driver settle.
const EXTRUDER_DISABLE_DWELL_MS: u64 = 100;

/// Owns the pause session, the runout state and every collaborator.
///
/// The firmware keeps exactly one of these for its lifetime. All operations run on a
/// single cooperative thread of control: every wait loop goes through [`Machine::idle`]
/// between checks, which is the only place background work happens.
///
/// The operations are spread over several modules:
/// gate (`ensure_safe_temperature`), filament (`load_filament`, `unload_filament`),
/// pause (`pause_print`), confirm (`wait_for_confirmation`), resume (`resume_print`),
/// runout (`runout_detected`, `poll_runout_sensor`) and procedures (the composite
/// filament-change flows).
pub struct PauseController {
    pub(crate) config: PauseConfig,
    pub(crate) session: PauseSession,
    pub(crate) runout: RunoutMonitor,
    pub(crate) machine: Machine,
    pub(crate) beep: BeepCadence,
}

impl PauseController {
    pub fn new(config: PauseConfig, machine: Machine) -> Self {
        let runout = RunoutMonitor::new(&config.runout, machine.thermal.hotend_count());
        tracing::info!(
            "Pause controller ready: {} hotend(s), recovery={}, media={}, dual_carriage={}",
            machine.thermal.hotend_count(),
            machine.recovery.is_some(),
            machine.media.is_some(),
            machine.dual_carriage.is_some()
        );
        Self {
            config,
            session: PauseSession::new(),
            runout,
            machine,
            beep: BeepCadence::new(),
        }
    }

    pub fn config(&self) -> &PauseConfig {
        &self.config
    }

    pub fn session(&self) -> &PauseSession {
        &self.session
    }

    pub fn runout(&self) -> &RunoutMonitor {
        &self.runout
    }

    pub fn runout_mut(&mut self) -> &mut RunoutMonitor {
        &mut self.runout
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// Handle for input sources (UI button, host command) that confirm a wait.
    pub fn wait_handle(&self) -> WaitForUser {
        self.machine.wait_for_user.clone()
    }

    pub(crate) fn now(&self) -> Duration {
        self.machine.clock.now_monotonic()
    }

    pub(crate) fn active_extruder(&self) -> usize {
        self.machine.motion.active_extruder()
    }

    pub(crate) async fn idle(&mut self) {
        self.machine.idle.idle().await;
    }

    /// Cooperative delay: keeps servicing the idle step until `ms` have elapsed.
    pub(crate) async fn dwell(&mut self, ms: u64) {
        let until = self.now() + Duration::from_millis(ms);
        while self.now() < until {
            self.idle().await;
        }
    }

    /// Extruder-only move of `length` mm, not scaled by flow or volumetric settings.
    pub(crate) async fn e_move(&mut self, length: f64, feedrate: f64) -> Result<(), MotionError> {
        let mut target = self.machine.motion.current_position();
        target.e += length;
        tracing::debug!("E move {:+.2}mm @ {:.1}mm/s", length, feedrate);
        self.machine.motion.issue_move(target, feedrate).await
    }

    pub(crate) async fn move_z_by(&mut self, dz: f64) -> Result<(), MotionError> {
        if dz == 0.0 {
            return Ok(());
        }
        let mut target = self.machine.motion.current_position();
        target.z += dz;
        let feedrate = self.config.pause.park_z_feedrate;
        self.machine.motion.issue_move(target, feedrate).await
    }

    pub(crate) async fn disable_active_extruder(&mut self) {
        let extruder = self.active_extruder();
        self.machine.motion.disable_extruder(extruder);
        self.dwell(EXTRUDER_DISABLE_DWELL_MS).await;
    }
}
