//! Collaborator interfaces consumed by the pause controller.
//!
//! The controller never talks to hardware directly. Motion, heaters, the host/UI
//! transport and the background idle step are injected as trait objects, and the
//! optional firmware features (power-loss recovery, media printing, dual carriage,
//! firmware retraction, toolhead migration) are capabilities that may be absent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, RecoveryError};
use crate::session::{PauseMessage, PauseMode};
use crate::wait::WaitForUser;

/// Logical machine coordinates, millimetres.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64, e: f64) -> Self {
        Self { x, y, z, e }
    }

    pub fn xyz(&self) -> XyzPos {
        XyzPos::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyzPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl XyzPos {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Kind of host action prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PromptKind {
    Info,
    UserContinue,
    FilamentRunout,
}

/// Out-of-band notifications for an attached host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HostAction {
    Pause,
    Paused,
    Resumed,
    FilamentRunout { tool: char },
}

#[async_trait]
pub trait MotionPlanner: Send {
    /// Queue a move; may suspend while the planner queue is full.
    async fn issue_move(&mut self, target: Position, feedrate: f64) -> Result<(), MotionError>;
    /// Block until every queued move has physically completed.
    async fn drain_queue(&mut self) -> Result<(), MotionError>;
    /// Reset the logical extrusion origin without moving.
    fn set_extruder_position(&mut self, e: f64);
    fn current_position(&self) -> Position;
    fn axes_should_home(&self) -> bool;
    fn retract_acceleration(&self) -> f64;
    fn set_retract_acceleration(&mut self, accel: f64);
    /// Drop the holding current of one extruder stepper.
    fn disable_extruder(&mut self, extruder: usize);
    fn active_extruder(&self) -> usize;
    async fn tool_change(&mut self, extruder: usize) -> Result<(), MotionError>;
    async fn park(&mut self, point: XyzPos) -> Result<(), MotionError>;

    /// Z the nozzle ends up at when parking towards `park_z`: raise only, never lower.
    fn park_height(&self, park_z: f64, z_max: f64) -> f64 {
        park_z.max(self.current_position().z).min(z_max)
    }
}

pub trait ThermalManager: Send {
    fn hotend_count(&self) -> usize;
    fn target_temperature(&self, heater: usize) -> f64;
    fn set_target_temperature(&mut self, heater: usize, value: f64);
    fn current_temperature(&self, heater: usize) -> f64;
    fn is_hot_enough(&self, heater: usize) -> bool;
    fn reached_target(&self, heater: usize) -> bool;
    fn has_fault(&self, heater: usize) -> bool;
    fn start_idle_timer(&mut self, heater: usize, timeout: Duration);
    fn reset_idle_timer(&mut self, heater: usize);
    fn idle_timed_out(&self, heater: usize) -> bool;
    fn set_fans_paused(&mut self, paused: bool);

    fn still_heating(&self, heater: usize) -> bool {
        !self.reached_target(heater) && self.target_temperature(heater) > self.current_temperature(heater)
    }
}

/// Fire-and-forget status/prompt transport. Never blocks the controller.
pub trait HostUi: Send {
    fn show_status(&mut self, message: PauseMessage, mode: PauseMode, extruder: Option<usize>);
    fn open_prompt(&mut self, kind: PromptKind, text: &str, button: Option<&str>);
    fn close_prompt(&mut self);
    fn host_action(&mut self, action: HostAction);
    fn buzz(&mut self, duration_ms: u16, frequency_hz: u16);

    /// Whether a confirmation can come back through the host prompt channel.
    fn supports_prompts(&self) -> bool {
        true
    }
}

pub trait PrintTimer: Send {
    fn pause(&mut self);
    fn start(&mut self);
    fn is_paused(&self) -> bool;
}

/// FIFO of commands executed on a later processing cycle.
pub trait CommandQueue: Send {
    fn inject(&mut self, command: &str);
}

/// One step of background work: thermal regulation, host I/O, watchdog, input polling.
#[async_trait]
pub trait IdleService: Send {
    async fn idle(&mut self);
}

pub trait TimeInterface: Send + Sync {
    fn now_monotonic(&self) -> Duration;
}

pub trait RecoveryLog: Send {
    fn enabled(&self) -> bool;
    fn checkpoint(&mut self, is_paused: bool, park_raise: f64, will_park: bool) -> Result<(), RecoveryError>;
}

/// Removable-media (SD) print driver.
pub trait MediaPrint: Send {
    fn is_active(&self) -> bool;
    fn pause(&mut self);
    fn resume_from_checkpoint(&mut self);
}

pub trait DualCarriage: Send {
    fn duplication_enabled(&self) -> bool;
    fn set_duplication(&mut self, enabled: bool, extruder: usize);
}

/// Firmware-level retraction ("keep extruder primed").
pub trait FirmwareRetract: Send {
    fn is_retracted(&self, extruder: usize) -> bool;
    fn retract_length(&self) -> f64;
    fn retract_feedrate(&self) -> f64;
}

/// Automatic hand-off to another toolhead on runout.
#[async_trait]
pub trait ToolMigration: Send {
    fn in_progress(&self) -> bool;
    fn auto_mode(&self) -> bool;
    async fn migrate(&mut self) -> bool;
}

pub trait FilamentSensor: Send {
    fn sensor_count(&self) -> usize;
    fn is_present(&self, extruder: usize) -> bool;
}

/// Everything the controller drives, plus the optional capabilities.
pub struct Machine {
    pub motion: Box<dyn MotionPlanner>,
    pub thermal: Box<dyn ThermalManager>,
    pub ui: Box<dyn HostUi>,
    pub timer: Box<dyn PrintTimer>,
    pub queue: Box<dyn CommandQueue>,
    pub idle: Box<dyn IdleService>,
    pub clock: Arc<dyn TimeInterface>,
    pub wait_for_user: WaitForUser,
    pub recovery: Option<Box<dyn RecoveryLog>>,
    pub media: Option<Box<dyn MediaPrint>>,
    pub dual_carriage: Option<Box<dyn DualCarriage>>,
    pub fwretract: Option<Box<dyn FirmwareRetract>>,
    pub migration: Option<Box<dyn ToolMigration>>,
    pub sensor: Option<Box<dyn FilamentSensor>>,
}

impl Machine {
    pub fn new(
        motion: Box<dyn MotionPlanner>,
        thermal: Box<dyn ThermalManager>,
        ui: Box<dyn HostUi>,
        timer: Box<dyn PrintTimer>,
        queue: Box<dyn CommandQueue>,
        idle: Box<dyn IdleService>,
        clock: Arc<dyn TimeInterface>,
        wait_for_user: WaitForUser,
    ) -> Self {
        Self {
            motion,
            thermal,
            ui,
            timer,
            queue,
            idle,
            clock,
            wait_for_user,
            recovery: None,
            media: None,
            dual_carriage: None,
            fwretract: None,
            migration: None,
            sensor: None,
        }
    }

    pub fn with_recovery(mut self, recovery: Box<dyn RecoveryLog>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn with_media(mut self, media: Box<dyn MediaPrint>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_dual_carriage(mut self, dual_carriage: Box<dyn DualCarriage>) -> Self {
        self.dual_carriage = Some(dual_carriage);
        self
    }

    pub fn with_fwretract(mut self, fwretract: Box<dyn FirmwareRetract>) -> Self {
        self.fwretract = Some(fwretract);
        self
    }

    pub fn with_migration(mut self, migration: Box<dyn ToolMigration>) -> Self {
        self.migration = Some(migration);
        self
    }

    pub fn with_sensor(mut self, sensor: Box<dyn FilamentSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn media_printing(&self) -> bool {
        self.media.as_ref().is_some_and(|m| m.is_active())
    }
}
