//! Deterministic simulated machine.
//!
//! Every collaborator shares one [`SimState`] and a [`SimClock`] that only advances
//! when the controller runs its idle step, so a whole pause cycle runs instantly and
//! reproducibly. Everything the controller does is recorded as a [`SimEvent`].

mod collaborators;
mod heater;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::config::PauseConfig;
use crate::controller::PauseController;
use crate::machine::{HostAction, Machine, Position, PromptKind};
use crate::session::{PauseMessage, PauseMode};
use crate::wait::WaitForUser;

pub use collaborators::{
    SimDualCarriage, SimFwRetract, SimIdle, SimMedia, SimMigration, SimMotion, SimQueue, SimRecovery, SimSensor,
    SimThermal, SimTimer, SimUi,
};
pub use heater::SimHeater;

/// Simulated time per idle step.
pub const IDLE_TICK: Duration = Duration::from_millis(100);
/// Idle steps before a stuck wait is force-confirmed.
const DEFAULT_IDLE_BUDGET: u64 = 200_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    Move { x: f64, y: f64, z: f64, e: f64, feedrate: f64 },
    MoveFailed { attempt: usize },
    Drain,
    Park { x: f64, y: f64, z: f64 },
    ToolChange { extruder: usize },
    ExtruderDisabled { extruder: usize },
    SetExtruderPosition { e: f64 },
    RetractAccel { value: f64 },
    TargetTemp { heater: usize, value: f64 },
    FansPaused { paused: bool },
    Status { message: PauseMessage, mode: PauseMode, extruder: Option<usize> },
    PromptOpen { kind: PromptKind, text: String, button: Option<String> },
    PromptClose,
    HostAction { action: HostAction },
    Buzz { frequency: u16 },
    TimerPaused,
    TimerStarted,
    Injected { command: String },
    MediaPaused,
    MediaResumed,
    Checkpoint { paused: bool, park_raise: f64, will_park: bool },
    Duplication { enabled: bool, extruder: usize },
    Migration { success: bool },
    IdleTimeout { heater: usize },
    Confirmed { at_ms: u64 },
    IdleBudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoveRecord {
    pub target: Position,
    pub feedrate: f64,
}

/// Monotonic clock advanced by the simulated idle step.
#[derive(Debug, Default)]
pub struct SimClock {
    millis: AtomicU64,
}

impl SimClock {
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl crate::machine::TimeInterface for SimClock {
    fn now_monotonic(&self) -> Duration {
        Duration::from_millis(self.millis())
    }
}

/// Shared state behind every simulated collaborator.
#[derive(Debug)]
pub struct SimState {
    pub position: Position,
    pub homed: bool,
    pub z_max: f64,
    pub park_xy_feedrate: f64,
    pub park_z_feedrate: f64,
    pub active_extruder: usize,
    pub retract_accel: f64,
    pub disabled_extruders: Vec<bool>,
    pub moves: Vec<MoveRecord>,
    /// Moves accepted before the planner starts rejecting them.
    pub fail_moves_after: Option<usize>,
    pub heaters: Vec<SimHeater>,
    pub min_extrude_temp: f64,
    pub fans_paused: bool,
    pub timer_paused: bool,
    pub supports_prompts: bool,
    pub injected: Vec<String>,
    pub confirmations: VecDeque<Duration>,
    pub waiting_since: Option<Duration>,
    pub idle_steps: u64,
    pub idle_budget: u64,
    pub media_active: bool,
    pub recovery_enabled: bool,
    pub recovery_fails: bool,
    pub duplication: bool,
    pub fw_retracted: bool,
    pub fw_retract_length: f64,
    pub fw_retract_feedrate: f64,
    pub migration_in_progress: bool,
    pub migration_auto: bool,
    pub migration_succeeds: bool,
    pub sensor_present: Vec<bool>,
    pub events: Vec<SimEvent>,
}

impl SimState {
    fn new(config: &PauseConfig, hotends: usize) -> Self {
        let hotends = hotends.max(1);
        Self {
            position: Position::default(),
            homed: true,
            z_max: config.pause.z_max,
            park_xy_feedrate: config.pause.park_xy_feedrate,
            park_z_feedrate: config.pause.park_z_feedrate,
            active_extruder: 0,
            retract_accel: 3000.0,
            disabled_extruders: vec![false; hotends],
            moves: Vec::new(),
            fail_moves_after: None,
            heaters: vec![SimHeater::default(); hotends],
            min_extrude_temp: config.thermal.min_extrude_temp,
            fans_paused: false,
            timer_paused: false,
            supports_prompts: true,
            injected: Vec::new(),
            confirmations: VecDeque::new(),
            waiting_since: None,
            idle_steps: 0,
            idle_budget: DEFAULT_IDLE_BUDGET,
            media_active: false,
            recovery_enabled: true,
            recovery_fails: false,
            duplication: false,
            fw_retracted: false,
            fw_retract_length: 3.0,
            fw_retract_feedrate: 45.0,
            migration_in_progress: false,
            migration_auto: false,
            migration_succeeds: false,
            sensor_present: vec![true; hotends],
            events: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, event: SimEvent) {
        tracing::trace!("sim: {:?}", event);
        self.events.push(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    recovery: bool,
    media: bool,
    dual_carriage: bool,
    fwretract: bool,
    migration: bool,
    sensor: bool,
}

/// Handle over a simulated machine: builds [`Machine`]s and exposes what happened.
#[derive(Clone)]
pub struct SimMachine {
    state: Arc<Mutex<SimState>>,
    clock: Arc<SimClock>,
    wait: WaitForUser,
    capabilities: Capabilities,
}

impl SimMachine {
    pub fn new(config: &PauseConfig, hotends: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(config, hotends))),
            clock: Arc::new(SimClock::default()),
            wait: WaitForUser::new(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_recovery(mut self) -> Self {
        self.capabilities.recovery = true;
        self
    }

    pub fn with_media(mut self) -> Self {
        self.capabilities.media = true;
        self
    }

    pub fn with_dual_carriage(mut self) -> Self {
        self.capabilities.dual_carriage = true;
        self
    }

    pub fn with_fwretract(mut self) -> Self {
        self.capabilities.fwretract = true;
        self
    }

    pub fn with_migration(mut self) -> Self {
        self.capabilities.migration = true;
        self
    }

    pub fn with_sensor(mut self) -> Self {
        self.capabilities.sensor = true;
        self
    }

    /// Collaborator set wired to this simulation.
    pub fn machine(&self) -> Machine {
        let state = &self.state;
        let mut machine = Machine::new(
            Box::new(SimMotion::new(state.clone())),
            Box::new(SimThermal::new(state.clone(), self.clock.clone())),
            Box::new(SimUi::new(state.clone())),
            Box::new(SimTimer::new(state.clone())),
            Box::new(SimQueue::new(state.clone())),
            Box::new(SimIdle::new(state.clone(), self.clock.clone(), self.wait.clone())),
            self.clock.clone(),
            self.wait.clone(),
        );
        let caps = self.capabilities;
        if caps.recovery {
            machine = machine.with_recovery(Box::new(SimRecovery::new(state.clone())));
        }
        if caps.media {
            machine = machine.with_media(Box::new(SimMedia::new(state.clone())));
        }
        if caps.dual_carriage {
            machine = machine.with_dual_carriage(Box::new(SimDualCarriage::new(state.clone())));
        }
        if caps.fwretract {
            machine = machine.with_fwretract(Box::new(SimFwRetract::new(state.clone())));
        }
        if caps.migration {
            machine = machine.with_migration(Box::new(SimMigration::new(state.clone())));
        }
        if caps.sensor {
            machine = machine.with_sensor(Box::new(SimSensor::new(state.clone())));
        }
        machine
    }

    pub fn controller(&self, config: PauseConfig) -> PauseController {
        PauseController::new(config, self.machine())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Direct access for assertions that need more than the accessors below.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn wait_handle(&self) -> WaitForUser {
        self.wait.clone()
    }

    pub fn now(&self) -> Duration {
        Duration::from_millis(self.clock.millis())
    }

    pub fn set_position(&self, position: Position) {
        self.lock().position = position;
    }

    pub fn set_homed(&self, homed: bool) {
        self.lock().homed = homed;
    }

    /// Put a heater at `current` with `target`, as if it had been regulating there.
    pub fn set_temperature(&self, heater: usize, current: f64, target: f64) {
        if let Some(h) = self.lock().heaters.get_mut(heater) {
            h.current = current;
            h.target = target;
        }
    }

    pub fn set_all_temperatures(&self, current: f64, target: f64) {
        for h in self.lock().heaters.iter_mut() {
            h.current = current;
            h.target = target;
        }
    }

    pub fn set_fault(&self, heater: usize, fault: bool) {
        if let Some(h) = self.lock().heaters.get_mut(heater) {
            h.fault = fault;
        }
    }

    /// Confirm the next user wait once it has been pending for `delay`.
    pub fn confirm_after(&self, delay: Duration) {
        self.lock().confirmations.push_back(delay);
    }

    pub fn fail_moves_after(&self, accepted: usize) {
        self.lock().fail_moves_after = Some(accepted);
    }

    pub fn set_retract_accel(&self, accel: f64) {
        self.lock().retract_accel = accel;
    }

    pub fn set_media_active(&self, active: bool) {
        self.lock().media_active = active;
    }

    pub fn set_recovery(&self, enabled: bool, fails: bool) {
        let mut state = self.lock();
        state.recovery_enabled = enabled;
        state.recovery_fails = fails;
    }

    pub fn set_duplication(&self, enabled: bool) {
        self.lock().duplication = enabled;
    }

    pub fn set_fw_retracted(&self, retracted: bool) {
        self.lock().fw_retracted = retracted;
    }

    pub fn set_migration(&self, in_progress: bool, auto_mode: bool, succeeds: bool) {
        let mut state = self.lock();
        state.migration_in_progress = in_progress;
        state.migration_auto = auto_mode;
        state.migration_succeeds = succeeds;
    }

    pub fn set_sensor_present(&self, extruder: usize, present: bool) {
        if let Some(p) = self.lock().sensor_present.get_mut(extruder) {
            *p = present;
        }
    }

    pub fn set_supports_prompts(&self, supported: bool) {
        self.lock().supports_prompts = supported;
    }

    pub fn set_idle_budget(&self, steps: u64) {
        self.lock().idle_budget = steps;
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.moves.clear();
    }

    pub fn moves(&self) -> Vec<MoveRecord> {
        self.lock().moves.clone()
    }

    pub fn position(&self) -> Position {
        self.lock().position
    }

    pub fn injected(&self) -> Vec<String> {
        self.lock().injected.clone()
    }

    pub fn retract_accel(&self) -> f64 {
        self.lock().retract_accel
    }

    pub fn target(&self, heater: usize) -> f64 {
        self.lock().heaters.get(heater).map_or(0.0, |h| h.target)
    }

    pub fn temperature(&self, heater: usize) -> f64 {
        self.lock().heaters.get(heater).map_or(0.0, |h| h.current)
    }

    pub fn extruder_disabled(&self, extruder: usize) -> bool {
        self.lock().disabled_extruders.get(extruder).copied().unwrap_or(false)
    }

    pub fn active_extruder(&self) -> usize {
        self.lock().active_extruder
    }

    pub fn timer_paused(&self) -> bool {
        self.lock().timer_paused
    }

    pub fn fans_paused(&self) -> bool {
        self.lock().fans_paused
    }

    pub fn duplication(&self) -> bool {
        self.lock().duplication
    }

    pub fn media_active(&self) -> bool {
        self.lock().media_active
    }

    pub fn host_actions(&self) -> Vec<HostAction> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::HostAction { action } => Some(action.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::PromptOpen { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Events as JSON lines.
    pub fn events_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in self.lock().events.iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
