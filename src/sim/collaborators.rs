use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{IDLE_TICK, MoveRecord, SimClock, SimEvent, SimState};
use crate::error::{MotionError, RecoveryError};
use crate::machine::{
    CommandQueue, DualCarriage, FilamentSensor, FirmwareRetract, HostAction, HostUi, IdleService, MediaPrint,
    MotionPlanner, Position, PrintTimer, PromptKind, RecoveryLog, ThermalManager, TimeInterface, ToolMigration,
    XyzPos,
};
use crate::session::{PauseMessage, PauseMode};
use crate::wait::WaitForUser;

type Shared = Arc<Mutex<SimState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

macro_rules! sim_part {
    ($name:ident) => {
        pub struct $name {
            state: Shared,
        }

        impl $name {
            pub fn new(state: Shared) -> Self {
                Self { state }
            }
        }
    };
}

sim_part!(SimMotion);
sim_part!(SimUi);
sim_part!(SimTimer);
sim_part!(SimQueue);
sim_part!(SimRecovery);
sim_part!(SimMedia);
sim_part!(SimDualCarriage);
sim_part!(SimFwRetract);
sim_part!(SimMigration);
sim_part!(SimSensor);

impl SimMotion {
    fn accept_move(state: &mut SimState, target: Position, feedrate: f64) -> Result<(), MotionError> {
        if let Some(limit) = state.fail_moves_after {
            if state.moves.len() >= limit {
                let attempt = state.moves.len() + 1;
                state.record(SimEvent::MoveFailed { attempt });
                return Err(MotionError::Rejected(format!("move {} refused", attempt)));
            }
        }
        state.moves.push(MoveRecord { target, feedrate });
        state.record(SimEvent::Move {
            x: target.x,
            y: target.y,
            z: target.z,
            e: target.e,
            feedrate,
        });
        state.position = target;
        Ok(())
    }
}

#[async_trait]
impl MotionPlanner for SimMotion {
    async fn issue_move(&mut self, target: Position, feedrate: f64) -> Result<(), MotionError> {
        let mut state = lock(&self.state);
        Self::accept_move(&mut state, target, feedrate)
    }

    async fn drain_queue(&mut self) -> Result<(), MotionError> {
        lock(&self.state).record(SimEvent::Drain);
        Ok(())
    }

    fn set_extruder_position(&mut self, e: f64) {
        let mut state = lock(&self.state);
        state.position.e = e;
        state.record(SimEvent::SetExtruderPosition { e });
    }

    fn current_position(&self) -> Position {
        lock(&self.state).position
    }

    fn axes_should_home(&self) -> bool {
        !lock(&self.state).homed
    }

    fn retract_acceleration(&self) -> f64 {
        lock(&self.state).retract_accel
    }

    fn set_retract_acceleration(&mut self, accel: f64) {
        let mut state = lock(&self.state);
        state.retract_accel = accel;
        state.record(SimEvent::RetractAccel { value: accel });
    }

    fn disable_extruder(&mut self, extruder: usize) {
        let mut state = lock(&self.state);
        if let Some(d) = state.disabled_extruders.get_mut(extruder) {
            *d = true;
        }
        state.record(SimEvent::ExtruderDisabled { extruder });
    }

    fn active_extruder(&self) -> usize {
        lock(&self.state).active_extruder
    }

    async fn tool_change(&mut self, extruder: usize) -> Result<(), MotionError> {
        let mut state = lock(&self.state);
        if extruder >= state.heaters.len() {
            return Err(MotionError::Rejected(format!("no extruder {}", extruder)));
        }
        state.active_extruder = extruder;
        state.record(SimEvent::ToolChange { extruder });
        Ok(())
    }

    async fn park(&mut self, point: XyzPos) -> Result<(), MotionError> {
        let z_max = lock(&self.state).z_max;
        let z = self.park_height(point.z, z_max);
        let mut state = lock(&self.state);
        state.record(SimEvent::Park {
            x: point.x,
            y: point.y,
            z,
        });
        let current = state.position;
        let (z_feedrate, xy_feedrate) = (state.park_z_feedrate, state.park_xy_feedrate);
        Self::accept_move(&mut state, Position::new(current.x, current.y, z, current.e), z_feedrate)?;
        Self::accept_move(&mut state, Position::new(point.x, point.y, z, current.e), xy_feedrate)
    }
}

pub struct SimThermal {
    state: Shared,
    clock: Arc<SimClock>,
}

impl SimThermal {
    pub fn new(state: Shared, clock: Arc<SimClock>) -> Self {
        Self { state, clock }
    }
}

impl ThermalManager for SimThermal {
    fn hotend_count(&self) -> usize {
        lock(&self.state).heaters.len()
    }

    fn target_temperature(&self, heater: usize) -> f64 {
        lock(&self.state).heaters.get(heater).map_or(0.0, |h| h.target)
    }

    fn set_target_temperature(&mut self, heater: usize, value: f64) {
        let mut state = lock(&self.state);
        if let Some(h) = state.heaters.get_mut(heater) {
            h.target = value;
        }
        state.record(SimEvent::TargetTemp { heater, value });
    }

    fn current_temperature(&self, heater: usize) -> f64 {
        lock(&self.state).heaters.get(heater).map_or(0.0, |h| h.current)
    }

    fn is_hot_enough(&self, heater: usize) -> bool {
        let state = lock(&self.state);
        state
            .heaters
            .get(heater)
            .is_some_and(|h| !h.fault && h.current >= state.min_extrude_temp)
    }

    fn reached_target(&self, heater: usize) -> bool {
        lock(&self.state).heaters.get(heater).is_some_and(|h| h.reached_target())
    }

    fn has_fault(&self, heater: usize) -> bool {
        lock(&self.state).heaters.get(heater).is_some_and(|h| h.fault)
    }

    fn start_idle_timer(&mut self, heater: usize, timeout: Duration) {
        let now = self.clock.now_monotonic();
        if let Some(h) = lock(&self.state).heaters.get_mut(heater) {
            h.idle.start(now, timeout);
        }
    }

    fn reset_idle_timer(&mut self, heater: usize) {
        if let Some(h) = lock(&self.state).heaters.get_mut(heater) {
            h.idle.reset();
        }
    }

    fn idle_timed_out(&self, heater: usize) -> bool {
        lock(&self.state).heaters.get(heater).is_some_and(|h| h.idle.timed_out())
    }

    fn set_fans_paused(&mut self, paused: bool) {
        let mut state = lock(&self.state);
        state.fans_paused = paused;
        state.record(SimEvent::FansPaused { paused });
    }
}

impl HostUi for SimUi {
    fn show_status(&mut self, message: PauseMessage, mode: PauseMode, extruder: Option<usize>) {
        lock(&self.state).record(SimEvent::Status {
            message,
            mode,
            extruder,
        });
    }

    fn open_prompt(&mut self, kind: PromptKind, text: &str, button: Option<&str>) {
        tracing::debug!("Prompt: {}", text);
        lock(&self.state).record(SimEvent::PromptOpen {
            kind,
            text: text.to_string(),
            button: button.map(str::to_string),
        });
    }

    fn close_prompt(&mut self) {
        lock(&self.state).record(SimEvent::PromptClose);
    }

    fn host_action(&mut self, action: HostAction) {
        lock(&self.state).record(SimEvent::HostAction { action });
    }

    fn buzz(&mut self, _duration_ms: u16, frequency_hz: u16) {
        lock(&self.state).record(SimEvent::Buzz {
            frequency: frequency_hz,
        });
    }

    fn supports_prompts(&self) -> bool {
        lock(&self.state).supports_prompts
    }
}

impl PrintTimer for SimTimer {
    fn pause(&mut self) {
        let mut state = lock(&self.state);
        state.timer_paused = true;
        state.record(SimEvent::TimerPaused);
    }

    fn start(&mut self) {
        let mut state = lock(&self.state);
        state.timer_paused = false;
        state.record(SimEvent::TimerStarted);
    }

    fn is_paused(&self) -> bool {
        lock(&self.state).timer_paused
    }
}

impl CommandQueue for SimQueue {
    fn inject(&mut self, command: &str) {
        let mut state = lock(&self.state);
        state.injected.push(command.to_string());
        state.record(SimEvent::Injected {
            command: command.to_string(),
        });
    }
}

/// Idle step: advances the clock, runs the heater model and idle timers, and plays
/// scripted user confirmations.
pub struct SimIdle {
    state: Shared,
    clock: Arc<SimClock>,
    wait: WaitForUser,
}

impl SimIdle {
    pub fn new(state: Shared, clock: Arc<SimClock>, wait: WaitForUser) -> Self {
        Self { state, clock, wait }
    }

    fn step(&self) {
        self.clock.advance(IDLE_TICK);
        let now = self.clock.now_monotonic();
        let mut state = lock(&self.state);
        state.idle_steps += 1;

        let mut timeouts = Vec::new();
        for (heater, h) in state.heaters.iter_mut().enumerate() {
            if h.idle.update(now) {
                timeouts.push(heater);
            }
            h.update(IDLE_TICK);
        }
        for heater in timeouts {
            state.record(SimEvent::IdleTimeout { heater });
        }

        if !self.wait.is_waiting() {
            state.waiting_since = None;
            return;
        }
        let since = *state.waiting_since.get_or_insert(now);
        if let Some(&delay) = state.confirmations.front() {
            if now.saturating_sub(since) >= delay {
                state.confirmations.pop_front();
                state.waiting_since = None;
                self.wait.release();
                state.record(SimEvent::Confirmed {
                    at_ms: self.clock.millis(),
                });
                return;
            }
        }
        if state.idle_steps >= state.idle_budget {
            state.idle_steps = 0;
            state.waiting_since = None;
            self.wait.release();
            state.record(SimEvent::IdleBudgetExhausted);
        }
    }
}

#[async_trait]
impl IdleService for SimIdle {
    async fn idle(&mut self) {
        self.step();
        tokio::task::yield_now().await;
    }
}

impl RecoveryLog for SimRecovery {
    fn enabled(&self) -> bool {
        lock(&self.state).recovery_enabled
    }

    fn checkpoint(&mut self, is_paused: bool, park_raise: f64, will_park: bool) -> Result<(), RecoveryError> {
        let mut state = lock(&self.state);
        if state.recovery_fails {
            return Err(RecoveryError::Storage("write failed".to_string()));
        }
        state.record(SimEvent::Checkpoint {
            paused: is_paused,
            park_raise,
            will_park,
        });
        Ok(())
    }
}

impl MediaPrint for SimMedia {
    fn is_active(&self) -> bool {
        lock(&self.state).media_active
    }

    fn pause(&mut self) {
        let mut state = lock(&self.state);
        state.media_active = false;
        state.record(SimEvent::MediaPaused);
    }

    fn resume_from_checkpoint(&mut self) {
        let mut state = lock(&self.state);
        state.media_active = true;
        state.record(SimEvent::MediaResumed);
    }
}

impl DualCarriage for SimDualCarriage {
    fn duplication_enabled(&self) -> bool {
        lock(&self.state).duplication
    }

    fn set_duplication(&mut self, enabled: bool, extruder: usize) {
        let mut state = lock(&self.state);
        state.duplication = enabled;
        state.record(SimEvent::Duplication { enabled, extruder });
    }
}

impl FirmwareRetract for SimFwRetract {
    fn is_retracted(&self, _extruder: usize) -> bool {
        lock(&self.state).fw_retracted
    }

    fn retract_length(&self) -> f64 {
        lock(&self.state).fw_retract_length
    }

    fn retract_feedrate(&self) -> f64 {
        lock(&self.state).fw_retract_feedrate
    }
}

#[async_trait]
impl ToolMigration for SimMigration {
    fn in_progress(&self) -> bool {
        lock(&self.state).migration_in_progress
    }

    fn auto_mode(&self) -> bool {
        lock(&self.state).migration_auto
    }

    async fn migrate(&mut self) -> bool {
        let mut state = lock(&self.state);
        let success = state.migration_succeeds;
        state.record(SimEvent::Migration { success });
        success
    }
}

impl FilamentSensor for SimSensor {
    fn sensor_count(&self) -> usize {
        lock(&self.state).sensor_present.len()
    }

    fn is_present(&self, extruder: usize) -> bool {
        lock(&self.state).sensor_present.get(extruder).copied().unwrap_or(true)
    }
}
