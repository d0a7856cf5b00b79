use thiserror::Error;

/// Failure reported by the motion planner collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    #[error("Move rejected by planner: {0}")]
    Rejected(String),
    #[error("Planner halted")]
    Halted,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilamentError {
    #[error("Extruder {extruder} is not hot enough to move filament")]
    HeaterNotReady { extruder: usize },
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PauseError {
    #[error("Print already paused (depth {depth})")]
    AlreadyPaused { depth: u8 },
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
}

/// Best-effort checkpoint failure from the power-loss recovery log.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecoveryError {
    #[error("Recovery storage unavailable: {0}")]
    Storage(String),
}

impl FilamentError {
    /// Split a sequencer result into "heater was ready" and hard motion failures.
    ///
    /// Pause and resume keep going on a cold heater, so only motion errors propagate.
    pub fn tolerate_cold(result: Result<(), FilamentError>) -> Result<bool, MotionError> {
        match result {
            Ok(()) => Ok(true),
            Err(FilamentError::HeaterNotReady { extruder }) => {
                tracing::warn!("Extruder {} not hot enough, skipping filament moves", extruder);
                Ok(false)
            }
            Err(FilamentError::Motion(e)) => Err(e),
        }
    }
}
