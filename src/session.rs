use serde::Serialize;

use crate::machine::Position;

/// Which flow the pause belongs to. Only affects wording of status and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PauseMode {
    #[default]
    PausePrint,
    LoadFilament,
    UnloadFilament,
    ChangeFilament,
    /// Keep whatever mode is already showing.
    Same,
}

/// Status messages published to the UI during a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PauseMessage {
    Parking,
    Changing,
    Unload,
    Waiting,
    Insert,
    Load,
    Purge,
    Resume,
    Heat,
    Heating,
    Status,
}

/// Process-wide pause bookkeeping.
///
/// `depth` counts independent reasons the print is paused: one for the logical pause
/// and one more when a media print was suspended with it.
#[derive(Debug, Clone, Default)]
pub struct PauseSession {
    depth: u8,
    resume_position: Option<Position>,
    mode: PauseMode,
    filament_change: bool,
}

impl PauseSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn is_paused(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn push_reason(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    /// Drop one pause reason. Returns false (and leaves depth at zero) when none is held.
    pub(crate) fn pop_reason(&mut self) -> bool {
        match self.depth.checked_sub(1) {
            Some(depth) => {
                self.depth = depth;
                true
            }
            None => {
                tracing::warn!("Pause depth already zero, ignoring extra resume");
                false
            }
        }
    }

    pub(crate) fn capture(&mut self, position: Position) {
        self.resume_position = Some(position);
    }

    pub(crate) fn clear_resume_position(&mut self) {
        self.resume_position = None;
    }

    pub fn resume_position(&self) -> Option<Position> {
        self.resume_position
    }

    pub fn mode(&self) -> PauseMode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: PauseMode) {
        if mode != PauseMode::Same {
            self.mode = mode;
        }
    }

    pub fn is_filament_change_pause(&self) -> bool {
        self.filament_change
    }

    pub(crate) fn set_filament_change_pause(&mut self, value: bool) {
        self.filament_change = value;
    }
}
