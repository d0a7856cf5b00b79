//! Pause, resume and filament-change control for a printer firmware.
//!
//! [`PauseController`] owns the pause session and runout state and drives the
//! machine through the collaborator traits in [`machine`]. The [`sim`] module
//! provides a deterministic simulated machine for tests and the simulator binary.

pub mod beep;
pub mod config;
mod confirm;
pub mod controller;
pub mod error;
pub mod filament;
mod gate;
pub mod idle_timer;
pub mod machine;
pub mod pause;
pub mod procedures;
pub mod resume;
pub mod runout;
pub mod session;
pub mod sim;
pub mod wait;

pub use config::{ConfigError, PauseConfig, load_config};
pub use confirm::ConfirmState;
pub use controller::PauseController;
pub use error::{FilamentError, MotionError, PauseError, RecoveryError};
pub use filament::LoadParams;
pub use machine::{HostAction, Machine, Position, PromptKind, XyzPos};
pub use pause::PauseRequest;
pub use procedures::{FilamentChangeRequest, LoadRequest, ParkOverride, ParkRequest, UnloadRequest, UnloadTarget};
pub use resume::ResumeParams;
pub use session::{PauseMessage, PauseMode, PauseSession};
pub use wait::WaitForUser;
