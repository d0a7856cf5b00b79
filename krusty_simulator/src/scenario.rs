//! Scenario files for the pause simulator.
//!
//! A scenario sets up the simulated machine and lists the steps to run against the
//! controller, e.g.
//!
//! ```toml
//! hotends = 2
//! temperature = 210.0
//! confirm_after_ms = [1500]
//!
//! [[steps]]
//! action = "change"
//! extruder = 1
//! ```

use serde::Deserialize;

use krusty_pause::Position;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_hotends")]
    pub hotends: usize,
    #[serde(default = "default_start")]
    pub start: Position,
    /// Every hotend starts at this temperature and target.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_true")]
    pub homed: bool,
    #[serde(default)]
    pub media_printing: bool,
    /// Each wait for the user is confirmed after the next delay in this list.
    #[serde(default)]
    pub confirm_after_ms: Vec<u64>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Change {
        extruder: Option<usize>,
        resume_temp: Option<f64>,
    },
    Park,
    Pause {
        #[serde(default)]
        unload_length: f64,
    },
    Wait,
    Resume,
    Runout {
        #[serde(default)]
        extruder: usize,
    },
    Load {
        extruder: Option<usize>,
        length: Option<f64>,
    },
    Unload {
        extruder: Option<usize>,
        #[serde(default)]
        all: bool,
    },
    /// Let the idle loop run, e.g. to cool a hotend.
    Idle {
        ms: u64,
    },
}

impl Scenario {
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn builtin(name: &str) -> Option<Self> {
        let steps = match name {
            "change" => vec![Step::Change {
                extruder: None,
                resume_temp: None,
            }],
            "park" => vec![Step::Park],
            "runout" => vec![Step::Runout { extruder: 0 }],
            "load" => vec![Step::Load {
                extruder: None,
                length: Some(30.0),
            }],
            "unload" => vec![Step::Unload {
                extruder: None,
                all: false,
            }],
            _ => return None,
        };
        Some(Self {
            hotends: default_hotends(),
            start: default_start(),
            temperature: default_temperature(),
            homed: true,
            media_printing: false,
            confirm_after_ms: vec![1500],
            steps,
        })
    }
}

pub const BUILTIN_SCENARIOS: [&str; 5] = ["change", "park", "runout", "load", "unload"];

fn default_hotends() -> usize { 1 }
fn default_start() -> Position { Position::new(100.0, 100.0, 5.0, 0.0) }
fn default_temperature() -> f64 { 210.0 }
fn default_true() -> bool { true }
