use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Pump control policy. The server owns the real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Manual,
    Auto,
}

impl Mode {
    /// Capitalised label shown on the status panel.
    pub fn label(self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Auto => "Auto",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    On,
    Off,
}

impl PumpState {
    pub fn label(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/data
// ---------------------------------------------------------------------------

/// One server-reported instant of sensor and actuator state.
///
/// A `null` reading means the sensor is currently unavailable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snapshot {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub soil_percent: Option<f64>,
    pub mode: Mode,
    pub pump: PumpState,
}

// ---------------------------------------------------------------------------
// POST /api/pump
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PumpRequest {
    SetMode { mode: Mode },
    Toggle,
}

/// Reply to any pump command. Only `status` is always present.
#[derive(Debug, Deserialize)]
pub struct PumpResponse {
    pub status: String,
    #[serde(default)]
    pub pump: Option<PumpState>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PumpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Human-readable reason for a rejection.
    pub fn rejection_message(&self) -> String {
        match &self.message {
            Some(m) => format!("{}: {m}", self.status),
            None => self.status.clone(),
        }
    }
}

/// Parse a mode name as typed by an operator ("manual" / "auto").
pub fn parse_mode(s: &str) -> Option<Mode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "manual" => Some(Mode::Manual),
        "auto" => Some(Mode::Auto),
        _ => None,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
