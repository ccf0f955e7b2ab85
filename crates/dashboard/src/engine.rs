//! Reconciles server snapshots and command replies into one local view of
//! the farm: mode, pump state, latest readings and chart history.
//!
//! The engine does no I/O of its own. Callers ask it for a [`PollTicket`] or
//! a [`PendingCommand`], do the request elsewhere, then hand the result back.
//! [`ReconciliationEngine::dispatch`] does all three steps in one call for
//! callers that can wait on the reply.
//!
//! ## Precedence rules
//!
//! ```text
//! poll reply   seq < newest applied seq          → discarded entirely
//! poll reply   seq < field fence                  → field left alone
//!                                                   (a command confirmed it later)
//! poll reply   otherwise                          → server value adopted
//! command ok                                      → value adopted, fence = next seq
//! command err                                     → nothing changes
//! ```

use std::fmt;

use tracing::{debug, info, warn};

use crate::api::{Mode, PumpState, Snapshot};
use crate::client::{execute, FarmApi};
use crate::error::{CommandError, Precondition};
use crate::history::{HistoryBuffer, Sample};
use crate::sink::{
    chart_frames, format_reading, ChartFrame, StatusView, ToggleAffordance, NO_READING,
};

/// Consecutive failed polls before the view is flagged stale.
pub const DEFAULT_STALE_AFTER: u32 = 3;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Toggle,
    SetMode(Mode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Toggle,
    SetMode,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toggle => write!(f, "toggle"),
            Self::SetMode => write!(f, "set_mode"),
        }
    }
}

impl Command {
    pub fn kind(self) -> CommandKind {
        match self {
            Self::Toggle => CommandKind::Toggle,
            Self::SetMode(_) => CommandKind::SetMode,
        }
    }
}

/// Server-confirmed result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Mode(Mode),
    Pump(PumpState),
}

/// A command the engine has cleared for sending. Must be handed back to
/// [`ReconciliationEngine::complete_command`] exactly once.
#[derive(Debug)]
pub struct PendingCommand {
    command: Command,
}

impl PendingCommand {
    pub fn command(&self) -> Command {
        self.command
    }
}

// ---------------------------------------------------------------------------
// Polls
// ---------------------------------------------------------------------------

/// Tag for one outstanding snapshot fetch. Tags increase monotonically in
/// issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    seq: u64,
}

impl PollTicket {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

/// Fields the server changed without us asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub mode: Option<Mode>,
    pub pump: Option<PumpState>,
}

#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    Applied(Changes),
    /// A newer poll was already applied.
    Discarded { seq: u64, newest: u64 },
    Failed {
        error: CommandError,
        consecutive: u32,
        stale: bool,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub mode: Mode,
    pub pump: PumpState,
    /// The newest entry doubles as the "current readings" panel.
    pub history: HistoryBuffer,
    pub stale: bool,
}

pub struct ReconciliationEngine {
    state: DashboardState,
    /// Tag handed to the next poll.
    next_seq: u64,
    newest_applied: Option<u64>,
    /// Polls tagged below a fence may not touch that field.
    mode_fence: u64,
    pump_fence: u64,
    toggle_in_flight: bool,
    mode_in_flight: bool,
    consecutive_failures: u32,
    stale_after: u32,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(HistoryBuffer::default(), DEFAULT_STALE_AFTER)
    }
}

impl ReconciliationEngine {
    /// Starts as (Manual, Off) with empty history, until the first poll.
    pub fn new(history: HistoryBuffer, stale_after: u32) -> Self {
        Self {
            state: DashboardState {
                mode: Mode::Manual,
                pump: PumpState::Off,
                history,
                stale: false,
            },
            next_seq: 0,
            newest_applied: None,
            mode_fence: 0,
            pump_fence: 0,
            toggle_in_flight: false,
            mode_in_flight: false,
            consecutive_failures: 0,
            stale_after: stale_after.max(1),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    // ── Polling ─────────────────────────────────────────────────────

    pub fn begin_poll(&mut self) -> PollTicket {
        let ticket = PollTicket { seq: self.next_seq };
        self.next_seq += 1;
        ticket
    }

    /// Fold a poll result into the state. `at` is the chart label for the
    /// sample if it is accepted.
    pub fn apply_poll(
        &mut self,
        ticket: PollTicket,
        result: Result<Snapshot, CommandError>,
        at: String,
    ) -> PollOutcome {
        if let Some(newest) = self.newest_applied {
            if ticket.seq < newest {
                debug!(seq = ticket.seq, newest, "discarding out-of-order poll reply");
                return PollOutcome::Discarded {
                    seq: ticket.seq,
                    newest,
                };
            }
        }

        let snap = match result {
            Ok(snap) => snap,
            Err(error) => return self.record_failure(error),
        };

        self.newest_applied = Some(ticket.seq);
        if self.state.stale {
            info!(seq = ticket.seq, "server reachable again");
        }
        self.consecutive_failures = 0;
        self.state.stale = false;

        let mut changes = Changes::default();

        if ticket.seq >= self.mode_fence && snap.mode != self.state.mode {
            self.state.mode = snap.mode;
            changes.mode = Some(snap.mode);
        }

        if ticket.seq >= self.pump_fence && snap.pump != self.state.pump {
            self.state.pump = snap.pump;
            changes.pump = Some(snap.pump);
        }

        // Telemetry is never reconciled: every accepted reading is kept.
        self.state
            .history
            .append(at, snap.temperature, snap.humidity, snap.soil_percent);

        PollOutcome::Applied(changes)
    }

    fn record_failure(&mut self, error: CommandError) -> PollOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.state.stale && self.consecutive_failures >= self.stale_after {
            warn!(
                failures = self.consecutive_failures,
                "server unreachable; dashboard data is stale"
            );
            self.state.stale = true;
        }
        PollOutcome::Failed {
            error,
            consecutive: self.consecutive_failures,
            stale: self.state.stale,
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Check client-side guards and mark the command outstanding.
    pub fn begin_command(&mut self, command: Command) -> Result<PendingCommand, CommandError> {
        match command {
            Command::Toggle => {
                if self.state.mode != Mode::Manual {
                    return Err(Precondition::ManualModeRequired.into());
                }
                if self.toggle_in_flight {
                    return Err(Precondition::CommandInFlight(command.kind()).into());
                }
                self.toggle_in_flight = true;
            }
            Command::SetMode(_) => {
                if self.mode_in_flight {
                    return Err(Precondition::CommandInFlight(command.kind()).into());
                }
                self.mode_in_flight = true;
            }
        }
        debug!(?command, "command cleared for sending");
        Ok(PendingCommand { command })
    }

    /// Apply the server's reply to a command. Failures leave state as is.
    pub fn complete_command(
        &mut self,
        pending: PendingCommand,
        result: Result<CommandOutcome, CommandError>,
    ) -> Result<CommandOutcome, CommandError> {
        match pending.command {
            Command::Toggle => self.toggle_in_flight = false,
            Command::SetMode(_) => self.mode_in_flight = false,
        }

        let outcome = result?;
        match outcome {
            CommandOutcome::Mode(mode) => {
                self.state.mode = mode;
                self.mode_fence = self.next_seq;
            }
            CommandOutcome::Pump(pump) => {
                self.state.pump = pump;
                self.pump_fence = self.next_seq;
            }
        }
        Ok(outcome)
    }

    /// Guard, send and apply one command, waiting for the reply. Refused
    /// commands never reach `api`.
    pub async fn dispatch(
        &mut self,
        api: &dyn FarmApi,
        command: Command,
    ) -> Result<CommandOutcome, CommandError> {
        let pending = self.begin_command(command)?;
        let result = execute(api, command).await;
        self.complete_command(pending, result)
    }

    // ── Views ───────────────────────────────────────────────────────

    pub fn status_view(&self) -> StatusView {
        let toggle = match (self.state.mode, self.state.pump) {
            (Mode::Auto, _) => ToggleAffordance::AutoMode,
            (Mode::Manual, PumpState::On) => ToggleAffordance::TurnOff,
            (Mode::Manual, PumpState::Off) => ToggleAffordance::TurnOn,
        };
        let latest = self.state.history.latest();
        let reading = |f: fn(&Sample) -> Option<f64>| format_reading(latest.as_ref().and_then(f));
        StatusView {
            temperature: reading(|s| s.temperature),
            humidity: reading(|s| s.humidity),
            soil: reading(|s| s.soil_percent),
            updated_at: latest.as_ref().map_or_else(
                || NO_READING.to_string(),
                |s| s.timestamp.clone(),
            ),
            mode: self.state.mode.label(),
            pump: self.state.pump.label(),
            toggle,
            toggle_enabled: self.state.mode == Mode::Manual && !self.toggle_in_flight,
            stale: self.state.stale,
        }
    }

    pub fn chart_frames(&self) -> [ChartFrame; 2] {
        chart_frames(self.state.history.snapshot())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
