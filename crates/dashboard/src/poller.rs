//! The polling loop: the single task that owns the reconciliation engine.
//!
//! Every request (poll, command, login) runs in its own spawned task and
//! reports back over a channel, so the loop never waits on the network and
//! the timer keeps its cadence while requests are outstanding.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::Snapshot;
use crate::client::{execute, FarmApi};
use crate::console::Input;
use crate::engine::{
    Command, CommandOutcome, PendingCommand, PollOutcome, PollTicket, ReconciliationEngine,
};
use crate::error::CommandError;
use crate::history::now_label;
use crate::sink::ChartSink;

/// Results of spawned requests, delivered back to the loop.
enum Event {
    Polled(PollTicket, Result<Snapshot, CommandError>),
    Commanded(PendingCommand, Result<CommandOutcome, CommandError>),
    LoggedIn(Result<(), CommandError>),
}

pub struct PollingLoop<S> {
    engine: ReconciliationEngine,
    api: Arc<dyn FarmApi>,
    sink: S,
    interval: Duration,
    login_in_flight: bool,
}

impl<S: ChartSink> PollingLoop<S> {
    pub fn new(
        engine: ReconciliationEngine,
        api: Arc<dyn FarmApi>,
        sink: S,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            api,
            sink,
            interval,
            login_in_flight: false,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> &S {
        &self.sink
    }

    /// Poll immediately, then every `interval`, until the operator quits or
    /// the input channel closes. Returns the loop so its state can be
    /// inspected.
    pub async fn run(mut self, mut input: mpsc::Receiver<Input>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        // First tick completes immediately.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            history = self.engine.state().history.capacity(),
            "polling started"
        );
        self.sink.draw_status(&self.engine.status_view());

        loop {
            tokio::select! {
                _ = ticker.tick() => self.spawn_poll(&tx),
                Some(event) = rx.recv() => self.handle_event(event, &tx),
                received = input.recv() => match received {
                    Some(Input::Command(command)) => self.spawn_command(command, &tx),
                    Some(Input::Status) => self.redraw(),
                    Some(Input::Quit) | None => break,
                },
            }
        }

        info!("polling stopped");
        self
    }

    /// Read the farm state with one poll, then send `command` and wait for
    /// the server to confirm it. Used for one-shot invocations.
    pub async fn run_once(&mut self, command: Command) -> Result<CommandOutcome, CommandError> {
        let ticket = self.engine.begin_poll();
        let result = self.api.fetch_snapshot().await;
        if let PollOutcome::Failed { error, .. } =
            self.engine.apply_poll(ticket, result, now_label())
        {
            return Err(error);
        }

        info!(?command, "command sent");
        let outcome = self.engine.dispatch(self.api.as_ref(), command).await;
        self.sink.draw_status(&self.engine.status_view());
        outcome
    }

    fn redraw(&mut self) {
        if !self.engine.state().history.is_empty() {
            for frame in self.engine.chart_frames() {
                self.sink.draw_chart(&frame);
            }
        }
        self.sink.draw_status(&self.engine.status_view());
    }

    // ── Spawning ────────────────────────────────────────────────────

    fn spawn_poll(&mut self, tx: &mpsc::UnboundedSender<Event>) {
        let ticket = self.engine.begin_poll();
        debug!(seq = ticket.seq(), "poll issued");

        let api = Arc::clone(&self.api);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_snapshot().await;
            // Receiver gone means the loop has stopped.
            let _ = tx.send(Event::Polled(ticket, result));
        });
    }

    fn spawn_command(&mut self, command: Command, tx: &mpsc::UnboundedSender<Event>) {
        let pending = match self.engine.begin_command(command) {
            Ok(p) => p,
            Err(e) => {
                warn!(?command, "command refused: {e}");
                return;
            }
        };
        info!(?command, "command sent");
        // toggle button is disabled while outstanding
        self.sink.draw_status(&self.engine.status_view());

        let api = Arc::clone(&self.api);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = execute(api.as_ref(), pending.command()).await;
            let _ = tx.send(Event::Commanded(pending, result));
        });
    }

    fn spawn_login(&mut self, tx: &mpsc::UnboundedSender<Event>) {
        if self.login_in_flight {
            return;
        }
        self.login_in_flight = true;

        let api = Arc::clone(&self.api);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = api.login().await;
            let _ = tx.send(Event::LoggedIn(result));
        });
    }

    // ── Results ─────────────────────────────────────────────────────

    fn handle_event(&mut self, event: Event, tx: &mpsc::UnboundedSender<Event>) {
        match event {
            Event::Polled(ticket, result) => {
                let relogin = matches!(&result, Err(e) if e.is_unauthenticated());
                match self.engine.apply_poll(ticket, result, now_label()) {
                    PollOutcome::Applied(changes) => {
                        if let Some(mode) = changes.mode {
                            info!(%mode, "mode changed on server");
                        }
                        if let Some(pump) = changes.pump {
                            info!(%pump, "pump changed on server");
                        }
                        self.redraw();
                    }
                    PollOutcome::Discarded { seq, newest } => {
                        debug!(seq, newest, "stale poll reply dropped");
                    }
                    PollOutcome::Failed {
                        error,
                        consecutive,
                        stale,
                    } => {
                        warn!(seq = ticket.seq(), consecutive, "poll failed: {error}");
                        if stale {
                            self.sink.draw_status(&self.engine.status_view());
                        }
                        if relogin {
                            self.spawn_login(tx);
                        }
                    }
                }
            }
            Event::Commanded(pending, result) => {
                let command = pending.command();
                match self.engine.complete_command(pending, result) {
                    Ok(outcome) => info!(?command, ?outcome, "command confirmed"),
                    Err(e) => {
                        warn!(?command, "command failed: {e}");
                        if e.is_unauthenticated() {
                            self.spawn_login(tx);
                        }
                    }
                }
                self.sink.draw_status(&self.engine.status_view());
            }
            Event::LoggedIn(result) => {
                self.login_in_flight = false;
                if let Err(e) = result {
                    warn!("login failed: {e}");
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
