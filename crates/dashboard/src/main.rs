mod api;
mod client;
mod config;
mod console;
mod engine;
mod error;
mod history;
mod poller;
mod sink;

use anyhow::{bail, Result};
use std::{env, sync::Arc};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::{FarmApi, HttpClient};
use console::Input;
use engine::ReconciliationEngine;
use history::HistoryBuffer;
use poller::PollingLoop;
use sink::LogSink;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "dashboard.toml".to_string());
    let cfg = config::load(&config_path)?;
    info!(
        url = %cfg.base_url,
        interval_ms = cfg.poll_interval_ms,
        history = cfg.history_len,
        login = cfg.username.is_some(),
        "dashboard starting"
    );

    // ── Farm server client ──────────────────────────────────────────
    let client = HttpClient::new(&cfg)?;
    if let Err(e) = client.login().await {
        // Not fatal: the loop logs in again when the server bounces us.
        warn!("initial login failed: {e}");
    }
    let api: Arc<dyn FarmApi> = Arc::new(client);

    let engine = ReconciliationEngine::new(
        HistoryBuffer::with_capacity(cfg.history_len),
        cfg.stale_after_failures,
    );
    let mut polling = PollingLoop::new(engine, api, LogSink, cfg.poll_interval());

    // ── One-shot command (e.g. `farm-dashboard mode auto`) ──────────
    let args: Vec<String> = env::args().skip(1).collect();
    if !args.is_empty() {
        let command = match console::parse_input(&args.join(" ")) {
            Ok(Input::Command(command)) => command,
            Ok(_) => bail!("only `toggle` or `mode manual|auto` can be given as arguments"),
            Err(msg) => bail!("{msg}"),
        };
        let outcome = polling.run_once(command).await?;
        info!(?outcome, "command confirmed");
        return Ok(());
    }

    // ── Operator console ────────────────────────────────────────────
    let (input_tx, input_rx) = mpsc::channel(16);
    tokio::spawn(console::read_stdin(input_tx));
    info!("commands: toggle | mode manual | mode auto | status | quit");

    // ── Polling loop ────────────────────────────────────────────────
    tokio::select! {
        done = polling.run(input_rx) => {
            let state = done.engine().state();
            info!(
                mode = %state.mode,
                pump = %state.pump,
                samples = state.history.len(),
                "dashboard stopped"
            );
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted; dashboard stopped"),
    }

    Ok(())
}
