use std::sync::Arc;
use std::time::{Duration, Instant};

use dashwatch_agent::Monitor;
use dashwatch_browser::CdpHost;
use dashwatch_core::clock::now_ms;
use dashwatch_core::{Config, ExtensionState, Paths, RevolverState};
use dashwatch_extract::ExtractOptions;
use dashwatch_scheduler::{command_channel, PollScheduler};
use dashwatch_storage::{JsonStateStore, StateStorage};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::api::{self, ApiState};
use crate::notify::TerminalSink;

pub async fn run(host: Option<String>, port: Option<u16>, cdp_port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let mut config = Config::load_or_default(&paths)?;
    if let Some(host) = host {
        config.control.host = host;
    }
    if let Some(port) = port {
        config.control.port = port;
    }
    if let Some(cdp_port) = cdp_port {
        config.browser.cdp_port = cdp_port;
    }

    let storage = Arc::new(JsonStateStore::from_paths(&paths));
    // A document we cannot read (e.g. written by a newer build) is never overwritten.
    let state = match storage.load().await {
        Ok(Some(state)) => {
            info!(
                path = %storage.path().display(),
                tabs = state.tabs.len(),
                alerts = state.alerts.len(),
                "Restored monitor state"
            );
            state
        }
        Ok(None) => {
            let mut state = ExtensionState::fresh(now_ms());
            state.revolver.interval_ms = RevolverState::clamp_interval(config.revolver.interval_ms);
            state
        }
        Err(e) => {
            anyhow::bail!(
                "Cannot load state from {}: {}. Move the file aside or run a matching dashwatch build.",
                storage.path().display(),
                e
            );
        }
    };

    let extract = ExtractOptions::from_config(&config.monitor)?;
    let monitor = Monitor::new(state, &config);
    let host = Arc::new(CdpHost::new(&config.browser)?);
    let sink = Arc::new(TerminalSink::new(config.notify.clone()));

    let scheduler = PollScheduler::new(
        monitor,
        host,
        sink,
        storage,
        extract,
        Duration::from_millis(config.monitor.poll_interval_ms),
    );

    let (handle, commands) = command_channel(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_shutdown_rx = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run_loop(commands, scheduler_shutdown_rx).await;
    });

    let app = api::router(ApiState {
        scheduler: handle,
        started: Instant::now(),
    });
    let bind_addr = format!("{}:{}", config.control.host, config.control.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let http_shutdown_rx = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = http_shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
            .ok();
    });

    print_banner(&config, &paths, &bind_addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining tasks...");
    let _ = shutdown_tx.send(());

    let handles: Vec<(&str, tokio::task::JoinHandle<()>)> =
        vec![("http_server", http_handle), ("scheduler", scheduler_handle)];

    let total = handles.len();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if handles.iter().all(|(_, h)| h.is_finished()) {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut aborted = 0;
    for (name, handle) in &handles {
        if !handle.is_finished() {
            warn!(task = *name, "Task did not exit in graceful window, aborting");
            handle.abort();
            aborted += 1;
        }
    }

    for (name, handle) in handles {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                debug!(task = name, "Task cancelled during shutdown");
            }
            Err(e) => {
                error!(task = name, error = %e, "Task panicked during shutdown");
            }
        }
    }

    info!(total, aborted, "dashwatch stopped");
    Ok(())
}

fn print_banner(config: &Config, paths: &Paths, bind_addr: &str) {
    eprintln!();
    eprintln!("  📡 dashwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!(
        "  Browser:   http://{}:{}  (start Chrome with --remote-debugging-port={})",
        config.browser.cdp_host, config.browser.cdp_port, config.browser.cdp_port
    );
    eprintln!("  Control:   http://{}/v1/health", bind_addr);
    eprintln!("  State:     {}", paths.state_file().display());
    eprintln!("  Poll:      every {} ms", config.monitor.poll_interval_ms);
    eprintln!();
    eprintln!("  Press Ctrl+C to stop.");
    eprintln!();
}
