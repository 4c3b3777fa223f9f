//! Rotation of the foreground tab among monitored dashboards.

use std::time::Duration;

use dashwatch_agent::Monitor;
use dashwatch_core::RevolverState;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevolverAction {
    Toggle,
    Start,
    Stop,
    /// Milliseconds; clamped to the allowed range.
    SetInterval(u64),
    Status,
}

pub(crate) fn apply(monitor: &mut Monitor, action: RevolverAction) -> RevolverState {
    match action {
        RevolverAction::Toggle => {
            let enabled = !monitor.revolver().enabled;
            monitor.set_revolver_enabled(enabled);
        }
        RevolverAction::Start => monitor.set_revolver_enabled(true),
        RevolverAction::Stop => monitor.set_revolver_enabled(false),
        RevolverAction::SetInterval(ms) => {
            monitor.set_revolver_interval(ms);
        }
        RevolverAction::Status => {}
    }
    monitor.revolver().clone()
}

/// Timer that is armed only while rotation is active.
#[derive(Default)]
pub(crate) struct RevolverTimer {
    timer: Option<Interval>,
    period_ms: Option<u64>,
    cursor: usize,
}

impl RevolverTimer {
    /// Re-arm, disarm or leave the timer alone to match the wanted state.
    pub(crate) fn sync(&mut self, active: bool, period_ms: u64) {
        let wanted = active.then_some(period_ms);
        if wanted == self.period_ms {
            return;
        }
        self.period_ms = wanted;
        self.timer = wanted.map(|ms| {
            let period = Duration::from_millis(ms);
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        match wanted {
            Some(ms) => info!(interval_ms = ms, "Tab revolver started"),
            None => info!("Tab revolver stopped"),
        }
    }

    /// Resolves on the next rotation tick; never resolves while disarmed.
    pub(crate) async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Advance to the next of `len` tabs.
    pub(crate) fn next_index(&mut self, len: usize) -> usize {
        self.cursor = (self.cursor + 1) % len.max(1);
        self.cursor
    }
}
