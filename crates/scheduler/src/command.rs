use dashwatch_core::{Error, ExtensionState, Result, RevolverState, TabId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::revolver::RevolverAction;

/// Requests applied by the scheduler between cycles.
#[derive(Debug)]
pub enum Command {
    ToggleRunning { reply: oneshot::Sender<bool> },
    Reset { reply: oneshot::Sender<()> },
    ClearAlerts { reply: oneshot::Sender<()> },
    ToggleMute { tab_id: TabId, reply: oneshot::Sender<bool> },
    PollNow { reply: oneshot::Sender<CycleSummary> },
    State { reply: oneshot::Sender<ExtensionState> },
    Revolver { action: RevolverAction, reply: oneshot::Sender<RevolverState> },
}

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    /// `false` when the cycle was skipped because monitoring is paused.
    pub ran: bool,
    pub tabs_checked: usize,
    pub tabs_skipped: usize,
    pub alerts_raised: usize,
}

pub fn command_channel(buffer: usize) -> (SchedulerHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(buffer);
    (SchedulerHandle { tx }, rx)
}

/// Cloneable front door to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| Error::Other("scheduler is not running".into()))?;
        rx.await
            .map_err(|_| Error::Other("scheduler dropped the request".into()))
    }

    /// Pause or resume. Returns the new running flag.
    pub async fn toggle_running(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleRunning { reply }).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn clear_alerts(&self) -> Result<()> {
        self.request(|reply| Command::ClearAlerts { reply }).await
    }

    /// Returns the tab's new mute flag.
    pub async fn toggle_mute(&self, tab_id: impl Into<TabId>) -> Result<bool> {
        let tab_id = tab_id.into();
        self.request(|reply| Command::ToggleMute { tab_id, reply }).await
    }

    pub async fn poll_now(&self) -> Result<CycleSummary> {
        self.request(|reply| Command::PollNow { reply }).await
    }

    pub async fn state(&self) -> Result<ExtensionState> {
        self.request(|reply| Command::State { reply }).await
    }

    pub async fn revolver(&self, action: RevolverAction) -> Result<RevolverState> {
        self.request(|reply| Command::Revolver { action, reply }).await
    }
}
