use async_trait::async_trait;
use dashwatch_core::{AlertEvent, Result, TabInfo};
use dashwatch_extract::PageContent;

/// Source of tabs and their rendered content.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// All tabs currently open, eligible or not.
    async fn list_tabs(&self) -> Result<Vec<TabInfo>>;
    /// Read a tab's rendered page. Implementations enforce their own timeout.
    async fn read_page(&self, tab: &TabInfo) -> Result<PageContent>;
    /// Bring a tab to the foreground.
    async fn activate(&self, tab_id: &str) -> Result<()>;
}

/// Receives each new alert event exactly once.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, event: &AlertEvent);
}

/// Sink that only logs. Used when no audible device is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn notify(&self, event: &AlertEvent) {
        tracing::warn!(
            tab_id = %event.tab_id,
            kind = %event.snapshot_type,
            "ALERT {}: {}",
            event.tab_title,
            event.detail()
        );
    }
}
