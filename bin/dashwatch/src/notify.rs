use std::io::Write;

use async_trait::async_trait;
use dashwatch_agent::AlertSink;
use dashwatch_core::config::NotifyConfig;
use dashwatch_core::AlertEvent;
use tracing::{debug, warn};

/// Alert sink for an operator sitting at the terminal: bell, log line and
/// optionally a desktop notification.
pub struct TerminalSink {
    config: NotifyConfig,
}

impl TerminalSink {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AlertSink for TerminalSink {
    async fn notify(&self, event: &AlertEvent) {
        warn!(
            tab_id = %event.tab_id,
            kind = %event.snapshot_type,
            "ALERT {}: {}",
            event.tab_title,
            event.detail()
        );

        if self.config.bell {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }

        if self.config.desktop {
            if let Err(e) = send_desktop(&event.tab_title, &event.detail()).await {
                warn!(error = %e, "Desktop notification failed");
            }
        }
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn send_desktop(title: &str, message: &str) -> anyhow::Result<()> {
    let output = if cfg!(target_os = "macos") {
        let script = format!(
            r#"display notification "{}" with title "{}" sound name "Sosumi""#,
            escape_applescript(message),
            escape_applescript(title)
        );
        tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
            .await?
    } else {
        tokio::process::Command::new("notify-send")
            .arg("--urgency=critical")
            .arg(title)
            .arg(message)
            .output()
            .await?
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("notifier exited with {}: {}", output.status, stderr.trim());
    }
    debug!(title, "Desktop notification sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_applescript() {
        assert_eq!(escape_applescript(r#"CPU "prod" \ 1"#), r#"CPU \"prod\" \\ 1"#);
    }
}
