use std::time::Duration;

use dashwatch_core::{Config, Paths, RevolverState};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Thin HTTP client for a running `dashwatch run` daemon.
struct ControlClient {
    base: String,
    http: reqwest::Client,
}

impl ControlClient {
    fn from_config() -> anyhow::Result<Self> {
        let paths = Paths::new();
        let config = Config::load_or_default(&paths)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base: config.control.base_url(),
            http,
        })
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> anyhow::Result<T> {
        let resp = req.send().await.map_err(|e| {
            anyhow::anyhow!(
                "Cannot reach the daemon at {} ({}). Is `dashwatch run` running?",
                self.base,
                e
            )
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let msg = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no details");
            anyhow::bail!("Daemon returned {}: {}", status, msg);
        }
        Ok(resp.json::<T>().await?)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        self.send(self.http.post(format!("{}{}", self.base, path))).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        self.send(self.http.get(format!("{}{}", self.base, path))).await
    }
}

pub async fn toggle() -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let body: Value = client.post("/v1/toggle").await?;
    if body["isRunning"].as_bool().unwrap_or(false) {
        println!("▶️  Monitoring resumed");
    } else {
        println!("⏸️  Monitoring paused");
    }
    Ok(())
}

pub async fn reset() -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let _: Value = client.post("/v1/reset").await?;
    println!("✓ State reset");
    Ok(())
}

pub async fn clear_alerts() -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let _: Value = client.post("/v1/alerts/clear").await?;
    println!("✓ Alert log cleared");
    Ok(())
}

pub async fn mute(tab_id: &str) -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let body: Value = client.post(&format!("/v1/tabs/{}/mute", tab_id)).await?;
    if body["isMuted"].as_bool().unwrap_or(false) {
        println!("🔇 Tab {} muted", tab_id);
    } else {
        println!("🔔 Tab {} unmuted", tab_id);
    }
    Ok(())
}

pub async fn poll() -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let body: Value = client.post("/v1/poll").await?;
    if !body["ran"].as_bool().unwrap_or(false) {
        println!("⏸️  Monitoring is paused, nothing polled");
        return Ok(());
    }
    println!(
        "✓ Poll finished: {} checked, {} skipped, {} alert(s)",
        body["tabsChecked"], body["tabsSkipped"], body["alertsRaised"]
    );
    Ok(())
}

pub async fn revolver(action: &str) -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let state: RevolverState = client.post(&format!("/v1/revolver/{}", action)).await?;
    print_revolver(&state);
    Ok(())
}

pub async fn revolver_interval(ms: u64) -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let req = client
        .http
        .put(format!("{}/v1/revolver/interval", client.base))
        .json(&serde_json::json!({ "intervalMs": ms }));
    let state: RevolverState = client.send(req).await?;
    if state.interval_ms != ms {
        println!("⚠ {} ms is out of range, clamped", ms);
    }
    print_revolver(&state);
    Ok(())
}

pub async fn revolver_status() -> anyhow::Result<()> {
    let client = ControlClient::from_config()?;
    let state: RevolverState = client.get("/v1/revolver").await?;
    print_revolver(&state);
    Ok(())
}

fn print_revolver(state: &RevolverState) {
    println!(
        "🔄 Revolver {} (every {:.1}s)",
        if state.enabled { "on" } else { "off" },
        state.interval_ms as f64 / 1000.0
    );
}
