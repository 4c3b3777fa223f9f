use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashwatch_agent::TabHost;
use dashwatch_core::config::BrowserConfig;
use dashwatch_core::{Error, Result, TabInfo};
use dashwatch_extract::PageContent;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::cdp::CdpClient;

/// Returns the rendered body of the page in one round trip.
const READ_PAGE_JS: &str = r#"(() => ({
  url: location.href,
  title: document.title,
  html: document.body ? document.body.innerHTML : '',
  text: document.body ? document.body.innerText : ''
}))()"#;

/// One entry of the `/json/list` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Target {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    web_socket_debugger_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagePayload {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html: String,
    #[serde(default)]
    text: String,
}

/// Tabs of a Chrome instance started with `--remote-debugging-port`.
pub struct CdpHost {
    base: Url,
    http: reqwest::Client,
    page_timeout: Duration,
    /// Target id to debugger URL, refreshed on every listing.
    sockets: Mutex<HashMap<String, String>>,
}

impl CdpHost {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let base = Url::parse(&format!("http://{}:{}/", config.cdp_host, config.cdp_port))
            .map_err(|e| Error::Config(format!("Invalid CDP endpoint: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Host(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base,
            http,
            page_timeout: Duration::from_secs(config.page_timeout_secs.max(1)),
            sockets: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Host(format!("Invalid CDP path {}: {}", path, e)))
    }

    async fn targets(&self) -> Result<Vec<Target>> {
        let url = self.endpoint("json/list")?;
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Host(format!("Browser not reachable at {}: {}", url, e)))?;
        resp.json::<Vec<Target>>()
            .await
            .map_err(|e| Error::Host(format!("Invalid target list: {}", e)))
    }

    async fn socket_for(&self, tab_id: &str) -> Result<String> {
        if let Some(ws) = self.sockets.lock().await.get(tab_id) {
            return Ok(ws.clone());
        }
        self.list_tabs().await?;
        self.sockets
            .lock()
            .await
            .get(tab_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("tab {}", tab_id)))
    }

    async fn read_page_inner(&self, tab: &TabInfo) -> Result<PageContent> {
        let ws = self.socket_for(&tab.id).await?;
        let client = CdpClient::connect(&ws, self.page_timeout).await?;
        let value = client.evaluate_value(READ_PAGE_JS).await?;
        page_from_value(value, tab)
    }
}

fn page_tabs(targets: &[Target]) -> Vec<TabInfo> {
    targets
        .iter()
        .filter(|t| t.kind == "page")
        .map(|t| TabInfo {
            id: t.id.clone(),
            title: t.title.clone(),
            url: t.url.clone(),
        })
        .collect()
}

fn page_from_value(value: Value, tab: &TabInfo) -> Result<PageContent> {
    let payload: PagePayload = serde_json::from_value(value)
        .map_err(|e| Error::Host(format!("Unexpected page payload for tab {}: {}", tab.id, e)))?;
    Ok(PageContent {
        url: if payload.url.is_empty() { tab.url.clone() } else { payload.url },
        title: if payload.title.is_empty() { tab.title.clone() } else { payload.title },
        html: payload.html,
        text: payload.text,
    })
}

#[async_trait]
impl TabHost for CdpHost {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        let targets = self.targets().await?;
        let mut sockets = self.sockets.lock().await;
        sockets.clear();
        for t in targets.iter().filter(|t| t.kind == "page") {
            if let Some(ws) = &t.web_socket_debugger_url {
                sockets.insert(t.id.clone(), ws.clone());
            }
        }
        Ok(page_tabs(&targets))
    }

    async fn read_page(&self, tab: &TabInfo) -> Result<PageContent> {
        match tokio::time::timeout(self.page_timeout, self.read_page_inner(tab)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "reading tab {} took longer than {}s",
                tab.id,
                self.page_timeout.as_secs()
            ))),
        }
    }

    async fn activate(&self, tab_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("json/activate/{}", tab_id))?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Host(format!("Activate failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::Host(format!(
                "Activate tab {} returned {}",
                tab_id,
                resp.status()
            )));
        }
        debug!(tab_id = %tab_id, "Tab activated");
        Ok(())
    }
}
