use std::path::Path;

use dashwatch_agent::{evaluate, Rules, TabHistory};
use dashwatch_core::clock::now_ms;
use dashwatch_core::{Config, Paths};
use dashwatch_extract::{classify, read_page, ExtractOptions, PageContent};
use serde_json::{json, Value};

/// Run a page through the same pipeline a poll cycle uses, without a browser.
fn inspect_page(page: &PageContent, config: &Config, now: i64) -> anyhow::Result<Value> {
    let opts = ExtractOptions::from_config(&config.monitor)?;
    let rules = Rules::from_config(&config.monitor);
    let kind = classify(page, &opts);
    let snapshot = read_page(page, &opts);
    let evaluation = evaluate(&snapshot, &TabHistory::default(), now, &rules);
    Ok(json!({
        "url": page.url,
        "classifiedAs": kind,
        "snapshot": snapshot,
        "evaluation": evaluation,
    }))
}

pub async fn run(file: &Path, url: &str) -> anyhow::Result<()> {
    let html = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", file.display(), e))?;
    let config = Config::load_or_default(&Paths::new())?;
    let page = PageContent::from_html(url, html);
    let report = inspect_page(&page, &config, now_ms())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
