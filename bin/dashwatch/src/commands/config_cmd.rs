use dashwatch_core::{Config, Paths};

/// Show the effective configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!();
    println!("📋 Current Configuration");
    println!(
        "  File: {}{}",
        paths.config_file().display(),
        if paths.config_file().exists() { "" } else { " (not found, showing defaults)" }
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path() -> anyhow::Result<()> {
    println!("{}", Paths::new().config_file().display());
    Ok(())
}
