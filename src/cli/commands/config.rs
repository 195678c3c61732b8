//! Config command - display the effective configuration.

use crate::config::Settings;

/// Print the merged settings as TOML.
pub fn run_config(settings: &Settings) -> anyhow::Result<()> {
    let rendered = settings.to_toml()?;
    println!("{rendered}");
    Ok(())
}
