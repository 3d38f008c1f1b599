mod commands;

use std::fs;

use anyhow::{Context as _, Result};
use cmdscope::{ContextSettings, DefaultMap};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULTS_VAR: &str = "CMDSCOPE_DEFAULTS";

fn main() {
    init_tracing();
    // a missing .env file is not an error
    dotenvy::dotenv().ok();

    let settings = match root_settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    };
    let cli = match commands::build() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("Error: invalid command definition: {err}");
            std::process::exit(1);
        }
    };
    cli.main(settings)
}

/// Settings for the root Context: automatic environment variables under
/// `CMDSCOPE_`, plus an optional JSON default map.
fn root_settings() -> Result<ContextSettings> {
    let mut settings = ContextSettings::new().auto_envvar_prefix("CMDSCOPE");
    if let Ok(path) = std::env::var(DEFAULTS_VAR) {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read default map: {path}"))?;
        let defaults: DefaultMap = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse default map: {path}"))?;
        tracing::debug!(path, entries = defaults.len(), "loaded default map");
        settings = settings.default_map(defaults);
    }
    Ok(settings)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
