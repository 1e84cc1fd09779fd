use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, Result};
use log::error;

use acm_certificate_resource::handle_event;
use acm_certificate_resource::config::Settings;

fn read_event() -> Result<serde_json::Value> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read event from {path}"))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read event from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("event is not valid JSON")
}

fn run() -> Result<()> {
    let event = read_event()?;
    handle_event(event, &Settings::from_env())?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
