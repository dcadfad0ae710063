//! One-time voice setup commands.
//!
//! `consult setup assistant` creates the advisor assistant and a phone number;
//! `consult setup existing` reuses the first existing assistant. Both append
//! the resulting ids to the env file so the server picks them up on its next
//! start. `consult check-keys` probes each configured Vapi key.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;

use crate::config::{self, Config};
use crate::vapi::{AssistantSpec, PhoneNumber, VapiClient};

/// Keys probed by `consult check-keys`, in order.
pub const PROBED_KEYS: [&str; 2] = ["VAPI_API_KEY", "YOUR_VAPI_API_KEY"];

/// Placeholder values shipped in example env files.
const PLACEHOLDER_KEYS: [&str; 2] = ["YOUR_VAPI_API_KEY", "YOUR_VAPI_API_KEY_HERE"];

fn client(config: &Config) -> Result<VapiClient> {
    match config.secrets.vapi_api_key.as_deref() {
        None => bail!("VAPI_API_KEY not set; add it to {}", config.env_file.display()),
        Some(key) if PLACEHOLDER_KEYS.contains(&key) => {
            bail!("VAPI_API_KEY is still a placeholder in {}", config.env_file.display())
        }
        Some(_) => Ok(VapiClient::new(&config.vapi, &config.secrets)?),
    }
}

/// Create the advisor assistant, provision a number, save the ids.
pub async fn run_setup_assistant(config: &Config, area_code: &str) -> Result<()> {
    let client = client(config)?;

    println!("Creating assistant...");
    let spec = AssistantSpec::startup_advisor(&config.vapi.voice_id);
    let assistant_id = client
        .create_assistant(&spec)
        .await
        .context("Failed to create assistant")?;
    println!("  assistant id: {}", assistant_id);

    finish_with_number(config, &client, &assistant_id, area_code).await
}

/// Provision a number for the first existing assistant, save the ids.
pub async fn run_setup_existing(config: &Config, area_code: &str) -> Result<()> {
    let client = client(config)?;

    let assistants = client
        .list_assistants()
        .await
        .context("Failed to list assistants")?;
    let Some(assistant) = assistants.into_iter().next() else {
        bail!("No assistants found; run `consult setup assistant` instead");
    };
    println!(
        "Using existing assistant: {} ({})",
        assistant.name.as_deref().unwrap_or("unnamed"),
        assistant.id
    );

    finish_with_number(config, &client, &assistant.id, area_code).await
}

async fn finish_with_number(
    config: &Config,
    client: &VapiClient,
    assistant_id: &str,
    area_code: &str,
) -> Result<()> {
    println!("Creating phone number (area code {})...", area_code);
    let phone = client
        .create_phone_number(assistant_id, area_code)
        .await
        .context("Failed to create phone number")?;
    println!("  phone number id: {}", phone.id);
    println!("  phone number: {}", phone.number.as_deref().unwrap_or("N/A"));

    append_env_ids(&config.env_file, assistant_id, &phone)?;
    tracing::info!(env_file = %config.env_file.display(), "saved voice ids");
    println!("Saved ids to {}", config.env_file.display());
    println!("ok");
    Ok(())
}

/// Append the assistant and phone number ids to an env file, creating it
/// if needed.
pub fn append_env_ids(path: &Path, assistant_id: &str, phone: &PhoneNumber) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open env file: {}", path.display()))?;
    write!(
        file,
        "\n# Vapi assistant and phone number\nVAPI_ASSISTANT_ID={}\nVAPI_PHONE_NUMBER_ID={}\nVAPI_PHONE_NUMBER={}\n",
        assistant_id,
        phone.id,
        phone.number.as_deref().unwrap_or("")
    )?;
    Ok(())
}

/// Outcome of probing one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Valid,
    Unauthorized,
    Unexpected(u16),
    Unreachable(String),
}

pub fn classify_probe(status: u16) -> KeyCheck {
    match status {
        200 => KeyCheck::Valid,
        401 => KeyCheck::Unauthorized,
        other => KeyCheck::Unexpected(other),
    }
}

/// Probe every configured key with `GET /assistant`. Fails when no key is
/// configured or none is valid.
pub async fn run_check_keys(config: &Config) -> Result<()> {
    let file_vars = config::read_env_file(&config.env_file)?;
    let lookup = |key: &str| {
        std::env::var(key)
            .ok()
            .or_else(|| file_vars.get(key).cloned())
            .filter(|v| !v.trim().is_empty())
    };

    let keys: Vec<(&str, String)> = PROBED_KEYS
        .iter()
        .filter_map(|name| lookup(name).map(|v| (*name, v)))
        .collect();
    if keys.is_empty() {
        bail!("No Vapi keys found (checked {})", PROBED_KEYS.join(", "));
    }

    let mut valid = None;
    for (name, key) in &keys {
        let prefix: String = key.chars().take(8).collect();
        let check = match VapiClient::with_key(&config.vapi, key)?.probe().await {
            Ok((status, _)) => classify_probe(status),
            Err(e) => KeyCheck::Unreachable(e.to_string()),
        };
        match &check {
            KeyCheck::Valid => {
                println!("{:<20} {}... valid", name, prefix);
                valid = Some(*name);
            }
            KeyCheck::Unauthorized => println!("{:<20} {}... invalid (unauthorized)", name, prefix),
            KeyCheck::Unexpected(status) => {
                println!("{:<20} {}... unexpected status {}", name, prefix, status)
            }
            KeyCheck::Unreachable(err) => println!("{:<20} {}... error: {}", name, prefix, err),
        }
    }

    match valid {
        Some(name) => {
            println!("ok ({} is valid)", name);
            Ok(())
        }
        None => bail!("No valid Vapi keys found"),
    }
}
