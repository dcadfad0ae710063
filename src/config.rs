use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub weaviate: WeaviateConfig,
    #[serde(default)]
    pub vapi: VapiConfig,
    /// Env file read for API keys and written by `consult setup`.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// Resolved from the process environment and `env_file`, never from TOML.
    #[serde(skip)]
    pub secrets: Secrets,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            uploads: UploadsConfig::default(),
            gemini: GeminiConfig::default(),
            weaviate: WeaviateConfig::default(),
            vapi: VapiConfig::default(),
            env_file: default_env_file(),
            secrets: Secrets::default(),
        }
    }
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_root")]
    pub root: PathBuf,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: default_uploads_root(),
        }
    }
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            timeout_secs: None,
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-thinking-exp".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeaviateConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_agent_url")]
    pub agent_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            agent_url: default_agent_url(),
            timeout_secs: None,
        }
    }
}

fn default_collection() -> String {
    "NormalizedDocuments".to_string()
}
fn default_agent_url() -> String {
    "https://api.agents.weaviate.io/v1/query".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VapiConfig {
    #[serde(default = "default_vapi_base_url")]
    pub base_url: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    /// Pass the focused query and retrieved hits to the assistant as
    /// `assistantOverrides.variableValues` when placing a call.
    #[serde(default)]
    pub forward_context: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for VapiConfig {
    fn default() -> Self {
        Self {
            base_url: default_vapi_base_url(),
            voice_id: default_voice_id(),
            forward_context: false,
            timeout_secs: None,
        }
    }
}

fn default_vapi_base_url() -> String {
    "https://api.vapi.ai".to_string()
}
fn default_voice_id() -> String {
    "cgSgspJ2msm6clMCkdW9".to_string()
}

/// API keys and identifiers for the hosted services.
///
/// Every field is optional here. A missing value only becomes an error
/// when the client that needs it is constructed, so a server with no
/// Weaviate credentials still starts and reports `error` per request.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub gemini_api_key: Option<String>,
    pub weaviate_url: Option<String>,
    pub weaviate_api_key: Option<String>,
    pub vapi_api_key: Option<String>,
    pub vapi_assistant_id: Option<String>,
    pub vapi_phone_number_id: Option<String>,
}

impl Secrets {
    /// Resolve secrets with `lookup`, which is consulted for each variable
    /// name. Empty values count as unset.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            weaviate_url: get("WEAVIATE_URL"),
            weaviate_api_key: get("WEAVIATE_API_KEY"),
            vapi_api_key: get("VAPI_API_KEY"),
            vapi_assistant_id: get("VAPI_ASSISTANT_ID"),
            vapi_phone_number_id: get("VAPI_PHONE_NUMBER_ID"),
        }
    }

    /// Process environment first, then the parsed env file.
    pub fn from_env(env_file: &HashMap<String, String>) -> Self {
        Self::resolve(|key| std::env::var(key).ok().or_else(|| env_file.get(key).cloned()))
    }
}

/// Read an env file with `dotenvy` without touching the process
/// environment. A missing file is not an error.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to read env file: {}", path.display()))?;
    let mut vars = HashMap::new();
    for entry in entries {
        let (key, value) =
            entry.with_context(|| format!("Failed to parse env file: {}", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist, then resolve secrets.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;

    let env_vars = read_env_file(&config.env_file)?;
    config.secrets = Secrets::from_env(&env_vars);
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be > 0");
    }

    if config.weaviate.collection.trim().is_empty() {
        anyhow::bail!("weaviate.collection must not be empty");
    }

    for (name, url) in [
        ("gemini.base_url", &config.gemini.base_url),
        ("weaviate.agent_url", &config.weaviate.agent_url),
        ("vapi.base_url", &config.vapi.base_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
        }
    }

    Ok(())
}
