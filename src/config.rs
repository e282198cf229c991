use crate::alignment::AlignmentPolicy;
use crate::asr::{AsrClient, DeepgramClient, DeepgramConfig, StreamOptions};
use crate::session::SessionConfig;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable prefix; nested keys use `__`, e.g. `RECITE__ASR__API_KEY`
const ENV_PREFIX: &str = "RECITE";

/// Conventional Deepgram credential variable, used when no key is configured
const DEEPGRAM_KEY_VAR: &str = "DEEPGRAM_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub asr: AsrConfig,
    pub alignment: AlignmentPolicy,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "recite-coach".to_string(),
            log_level: "info".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub provider: String,
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub punctuate: bool,
    pub interim_results: bool,
    pub connect_timeout_secs: u64,
    pub finish_grace_ms: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        let deepgram = DeepgramConfig::default();
        Self {
            provider: "deepgram".to_string(),
            url: deepgram.url,
            api_key: String::new(),
            model: deepgram.model,
            language: deepgram.language,
            encoding: None,
            sample_rate: None,
            channels: None,
            punctuate: true,
            interim_results: true,
            connect_timeout_secs: deepgram.connect_timeout.as_secs(),
            finish_grace_ms: deepgram.finish_grace.as_millis() as u64,
        }
    }
}

impl AsrConfig {
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            punctuate: self.punctuate,
            interim_results: self.interim_results,
        }
    }

    pub fn deepgram(&self) -> DeepgramConfig {
        DeepgramConfig {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            language: self.language.clone(),
            encoding: self.encoding.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            finish_grace: Duration::from_millis(self.finish_grace_ms),
        }
    }

    /// Build the process-wide speech recognition client
    pub fn build_client(&self) -> Result<Arc<dyn AsrClient>> {
        match self.provider.as_str() {
            "deepgram" => {
                let client = DeepgramClient::new(self.deepgram())
                    .context("Failed to configure Deepgram client")?;
                Ok(Arc::new(client))
            }
            other => bail!("Unsupported speech recognition provider: {}", other),
        }
    }
}

impl Config {
    /// Load configuration from an optional file (any format the `config`
    /// crate recognizes by extension) overlaid with `RECITE__*` variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if cfg.asr.api_key.is_empty() {
            if let Ok(key) = std::env::var(DEEPGRAM_KEY_VAR) {
                cfg.asr.api_key = key;
            }
        }

        Ok(cfg)
    }
}
