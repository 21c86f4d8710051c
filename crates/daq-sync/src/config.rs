//! Pipeline configuration.
//!
//! Layered with `figment`:
//!
//! 1. Defaults ([`SyncConfig::default`])
//! 2. TOML file (optional; a missing file is reported and skipped)
//! 3. Environment variables prefixed `DAQSYNC_`, nested with `__`
//!    (`DAQSYNC_CACHE__CAPACITY=500` sets `cache.capacity`)
//!
//! ```toml
//! log_level = "info"
//! queue_capacity = 8
//!
//! [[channels]]
//! name = "x"
//! tolerance_s = 0.001
//!
//! [cache]
//! mode = "scan"
//! capacity = 1000
//! gate_channel = "scan_on"
//! ```
//!
//! Validation runs before anything is built; a bad configuration is fatal.

use crate::association::ChannelPolicy;
use anyhow::{Context, Result};
use daq_core::limits::{DEFAULT_DECODE_BURST_THRESHOLD, DEFAULT_QUEUE_CAPACITY};
use daq_core::DaqError;
use daq_storage::CacheMode;
use figment::{providers::Serialized, Figment, Provider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/sync.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DAQSYNC_";

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_burst_threshold() -> u32 {
    DEFAULT_DECODE_BURST_THRESHOLD
}

fn default_frame_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One metadata channel and its association policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name, as used by metadata publishers.
    pub name: String,
    /// Accepted timestamp difference, seconds.
    #[serde(default)]
    pub tolerance_s: f64,
    /// Added to value timestamps before comparing, seconds.
    #[serde(default)]
    pub offset_s: f64,
}

impl ChannelConfig {
    /// Channel with a tolerance and no offset.
    pub fn new(name: impl Into<String>, tolerance_s: f64) -> Self {
        Self {
            name: name.into(),
            tolerance_s,
            offset_s: 0.0,
        }
    }

    /// Set the timestamp offset.
    #[must_use]
    pub fn with_offset(mut self, offset_s: f64) -> Self {
        self.offset_s = offset_s;
        self
    }

    /// Association policy for this channel.
    pub fn policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            tolerance: self.tolerance_s,
            offset: self.offset_s,
        }
    }
}

/// Everything needed to build a [`crate::SyncPipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-channel metadata queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Consecutive decode failures reported as one burst.
    #[serde(default = "default_burst_threshold")]
    pub decode_burst_threshold: u32,
    /// Bounded frame channel of the stream runner.
    #[serde(default = "default_frame_channel_capacity")]
    pub frame_channel_capacity: usize,
    /// Metadata channels; the gate channel of scan mode must be one of them.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Cache topology.
    #[serde(default)]
    pub cache: CacheMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            decode_burst_threshold: DEFAULT_DECODE_BURST_THRESHOLD,
            frame_channel_capacity: default_frame_channel_capacity(),
            channels: Vec::new(),
            cache: CacheMode::default(),
        }
    }
}

impl Provider for SyncConfig {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Sync Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(SyncConfig::default()).data()
    }
}

impl SyncConfig {
    /// Configuration with the given channels and cache mode, defaults elsewhere.
    pub fn new(channels: Vec<ChannelConfig>, cache: CacheMode) -> Self {
        Self {
            channels,
            cache,
            ..Self::default()
        }
    }

    /// Load defaults, then the TOML file, then `DAQSYNC_` environment variables.
    ///
    /// `config_path` defaults to [`DEFAULT_CONFIG_PATH`].
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        use figment::providers::{Env, Format, Toml};

        let mut figment = Figment::from(SyncConfig::default());

        let file_path = config_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
        if file_path.exists() {
            figment = figment.merge(Toml::file(&file_path));
        } else {
            eprintln!(
                "⚠️  Config file not found: {}. Using defaults.",
                file_path.display()
            );
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: SyncConfig = figment
            .extract()
            .context("Failed to extract configuration from Figment")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Parse and validate a TOML document, without file or environment layers.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        use figment::providers::{Format, Toml};

        let config: SyncConfig = Figment::from(SyncConfig::default())
            .merge(Toml::string(source))
            .extract()
            .context("Failed to parse configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Render as TOML, e.g. to write a starter file.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Association policy per channel, in configuration order.
    pub fn channel_policies(&self) -> Vec<(String, ChannelPolicy)> {
        self.channels
            .iter()
            .map(|c| (c.name.clone(), c.policy()))
            .collect()
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), DaqError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "invalid log level: {}",
                self.log_level
            )));
        }
        if self.queue_capacity == 0 {
            return Err(DaqError::Configuration(
                "queue_capacity must be > 0".into(),
            ));
        }
        if self.decode_burst_threshold == 0 {
            return Err(DaqError::Configuration(
                "decode_burst_threshold must be > 0".into(),
            ));
        }
        if self.frame_channel_capacity == 0 {
            return Err(DaqError::Configuration(
                "frame_channel_capacity must be > 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(DaqError::Configuration(
                    "channel name cannot be empty".into(),
                ));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "duplicate channel: {}",
                    channel.name
                )));
            }
            if !channel.tolerance_s.is_finite() || channel.tolerance_s < 0.0 {
                return Err(DaqError::Configuration(format!(
                    "channel '{}' tolerance_s must be finite and >= 0",
                    channel.name
                )));
            }
            if !channel.offset_s.is_finite() {
                return Err(DaqError::Configuration(format!(
                    "channel '{}' offset_s must be finite",
                    channel.name
                )));
            }
        }

        self.cache.validate()?;
        if let Some(gate) = self.cache.gate_channel() {
            if !seen.contains(gate) {
                return Err(DaqError::Configuration(format!(
                    "gate channel '{gate}' is not a configured channel"
                )));
            }
        }
        Ok(())
    }
}
