use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use multipeer_core::{MultipeerError, Result};

use crate::schema::{DuplicatePolicy, MultipeerConfig};

/// Loads and reloads the multipeer configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<MultipeerConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > MULTIPEER_CONFIG env > <config dir>/multipeer/multipeer.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        Self::resolve_path_with(explicit, |key| std::env::var(key).ok())
    }

    /// [`resolve_path`](Self::resolve_path) with a caller-supplied variable lookup.
    pub fn resolve_path_with<F>(explicit: Option<&Path>, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Some(p) = lookup("MULTIPEER_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("multipeer")
            .join("multipeer.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            MultipeerConfig::default()
        };

        let config = Self::finish(config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Build a loader from an in-memory TOML document. `reload()` is unavailable
    /// unless a file exists at the resolved default path.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config_path = Self::resolve_path(None);
        let config = Self::parse(raw, Path::new("<inline>"))?;
        let config = Self::finish(config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> MultipeerConfig {
        self.config.read().clone()
    }

    /// Get a shared handle to the live config.
    pub fn shared(&self) -> Arc<RwLock<MultipeerConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(MultipeerError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = Self::finish(Self::parse(&raw, &self.config_path)?)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn parse(raw: &str, origin: &Path) -> Result<MultipeerConfig> {
        toml::from_str::<MultipeerConfig>(raw).map_err(|e| {
            MultipeerError::Config(format!("failed to parse {}: {}", origin.display(), e))
        })
    }

    /// Apply env overrides, then validate: log warnings, fail on errors.
    fn finish(config: MultipeerConfig) -> Result<MultipeerConfig> {
        let config = Self::apply_env_overrides(config);
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(MultipeerError::Config(e)),
        }
        Ok(config)
    }

    /// Apply env var overrides (MULTIPEER_EVENT_PREFIX, MULTIPEER_LOG_LEVEL, etc.)
    fn apply_env_overrides(config: MultipeerConfig) -> MultipeerConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`. Unparseable capacity or policy
    /// values are logged and ignored.
    pub fn apply_overrides<F>(mut config: MultipeerConfig, lookup: F) -> MultipeerConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MULTIPEER_EVENT_PREFIX") {
            config.relay.event_prefix = v;
        }
        if let Some(v) = lookup("MULTIPEER_EVENT_CAPACITY") {
            match v.parse::<usize>() {
                Ok(capacity) => config.relay.event_capacity = capacity,
                Err(e) => warn!(value = %v, error = %e, "ignoring invalid MULTIPEER_EVENT_CAPACITY"),
            }
        }
        if let Some(v) = lookup("MULTIPEER_DUPLICATE_DISCOVERY") {
            match v.parse::<DuplicatePolicy>() {
                Ok(policy) => config.relay.duplicate_discovery = policy,
                Err(e) => warn!(error = %e, "ignoring invalid MULTIPEER_DUPLICATE_DISCOVERY"),
            }
        }
        if let Some(v) = lookup("MULTIPEER_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("MULTIPEER_LOG_FORMAT") {
            config.logging.format = v;
        }
        config
    }
}
