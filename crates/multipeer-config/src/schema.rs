use serde::{Deserialize, Serialize};

/// Root configuration — maps to `multipeer.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipeerConfig {
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

// ── Relay ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Prefix of the platform event names, e.g. "RCTMultipeerConnectivity"
    /// yields "RCTMultipeerConnectivityPeerFound".
    pub event_prefix: String,
    /// Buffer size of the application event and lifecycle channels.
    pub event_capacity: usize,
    /// What to do when a discovery event names an already-known peer.
    pub duplicate_discovery: DuplicatePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            event_prefix: "RCTMultipeerConnectivity".into(),
            event_capacity: 1024,
            duplicate_discovery: DuplicatePolicy::Refresh,
        }
    }
}

/// Handling of a discovery event for an identifier that is already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Replace the metadata, keep lifecycle state, publish `peerFound` again.
    #[default]
    Refresh,
    /// Leave the existing entry untouched and publish nothing.
    Ignore,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refresh" => Ok(DuplicatePolicy::Refresh),
            "ignore" => Ok(DuplicatePolicy::Ignore),
            other => Err(format!("unknown duplicate discovery policy '{other}'")),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json", "compact"];

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl MultipeerConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all error messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        if self.relay.event_prefix.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "relay.event_prefix".into(),
                message: "event prefix is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'RCTMultipeerConnectivity'".into()),
            });
        }

        if self.relay.event_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "relay.event_capacity".into(),
                message: "event capacity is 0, no event could ever be buffered".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 1024".into()),
            });
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Use one of: {}", LOG_LEVELS.join(", "))),
            });
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}', falling back to pretty", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Use one of: {}", LOG_FORMATS.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| w.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(errors.join("; "));
        }

        Ok(warnings)
    }
}
