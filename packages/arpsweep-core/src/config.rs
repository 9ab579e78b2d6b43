//! Scan configuration from defaults, environment and command line.

use crate::scanner::{DispatchOptions, ScanError};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default probe program on Unix-like platforms
pub const DEFAULT_ARPING_PROGRAM: &str = "arping";

/// Default probe program on Windows
pub const DEFAULT_NPING_PROGRAM: &str = "nping";

/// Environment variable capping the number of probes in flight
pub const ENV_MAX_CONCURRENCY: &str = "ARPSWEEP_MAX_CONCURRENCY";

/// Environment variable setting the per-probe deadline in milliseconds
pub const ENV_PROBE_TIMEOUT_MS: &str = "ARPSWEEP_PROBE_TIMEOUT_MS";

/// Environment variable overriding the arping program
pub const ENV_ARPING: &str = "ARPSWEEP_ARPING";

/// Environment variable overriding the nping program
pub const ENV_NPING: &str = "ARPSWEEP_NPING";

/// Runtime scan configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Maximum number of probes in flight; `None` launches every probe at once
    pub max_concurrency: Option<usize>,
    /// Deadline per probe; `None` waits for the tool indefinitely
    pub probe_timeout: Option<Duration>,
    pub arping_program: String,
    pub nping_program: String,
    /// Source of the configuration (for logging)
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Using default values
    Default,
    /// At least one value came from an environment variable
    Environment,
    /// At least one value came from a command-line flag
    CommandLine,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::CommandLine => write!(f, "command line"),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            probe_timeout: None,
            arping_program: DEFAULT_ARPING_PROGRAM.to_string(),
            nping_program: DEFAULT_NPING_PROGRAM.to_string(),
            source: ConfigSource::Default,
        }
    }
}

impl ScanConfig {
    /// Load configuration with priority:
    /// 1. Environment variables (ARPSWEEP_*)
    /// 2. Default values
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ScanConfig::from_env`] with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = value(ENV_MAX_CONCURRENCY) {
            match raw.parse::<usize>() {
                Ok(limit) => {
                    tracing::info!("Using max concurrency from environment variable: {}", limit);
                    config.max_concurrency = Some(limit);
                    config.source = ConfigSource::Environment;
                }
                Err(e) => tracing::warn!("Ignoring {}={:?}: {}", ENV_MAX_CONCURRENCY, raw, e),
            }
        }

        if let Some(raw) = value(ENV_PROBE_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Using probe timeout from environment variable: {}ms", ms);
                    config.probe_timeout = Some(Duration::from_millis(ms));
                    config.source = ConfigSource::Environment;
                }
                Err(e) => tracing::warn!("Ignoring {}={:?}: {}", ENV_PROBE_TIMEOUT_MS, raw, e),
            }
        }

        if let Some(program) = value(ENV_ARPING) {
            tracing::info!("Using arping program from environment variable: {}", program);
            config.arping_program = program;
            config.source = ConfigSource::Environment;
        }

        if let Some(program) = value(ENV_NPING) {
            tracing::info!("Using nping program from environment variable: {}", program);
            config.nping_program = program;
            config.source = ConfigSource::Environment;
        }

        config
    }

    /// Apply command-line flags on top of the loaded configuration.
    pub fn with_overrides(mut self, max_concurrency: Option<usize>, probe_timeout_ms: Option<u64>) -> Self {
        if let Some(limit) = max_concurrency {
            self.max_concurrency = Some(limit);
            self.source = ConfigSource::CommandLine;
        }
        if let Some(ms) = probe_timeout_ms {
            self.probe_timeout = Some(Duration::from_millis(ms));
            self.source = ConfigSource::CommandLine;
        }
        self
    }

    /// Reject values that would stall a scan.
    pub fn validate(&self) -> Result<(), ScanError> {
        match self.max_concurrency {
            Some(0) => {
                return Err(ScanError::InvalidConfig(
                    "max concurrency must be at least 1".to_string(),
                ));
            }
            Some(limit) if limit > Semaphore::MAX_PERMITS => {
                return Err(ScanError::InvalidConfig(format!(
                    "max concurrency must be at most {}",
                    Semaphore::MAX_PERMITS
                )));
            }
            _ => {}
        }
        if self.probe_timeout == Some(Duration::ZERO) {
            return Err(ScanError::InvalidConfig(
                "probe timeout must be greater than 0ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            max_concurrency: self.max_concurrency,
            probe_timeout: self.probe_timeout,
        }
    }
}

/// Environment variables understood by [`ScanConfig::from_env`], with a short
/// description each
pub fn environment_variables() -> [(&'static str, &'static str); 4] {
    [
        (ENV_MAX_CONCURRENCY, "Maximum probes in flight (default: unbounded)"),
        (ENV_PROBE_TIMEOUT_MS, "Per-probe deadline in milliseconds (default: none)"),
        (ENV_ARPING, "arping program used on Unix (default: arping)"),
        (ENV_NPING, "nping program used on Windows (default: nping)"),
    ]
}
