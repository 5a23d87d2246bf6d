//! flotilla.toml configuration parser.
//!
//! All fields are optional; accessors fall back to the built-in defaults.
//! Durations are strings like `"10s"`, `"5m"`, or `"1h"`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    pub scaler: Option<ScalerConfig>,
    pub lock: Option<LockConfig>,
    pub janitor: Option<JanitorConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalerConfig {
    /// Periodic scale-everything interval.
    pub interval: Option<String>,
    /// Debounce delay for on-demand scale runs after mutating operations.
    pub grace_period: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a held lock is honored before it may be stolen.
    pub expiry: Option<String>,
    /// How often the sweeper releases expired locks.
    pub sweep_interval: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// How long terminal jobs are kept before deletion.
    pub job_lifetime: Option<String>,
    /// How often the janitors run.
    pub interval: Option<String>,
}

impl ControlPlaneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ControlPlaneConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn scaler_interval(&self) -> Duration {
        duration_or(
            self.scaler.as_ref().and_then(|s| s.interval.as_deref()),
            Duration::from_secs(5 * 60),
        )
    }

    pub fn scale_grace_period(&self) -> Duration {
        duration_or(
            self.scaler.as_ref().and_then(|s| s.grace_period.as_deref()),
            Duration::from_secs(10),
        )
    }

    pub fn lock_expiry(&self) -> Duration {
        duration_or(
            self.lock.as_ref().and_then(|l| l.expiry.as_deref()),
            Duration::from_secs(5 * 60),
        )
    }

    pub fn lock_sweep_interval(&self) -> Duration {
        duration_or(
            self.lock.as_ref().and_then(|l| l.sweep_interval.as_deref()),
            Duration::from_secs(10 * 60),
        )
    }

    pub fn job_lifetime(&self) -> Duration {
        duration_or(
            self.janitor.as_ref().and_then(|j| j.job_lifetime.as_deref()),
            Duration::from_secs(60 * 60),
        )
    }

    pub fn janitor_interval(&self) -> Duration {
        duration_or(
            self.janitor.as_ref().and_then(|j| j.interval.as_deref()),
            Duration::from_secs(10 * 60),
        )
    }
}

/// Parse a duration string like "30s", "5m", "1h" into a `Duration`,
/// falling back to `default` for missing or malformed values.
fn duration_or(s: Option<&str>, default: Duration) -> Duration {
    let Some(s) = s else { return default };
    let s = s.trim();
    let parsed = if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_empty() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.scaler_interval(), Duration::from_secs(300));
        assert_eq!(config.scale_grace_period(), Duration::from_secs(10));
        assert_eq!(config.lock_expiry(), Duration::from_secs(300));
        assert_eq!(config.job_lifetime(), Duration::from_secs(3600));
        assert_eq!(config.janitor_interval(), Duration::from_secs(600));
    }

    #[test]
    fn parses_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[scaler]
interval = "1m"
grace_period = "5s"

[lock]
expiry = "30s"
sweep_interval = "2m"

[janitor]
job_lifetime = "2h"
interval = "15m"
"#
        )
        .unwrap();

        let config = ControlPlaneConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scaler_interval(), Duration::from_secs(60));
        assert_eq!(config.scale_grace_period(), Duration::from_secs(5));
        assert_eq!(config.lock_expiry(), Duration::from_secs(30));
        assert_eq!(config.lock_sweep_interval(), Duration::from_secs(120));
        assert_eq!(config.job_lifetime(), Duration::from_secs(7200));
        assert_eq!(config.janitor_interval(), Duration::from_secs(900));
    }

    #[test]
    fn malformed_duration_falls_back_to_default() {
        let config = ControlPlaneConfig {
            scaler: Some(ScalerConfig {
                interval: Some("soon".to_string()),
                grace_period: None,
            }),
            ..Default::default()
        };
        assert_eq!(config.scaler_interval(), Duration::from_secs(300));
    }

    #[test]
    fn bare_number_is_seconds() {
        let config = ControlPlaneConfig {
            scaler: Some(ScalerConfig {
                interval: Some("45".to_string()),
                grace_period: None,
            }),
            ..Default::default()
        };
        assert_eq!(config.scaler_interval(), Duration::from_secs(45));
    }
}
