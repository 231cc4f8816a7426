//! Runtime configuration for an lmtlss state directory.
//!
//! Loaded from `<state_dir>/config.toml`, layered over built-in defaults.
//! Every field is optional in the file; anything omitted falls back to the
//! default implementations below.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub capsule: CapsuleConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decay: DecayConfig::default(),
            capsule: CapsuleConfig::default(),
            cron: CronConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

/// The `(name, role)` pair woven into every Identity Digest envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_name")]
    pub name: String,
    #[serde(default = "default_identity_role")]
    pub role: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            role: default_identity_role(),
        }
    }
}

/// Per-tick decay rates applied to a node's weight vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default = "default_lambda_salience")]
    pub lambda_salience: f64,
    #[serde(default = "default_lambda_arousal")]
    pub lambda_arousal: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            lambda_salience: default_lambda_salience(),
            lambda_arousal: default_lambda_arousal(),
        }
    }
}

/// Capsule rendering limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            top_n: default_top_n(),
        }
    }
}

/// Cadences for the periodic autonomics jobs, in seconds, plus the
/// daily-maintenance wall-clock hour (UTC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_goal_check_secs")]
    pub goal_check_secs: u64,
    #[serde(default = "default_scraper_secs")]
    pub scraper_secs: u64,
    #[serde(default = "default_reflection_secs")]
    pub reflection_secs: u64,
    #[serde(default = "default_daily_maintenance_hour_utc")]
    pub daily_maintenance_hour_utc: u32,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            goal_check_secs: default_goal_check_secs(),
            scraper_secs: default_scraper_secs(),
            reflection_secs: default_reflection_secs(),
            daily_maintenance_hour_utc: default_daily_maintenance_hour_utc(),
        }
    }
}

/// Load `<state_dir>/config.toml`, or return defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::ParseFailed`] if the file exists but is not valid
/// TOML for this schema.
pub fn load_config(state_dir: &Path) -> Result<Config, ConfigError> {
    let path = state_dir.join("config.toml");
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ParseFailed {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    toml::from_str::<Config>(&content).map_err(|e| ConfigError::ParseFailed {
        path,
        reason: e.to_string(),
    })
}

const fn default_lambda_salience() -> f64 {
    0.01
}

const fn default_lambda_arousal() -> f64 {
    0.02
}

const fn default_max_chars() -> usize {
    8000
}

const fn default_top_n() -> usize {
    100
}

const fn default_heartbeat_secs() -> u64 {
    5 * 60
}

const fn default_goal_check_secs() -> u64 {
    10 * 60
}

const fn default_scraper_secs() -> u64 {
    15 * 60
}

const fn default_reflection_secs() -> u64 {
    30 * 60
}

const fn default_daily_maintenance_hour_utc() -> u32 {
    3
}

fn default_identity_name() -> String {
    "lmtlss".to_string()
}

fn default_identity_role() -> String {
    "companion".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("lmtlss-config-test-{label}-{id}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("temp dir must be created");
        dir
    }

    #[test]
    fn missing_config_uses_defaults() {
        let dir = make_temp_dir("missing");
        let cfg = load_config(&dir).expect("load should succeed");
        assert!((cfg.decay.lambda_salience - 0.01).abs() < f64::EPSILON);
        assert!((cfg.decay.lambda_arousal - 0.02).abs() < f64::EPSILON);
        assert_eq!(cfg.capsule.max_chars, 8000);
        assert_eq!(cfg.capsule.top_n, 100);
        assert_eq!(cfg.cron.heartbeat_secs, 300);
        assert_eq!(cfg.cron.daily_maintenance_hour_utc, 3);
        assert_eq!(cfg.identity.name, "lmtlss");
        assert_eq!(cfg.identity.role, "companion");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = make_temp_dir("partial");
        std::fs::write(
            dir.join("config.toml"),
            "[capsule]\nmax_chars = 4000\n",
        )
        .expect("write config");
        let cfg = load_config(&dir).expect("load should succeed");
        assert_eq!(cfg.capsule.max_chars, 4000);
        assert_eq!(cfg.capsule.top_n, 100);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_config_errors() {
        let dir = make_temp_dir("malformed");
        std::fs::write(dir.join("config.toml"), "not = [valid toml").expect("write config");
        let err = load_config(&dir).expect_err("must error");
        assert_eq!(err.error_code(), "E1001");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
