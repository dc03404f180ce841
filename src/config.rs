//! Screener configuration.
//!
//! Loaded once at startup from a TOML file. Every section has defaults, so an
//! absent file (or an absent section) yields the reference behaviour.
//! [`ScreenerConfig::validate`] is the startup gate: anything it rejects would
//! otherwise surface as a silently wrong ranking mid-cycle.

use crate::oracle::types::{ScoreThresholds, SocialPoints};
use crate::oracle::weights::{default_weight_map, Weights};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Tolerance for the "weights sum to 1.0" operator contract.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Configuration validation failures. All of them are fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown score component '{0}' in weights")]
    UnknownWeight(String),
    #[error("weight for score component '{0}' is missing")]
    MissingWeight(String),
    #[error("weight for '{name}' must be a non-negative number, got {value}")]
    InvalidWeight { name: String, value: f64 },
    #[error("weights sum to zero")]
    ZeroWeights,
    #[error("invalid range for '{metric}': low={low}, high={high} (need 0 < low <= high)")]
    InvalidRange { metric: String, low: f64, high: f64 },
    #[error("invalid threshold '{name}': {reason}")]
    InvalidThreshold { name: String, reason: String },
    #[error("social points must keep twitter > website > discord ~ telegram: {0}")]
    SocialOrdering(String),
    #[error("invalid dedup settings: {0}")]
    InvalidDedup(String),
    #[error("invalid screening settings: {0}")]
    InvalidScreening(String),
}

/// Where the dedup store persists its entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

/// Deduplication store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub backend: StateBackend,
    /// JSON state file (json backend)
    pub state_path: PathBuf,
    /// SQLite database file (sqlite backend)
    pub sqlite_path: PathBuf,
    pub ttl_hours: u64,
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Json,
            state_path: PathBuf::from("data/state.json"),
            sqlite_path: PathBuf::from("data/state.db"),
            ttl_hours: 24,
            max_entries: 1000,
        }
    }
}

/// Candidate filtering and selection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub top_n: usize,
    pub min_liquidity_usd: f64,
    pub min_volume_24h_usd: f64,
    /// Never surface candidates whose safety report says danger
    pub danger_auto_exclude: bool,
    /// Send a separate graduation batch for graduated candidates
    pub notify_graduations: bool,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            min_liquidity_usd: 1_000.0,
            min_volume_24h_usd: 500.0,
            danger_auto_exclude: true,
            notify_graduations: true,
        }
    }
}

/// Cycle runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_minutes: u64,
    /// Candidate snapshot written by the fetch layer
    pub feed_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            feed_path: PathBuf::from("data/feed.json"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    /// Component name -> weight. Must name every component exactly once.
    pub weights: HashMap<String, f64>,
    /// Rescale weights to sum 1.0 instead of using them verbatim
    pub normalize_weights: bool,
    pub thresholds: ScoreThresholds,
    pub social_points: SocialPoints,
    pub dedup: DedupConfig,
    pub screening: ScreeningConfig,
    pub monitor: MonitorConfig,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            weights: default_weight_map(),
            normalize_weights: false,
            thresholds: ScoreThresholds::default(),
            social_points: SocialPoints::default(),
            dedup: DedupConfig::default(),
            screening: ScreeningConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ScreenerConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Check every setting and build the weight table used for scoring.
    pub fn validate(&self) -> Result<Weights, ConfigError> {
        let mut weights = Weights::from_map(&self.weights)?;
        let sum = weights.sum();
        if self.normalize_weights {
            weights = weights.normalized()?;
            info!("Normalized weights (configured sum {:.3})", sum);
        } else if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            warn!(
                "Weights sum to {:.3}, not 1.0; using them verbatim (set normalize_weights = true to rescale)",
                sum
            );
        }

        validate_thresholds(&self.thresholds)?;
        validate_social_points(&self.social_points)?;

        if self.dedup.ttl_hours == 0 {
            return Err(ConfigError::InvalidDedup("ttl_hours must be at least 1".into()));
        }
        if self.dedup.max_entries < 2 {
            return Err(ConfigError::InvalidDedup("max_entries must be at least 2".into()));
        }
        if self.screening.top_n == 0 {
            return Err(ConfigError::InvalidScreening("top_n must be at least 1".into()));
        }
        if !(self.screening.min_liquidity_usd >= 0.0) || !(self.screening.min_volume_24h_usd >= 0.0) {
            return Err(ConfigError::InvalidScreening(
                "minimum liquidity/volume must be non-negative".into(),
            ));
        }

        Ok(weights)
    }
}

fn validate_thresholds(t: &ScoreThresholds) -> Result<(), ConfigError> {
    for (metric, range) in [
        ("liquidity", t.liquidity),
        ("volume", t.volume),
        ("tx_count", t.tx_count),
        ("makers", t.makers),
    ] {
        if !(range.low > 0.0) || !(range.high >= range.low) || !range.high.is_finite() {
            return Err(ConfigError::InvalidRange {
                metric: metric.to_string(),
                low: range.low,
                high: range.high,
            });
        }
    }

    if !(t.lp_locked_partial_pct <= t.lp_locked_full_pct) {
        return Err(ConfigError::InvalidThreshold {
            name: "lp_locked_partial_pct".into(),
            reason: "must not exceed lp_locked_full_pct".into(),
        });
    }
    if !(t.holders_low_pct < t.holders_high_pct) {
        return Err(ConfigError::InvalidThreshold {
            name: "holders_low_pct".into(),
            reason: "must be below holders_high_pct".into(),
        });
    }
    if t.insider_danger_count == 0 {
        return Err(ConfigError::InvalidThreshold {
            name: "insider_danger_count".into(),
            reason: "must be at least 1".into(),
        });
    }
    if t.rugcheck_low >= t.rugcheck_high {
        return Err(ConfigError::InvalidThreshold {
            name: "rugcheck_low".into(),
            reason: "must be below rugcheck_high".into(),
        });
    }
    Ok(())
}

fn validate_social_points(p: &SocialPoints) -> Result<(), ConfigError> {
    let all = [p.twitter, p.website, p.discord, p.telegram];
    if all.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
        return Err(ConfigError::SocialOrdering("points must be non-negative".into()));
    }
    if !(p.twitter > p.website) {
        return Err(ConfigError::SocialOrdering(format!(
            "twitter ({}) must exceed website ({})",
            p.twitter, p.website
        )));
    }
    if !(p.website > p.discord.max(p.telegram)) {
        return Err(ConfigError::SocialOrdering(format!(
            "website ({}) must exceed discord ({}) and telegram ({})",
            p.website, p.discord, p.telegram
        )));
    }
    if (p.discord - p.telegram).abs() > 5.0 {
        return Err(ConfigError::SocialOrdering(format!(
            "discord ({}) and telegram ({}) must be within 5 points",
            p.discord, p.telegram
        )));
    }
    Ok(())
}
