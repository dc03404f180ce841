//! Core types and data structures for the screening pipeline.
//!
//! Candidates arrive from the market data provider, safety and smart money
//! reports from their own providers. All three are read leniently: a missing or
//! malformed field never fails deserialization, it degrades to a neutral value.

use crate::oracle::types::ScoreBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token address (base58 string, already canonical).
pub type Pubkey = String;

/// A token, NFT mint or airdrop record discovered in one monitoring cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Candidate {
    /// Token address, used as the dedup identity for token events
    #[serde(deserialize_with = "lenient::string")]
    pub token_address: Pubkey,
    #[serde(deserialize_with = "lenient::string")]
    pub pair_address: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub symbol: String,
    /// DEX the pair trades on (e.g. "raydium", "pumpswap")
    #[serde(deserialize_with = "lenient::string")]
    pub dex: String,

    #[serde(deserialize_with = "lenient::f64")]
    pub liquidity_usd: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub volume_24h_usd: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub price_change_24h: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub tx_count_24h: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub makers_24h: f64,

    /// Pair creation time, UTC. RFC 3339 or epoch seconds/milliseconds on the wire.
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub website_url: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub twitter_handle: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub discord_url: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub telegram_url: Option<String>,

    /// Migrated from a bonding-curve launch to a full DEX listing
    #[serde(deserialize_with = "lenient::bool")]
    pub is_graduated: bool,
    #[serde(deserialize_with = "lenient::string")]
    pub graduation_source: String,

    /// Component breakdown attached by the scorer
    #[serde(skip_deserializing)]
    pub scores: Option<ScoreBreakdown>,
    /// Final score attached by the scorer (0-100)
    #[serde(skip_deserializing)]
    pub total_score: f64,
}

/// Which social links a candidate advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocialLinks {
    pub twitter: bool,
    pub website: bool,
    pub discord: bool,
    pub telegram: bool,
}

impl Candidate {
    /// Create a bare candidate with only an address and symbol.
    pub fn new(token_address: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            token_address: token_address.into(),
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Identity used for dedup in the token namespace.
    pub fn identity(&self) -> &str {
        &self.token_address
    }

    /// Label stored alongside the dedup entry.
    pub fn label(&self) -> &str {
        if !self.symbol.is_empty() {
            &self.symbol
        } else if !self.name.is_empty() {
            &self.name
        } else {
            &self.token_address
        }
    }

    pub fn social_links(&self) -> SocialLinks {
        SocialLinks {
            twitter: present(&self.twitter_handle),
            website: present(&self.website_url),
            discord: present(&self.discord_url),
            telegram: present(&self.telegram_url),
        }
    }
}

fn present(link: &Option<String>) -> bool {
    link.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// Overall risk verdict from the safety provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Mint or freeze authority of a token.
///
/// Providers report a renounced authority as the literal string `"None"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Authority {
    /// Not reported
    #[default]
    Unknown,
    Renounced,
    Active(String),
}

impl Authority {
    pub fn is_renounced(&self) -> bool {
        matches!(self, Authority::Renounced)
    }
}

impl From<Option<String>> for Authority {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Authority::Unknown,
            Some(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                    Authority::Renounced
                } else {
                    Authority::Active(trimmed.to_string())
                }
            }
        }
    }
}

impl From<Authority> for Option<String> {
    fn from(value: Authority) -> Self {
        match value {
            Authority::Unknown => None,
            Authority::Renounced => Some("None".to_string()),
            Authority::Active(address) => Some(address),
        }
    }
}

/// Safety report for a token. Every field is optional; an empty JSON object is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyReport {
    #[serde(deserialize_with = "lenient::risk_level")]
    pub risk_level: RiskLevel,
    /// Share of LP tokens locked or burned (0-100)
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub lp_locked_pct: Option<f64>,
    #[serde(deserialize_with = "lenient::authority")]
    pub mint_authority: Authority,
    #[serde(deserialize_with = "lenient::authority")]
    pub freeze_authority: Authority,
    /// Sum of the top-10 holders' share (0-100)
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub top_holders_pct: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_u32")]
    pub insider_count: Option<u32>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub rugcheck_score: Option<i64>,
    /// Provider warnings, passed through for rendering
    #[serde(deserialize_with = "lenient::records")]
    pub warnings: Vec<String>,
}

/// A known profitable wallet found among a token's holders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotableWallet {
    #[serde(deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(deserialize_with = "lenient::string")]
    pub label: String,
    #[serde(deserialize_with = "lenient::f64")]
    pub pct: f64,
    #[serde(deserialize_with = "lenient::bool")]
    pub is_insider: bool,
}

/// Smart money involvement for a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartMoneyReport {
    /// 0-100
    #[serde(deserialize_with = "lenient::f64")]
    pub smart_money_score: f64,
    #[serde(deserialize_with = "lenient::u32")]
    pub whale_count: u32,
    #[serde(deserialize_with = "lenient::records")]
    pub notable_wallets: Vec<NotableWallet>,
    #[serde(deserialize_with = "lenient::f64")]
    pub holder_concentration: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub details: String,
}

/// Deserializers that coerce junk to a neutral value instead of failing the whole record.
pub(crate) mod lenient {
    use super::{Authority, RiskLevel};
    use chrono::{DateTime, Utc};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::HashMap;
    use tracing::{debug, warn};

    /// Epoch timestamps at or above this magnitude are milliseconds.
    const EPOCH_MILLIS_THRESHOLD: u64 = 100_000_000_000;

    fn value<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null))
    }

    pub fn f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_f64(deserializer)?.unwrap_or(0.0))
    }

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match value(deserializer)? {
            Value::Null => None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) => match s.trim().replace(',', "").parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    debug!("Non-numeric metric {:?} coerced to 0", s);
                    Some(0.0)
                }
            },
            other => {
                debug!("Unexpected metric value {} coerced to 0", other);
                Some(0.0)
            }
        })
    }

    /// Integer from a number or numeric string, floats rounded.
    fn integer(value: &Value) -> Option<i64> {
        let number = match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => return Some(i),
                None => n.as_f64(),
            },
            Value::String(s) => {
                let s = s.trim().replace(',', "");
                match s.parse::<i64>() {
                    Ok(i) => return Some(i),
                    Err(_) => s.parse::<f64>().ok(),
                }
            }
            _ => None,
        };
        // `as` saturates at the i64 bounds
        number.filter(|v| v.is_finite()).map(|v| v.round() as i64)
    }

    pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = value(deserializer)?;
        let parsed = integer(&raw);
        if parsed.is_none() && !raw.is_null() {
            debug!("Unreadable integer {} treated as not reported", raw);
        }
        Ok(parsed)
    }

    /// Negative counts are treated as not reported.
    pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match opt_i64(deserializer)? {
            Some(v) if v < 0 => {
                debug!("Negative count {} treated as not reported", v);
                None
            }
            Some(v) => Some(u32::try_from(v).unwrap_or(u32::MAX)),
            None => None,
        })
    }

    pub fn u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_u32(deserializer)?.unwrap_or(0))
    }

    pub fn bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match value(deserializer)? {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            other => {
                debug!("Unexpected flag value {} read as false", other);
                false
            }
        })
    }

    fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
        if raw.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(raw)
        } else {
            DateTime::from_timestamp(raw, 0)
        }
    }

    /// RFC 3339 strings, or epoch seconds/milliseconds as numbers or numeric strings.
    pub fn opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = value(deserializer)?;
        let parsed = match &raw {
            Value::Null => return Ok(None),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| integer(&raw).and_then(from_epoch)),
            Value::Number(_) => integer(&raw).and_then(from_epoch),
            _ => None,
        };
        if parsed.is_none() {
            debug!("Unreadable timestamp {} treated as unknown", raw);
        }
        Ok(parsed)
    }

    pub fn risk_level<'de, D>(deserializer: D) -> Result<RiskLevel, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match value(deserializer)? {
            Value::Null => RiskLevel::Unknown,
            Value::String(s) => {
                RiskLevel::deserialize(Value::String(s.trim().to_ascii_lowercase()))
                    .unwrap_or_default()
            }
            other => {
                debug!("Unexpected risk level {} read as unknown", other);
                RiskLevel::Unknown
            }
        })
    }

    pub fn authority<'de, D>(deserializer: D) -> Result<Authority, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match value(deserializer)? {
            Value::Null => Authority::Unknown,
            Value::String(s) => Authority::from(Some(s)),
            other => {
                debug!("Unexpected authority {} read as unknown", other);
                Authority::Unknown
            }
        })
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match value(deserializer)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => {
                debug!("Unexpected text value {} dropped", other);
                None
            }
        })
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_string(deserializer)?.unwrap_or_default())
    }

    /// Parse each element on its own, skipping the ones that do not fit `T`.
    pub fn records_from<T: DeserializeOwned>(raw: Value) -> Vec<T> {
        let items = match raw {
            Value::Array(items) => items,
            Value::Null => return Vec::new(),
            other => {
                warn!("Expected a list, got {}", other);
                return Vec::new();
            }
        };
        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable record: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Keyed counterpart of [`records_from`].
    pub fn record_map_from<T: DeserializeOwned>(raw: Value) -> HashMap<String, T> {
        let items = match raw {
            Value::Object(items) => items,
            Value::Null => return HashMap::new(),
            other => {
                warn!("Expected a keyed map, got {}", other);
                return HashMap::new();
            }
        };
        items
            .into_iter()
            .filter_map(|(key, item)| match serde_json::from_value(item) {
                Ok(record) => Some((key, record)),
                Err(e) => {
                    warn!("Skipping unreadable record {:?}: {}", key, e);
                    None
                }
            })
            .collect()
    }

    pub fn records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(records_from(value(deserializer)?))
    }

    pub fn record_map<'de, D, T>(deserializer: D) -> Result<HashMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(record_map_from(value(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_tolerates_malformed_metrics() {
        let json = r#"{
            "token_address": "So1abc",
            "symbol": "ABC",
            "liquidity_usd": "12,500.5",
            "volume_24h_usd": "n/a",
            "price_change_24h": null,
            "tx_count_24h": [1, 2],
            "twitter_handle": "abc_sol"
        }"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();

        assert_eq!(candidate.liquidity_usd, 12_500.5);
        assert_eq!(candidate.volume_24h_usd, 0.0);
        assert_eq!(candidate.price_change_24h, 0.0);
        assert_eq!(candidate.tx_count_24h, 0.0);
        assert_eq!(candidate.makers_24h, 0.0);
        assert!(candidate.created_at.is_none());
        assert!(candidate.social_links().twitter);
        assert!(!candidate.social_links().website);
    }

    #[test]
    fn test_blank_links_are_absent() {
        let mut candidate = Candidate::new("addr", "SYM");
        candidate.website_url = Some("   ".to_string());
        assert!(!candidate.social_links().website);
    }

    #[test]
    fn test_empty_safety_report() {
        let report: SafetyReport = serde_json::from_str("{}").unwrap();
        assert_eq!(report, SafetyReport::default());
        assert_eq!(report.risk_level, RiskLevel::Unknown);
        assert_eq!(report.mint_authority, Authority::Unknown);
    }

    #[test]
    fn test_authority_literal_none_is_renounced() {
        let report: SafetyReport = serde_json::from_str(
            r#"{"risk_level": "safe", "mint_authority": "None", "freeze_authority": "7xKX", "lp_locked_pct": "95"}"#,
        )
        .unwrap();

        assert_eq!(report.risk_level, RiskLevel::Safe);
        assert!(report.mint_authority.is_renounced());
        assert_eq!(report.freeze_authority, Authority::Active("7xKX".to_string()));
        assert_eq!(report.lp_locked_pct, Some(95.0));

        let round_trip = serde_json::to_value(&report).unwrap();
        assert_eq!(round_trip["mint_authority"], "None");
    }

    #[test]
    fn test_unrecognised_risk_level() {
        let report: SafetyReport = serde_json::from_str(r#"{"risk_level": "critical"}"#).unwrap();
        assert_eq!(report.risk_level, RiskLevel::Unknown);
    }

    #[test]
    fn test_null_and_junk_counts() {
        let report: SmartMoneyReport =
            serde_json::from_str(r#"{"whale_count": null, "notable_wallets": null}"#).unwrap();
        assert_eq!(report.whale_count, 0);
        assert!(report.notable_wallets.is_empty());

        let report: SmartMoneyReport = serde_json::from_str(r#"{"whale_count": "3"}"#).unwrap();
        assert_eq!(report.whale_count, 3);
        let report: SmartMoneyReport = serde_json::from_str(r#"{"whale_count": -4}"#).unwrap();
        assert_eq!(report.whale_count, 0);
    }

    #[test]
    fn test_insider_count_coercion() {
        let read = |json: &str| serde_json::from_str::<SafetyReport>(json).unwrap().insider_count;
        assert_eq!(read(r#"{"insider_count": -1}"#), None);
        assert_eq!(read(r#"{"insider_count": "2"}"#), Some(2));
        assert_eq!(read(r#"{"insider_count": 2.6}"#), Some(3));
        assert_eq!(read(r#"{"insider_count": null}"#), None);
        assert_eq!(read(r#"{"insider_count": "lots"}"#), None);
        assert_eq!(read(r#"{"insider_count": 1e12}"#), Some(u32::MAX));
    }

    #[test]
    fn test_rugcheck_score_coercion() {
        let read = |json: &str| serde_json::from_str::<SafetyReport>(json).unwrap().rugcheck_score;
        assert_eq!(read(r#"{"rugcheck_score": 512.5}"#), Some(513));
        assert_eq!(read(r#"{"rugcheck_score": "-40"}"#), Some(-40));
        assert_eq!(read(r#"{"rugcheck_score": true}"#), None);
    }

    #[test]
    fn test_null_risk_level_and_authority() {
        let report: SafetyReport = serde_json::from_str(
            r#"{"risk_level": null, "mint_authority": null, "freeze_authority": 42, "warnings": ["lp unlocked", 7]}"#,
        )
        .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Unknown);
        assert_eq!(report.mint_authority, Authority::Unknown);
        assert_eq!(report.freeze_authority, Authority::Unknown);
        assert_eq!(report.warnings, vec!["lp unlocked".to_string()]);

        let report: SafetyReport = serde_json::from_str(r#"{"risk_level": " DANGER "}"#).unwrap();
        assert_eq!(report.risk_level, RiskLevel::Danger);
        let report: SafetyReport = serde_json::from_str(r#"{"risk_level": 3}"#).unwrap();
        assert_eq!(report.risk_level, RiskLevel::Unknown);
    }

    #[test]
    fn test_graduation_flag_coercion() {
        let read = |json: &str| serde_json::from_str::<Candidate>(json).unwrap().is_graduated;
        assert!(!read(r#"{"is_graduated": null}"#));
        assert!(read(r#"{"is_graduated": "true"}"#));
        assert!(read(r#"{"is_graduated": 1}"#));
        assert!(!read(r#"{"is_graduated": "no"}"#));
    }

    #[test]
    fn test_created_at_formats() {
        let read = |json: &str| serde_json::from_str::<Candidate>(json).unwrap().created_at;
        let expected = DateTime::from_timestamp(1_712_345_678, 0).unwrap();

        assert_eq!(read(r#"{"created_at": 1712345678000}"#), Some(expected));
        assert_eq!(read(r#"{"created_at": 1712345678}"#), Some(expected));
        assert_eq!(read(r#"{"created_at": "1712345678000"}"#), Some(expected));
        assert_eq!(read(r#"{"created_at": "2024-04-05T19:34:38Z"}"#), Some(expected));
        assert_eq!(read(r#"{"created_at": "2024-04-05T21:34:38+02:00"}"#), Some(expected));
        assert_eq!(read(r#"{"created_at": "yesterday"}"#), None);
        assert_eq!(read(r#"{"created_at": null}"#), None);
    }

    #[test]
    fn test_null_text_fields() {
        let candidate: Candidate = serde_json::from_str(
            r#"{"token_address": "So1abc", "symbol": null, "name": 42, "website_url": null, "dex": ["x"]}"#,
        )
        .unwrap();
        assert_eq!(candidate.symbol, "");
        assert_eq!(candidate.name, "42");
        assert_eq!(candidate.dex, "");
        assert!(candidate.website_url.is_none());
        assert_eq!(candidate.label(), "42");
    }

    #[test]
    fn test_label_fallbacks() {
        let mut candidate = Candidate::new("addr123", "");
        assert_eq!(candidate.label(), "addr123");
        candidate.name = "Some Token".to_string();
        assert_eq!(candidate.label(), "Some Token");
    }
}
