//! Core types and data structures for the scoring system.

use crate::types::{SafetyReport, SmartMoneyReport};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// Number of weighted components.
pub const COMPONENT_COUNT: usize = 8;

/// Weighted score components computed for every candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Pool liquidity in USD
    Liquidity,
    /// 24h volume in USD
    Volume,
    /// 24h price change percentage
    PriceChange,
    /// 24h transaction count
    TxCount,
    /// 24h unique makers
    Makers,
    /// Advertised social links
    Social,
    /// Safety report contents
    SafetyData,
    /// Time since pair creation
    Age,
}

impl Component {
    /// Config key for the component.
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Liquidity => "liquidity",
            Component::Volume => "volume",
            Component::PriceChange => "price_change",
            Component::TxCount => "tx_count",
            Component::Makers => "makers",
            Component::Social => "social",
            Component::SafetyData => "safety_data",
            Component::Age => "age",
        }
    }

    pub fn from_name(name: &str) -> Option<Component> {
        Component::all().into_iter().find(|c| c.as_str() == name)
    }

    /// Returns all components in breakdown order.
    pub fn all() -> [Component; COMPONENT_COUNT] {
        [
            Component::Liquidity,
            Component::Volume,
            Component::PriceChange,
            Component::TxCount,
            Component::Makers,
            Component::Social,
            Component::SafetyData,
            Component::Age,
        ]
    }
}

/// Component values for one candidate, each in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComponentScores {
    scores: [f64; COMPONENT_COUNT],
}

impl ComponentScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, component: Component, score: f64) {
        self.scores[component as usize] = score;
    }

    pub fn get(&self, component: Component) -> f64 {
        self.scores[component as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        Component::all().into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn to_hashmap(&self) -> HashMap<String, f64> {
        self.iter().map(|(c, v)| (c.as_str().to_string(), v)).collect()
    }
}

impl Serialize for ComponentScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(COMPONENT_COUNT))?;
        for (component, value) in self.iter() {
            map.serialize_entry(component.as_str(), &value)?;
        }
        map.end()
    }
}

/// Additive adjustments applied after the weighted sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Adjustments {
    pub safety: f64,
    pub graduation: f64,
    pub smart_money: f64,
    pub trust_combo: f64,
}

impl Adjustments {
    pub fn total(&self) -> f64 {
        self.safety + self.graduation + self.smart_money + self.trust_combo
    }
}

/// Full scoring result attached to a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub components: ComponentScores,
    /// Weighted sum before adjustments
    pub weighted: f64,
    pub adjustments: Adjustments,
    /// Clamped final score (0-100)
    pub total: f64,
    /// Human-readable explanation
    pub reason: String,
}

/// Bounds of a log-scaled metric. Values in `[low, high]` map to `[20, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRange {
    pub low: f64,
    pub high: f64,
}

impl LogRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

/// Numeric thresholds used by the mappers and adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub liquidity: LogRange,
    pub volume: LogRange,
    pub tx_count: LogRange,
    pub makers: LogRange,
    /// LP lock share earning full credit
    pub lp_locked_full_pct: f64,
    /// LP lock share earning partial credit
    pub lp_locked_partial_pct: f64,
    /// LP lock share counted as a trust signal
    pub lp_locked_trust_pct: f64,
    /// Top-10 holder share at or below which concentration is "low"
    pub holders_low_pct: f64,
    /// Top-10 holder share at or above which concentration earns nothing
    pub holders_high_pct: f64,
    /// Insider count at which insider credit reaches zero
    pub insider_danger_count: u32,
    pub rugcheck_high: i64,
    pub rugcheck_low: i64,
    /// Whale count that earns the whale bonus
    pub whale_bonus_count: u32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            liquidity: LogRange::new(1_000.0, 100_000.0),
            volume: LogRange::new(500.0, 50_000.0),
            tx_count: LogRange::new(10.0, 1_000.0),
            makers: LogRange::new(10.0, 100.0),
            lp_locked_full_pct: 90.0,
            lp_locked_partial_pct: 50.0,
            lp_locked_trust_pct: 80.0,
            holders_low_pct: 20.0,
            holders_high_pct: 50.0,
            insider_danger_count: 3,
            rugcheck_high: 800,
            rugcheck_low: 200,
            whale_bonus_count: 3,
        }
    }
}

/// Points for each advertised social link (capped at 100 in total).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialPoints {
    pub twitter: f64,
    pub website: f64,
    pub discord: f64,
    pub telegram: f64,
}

impl Default for SocialPoints {
    fn default() -> Self {
        Self {
            twitter: 40.0,
            website: 30.0,
            discord: 15.0,
            telegram: 15.0,
        }
    }
}

/// Per-cycle external context, keyed by token address.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub safety: HashMap<String, SafetyReport>,
    pub smart_money: HashMap<String, SmartMoneyReport>,
}

impl ScoringContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_safety(mut self, address: impl Into<String>, report: SafetyReport) -> Self {
        self.safety.insert(address.into(), report);
        self
    }

    pub fn with_smart_money(mut self, address: impl Into<String>, report: SmartMoneyReport) -> Self {
        self.smart_money.insert(address.into(), report);
        self
    }

    pub fn safety_for(&self, address: &str) -> Option<&SafetyReport> {
        self.safety.get(address)
    }

    pub fn smart_money_for(&self, address: &str) -> Option<&SmartMoneyReport> {
        self.smart_money.get(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_names_round_trip() {
        for component in Component::all() {
            assert_eq!(Component::from_name(component.as_str()), Some(component));
        }
        assert_eq!(Component::from_name("github_stars"), None);
    }

    #[test]
    fn test_component_scores_serialize_as_map() {
        let mut scores = ComponentScores::new();
        scores.set(Component::Age, 100.0);
        let value = serde_json::to_value(scores).unwrap();
        assert_eq!(value["age"], 100.0);
        assert_eq!(value["liquidity"], 0.0);
        assert_eq!(value.as_object().unwrap().len(), COMPONENT_COUNT);
    }
}
