//! sol-screener - Solana token screener with notification deduplication
//!
//! Scores newly listed tokens from market, social, safety and smart money
//! signals, picks the best unseen ones each cycle and remembers what was
//! already announced.

pub mod config;
pub mod monitor;
pub mod oracle;
pub mod state;
pub mod types;

// Re-export main types for convenience
pub use config::{ConfigError, ScreenerConfig};
pub use oracle::{CompositeScorer, ScoringContext, Selected};
pub use state::{normalize_key, DedupKey, EventCategory, NotificationState};
pub use types::{Candidate, RiskLevel, SafetyReport, SmartMoneyReport};
