//! Oracle module - candidate scoring and selection
//!
//! Pure component mappers (`features`), the weight table (`weights`), the
//! composite scorer with its adjustments (`scorer`) and ranking against the
//! dedup store (`selection`).

pub mod features;
pub mod scorer;
pub mod selection;
pub mod types;
pub mod weights;

// Re-export main types
pub use types::{
    Adjustments, Component, ComponentScores, LogRange, ScoreBreakdown, ScoreThresholds,
    ScoringContext, SocialPoints,
};

// Re-export key components
pub use scorer::CompositeScorer;
pub use selection::{prefilter, rank, select_top, select_top_at, Selected};
pub use weights::Weights;
