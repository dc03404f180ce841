//! Scoring functions.
//!
//! Pure mappers from raw candidate data to a normalized score in [0, 100].
//! None of them fail: missing inputs resolve to documented neutral values.

use crate::oracle::types::{LogRange, ScoreThresholds, SocialPoints};
use crate::types::{Authority, SafetyReport, SocialLinks};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Safety score when no report is available.
pub const SAFETY_UNKNOWN_SCORE: f64 = 30.0;
/// Age score when the creation time is unknown.
pub const AGE_UNKNOWN_SCORE: f64 = 30.0;

/// Map a raw metric onto [0, 100] logarithmically.
///
/// Values up to `low` ramp linearly from 0 to 20, values in `[low, high]` map
/// to `[20, 100]` on a log10 scale, anything above `high` saturates at 100.
pub fn log_score(value: f64, low: f64, high: f64) -> f64 {
    if !(value > 0.0) {
        return 0.0;
    }
    if value <= low {
        return (value / low) * 20.0;
    }
    let log_low = low.log10();
    let log_high = high.log10();
    if log_high == log_low {
        return 50.0;
    }
    let ratio = ((value.log10() - log_low) / (log_high - log_low)).clamp(0.0, 1.0);
    20.0 + ratio * 80.0
}

/// [`log_score`] over a configured range.
pub fn log_score_in(value: f64, range: LogRange) -> f64 {
    log_score(value, range.low, range.high)
}

/// Score 24h price change: moderate gains peak, pumps and drawdowns are penalized.
pub fn price_change_score(change_pct: f64) -> f64 {
    if change_pct >= 200.0 {
        30.0
    } else if change_pct >= 100.0 {
        50.0
    } else if change_pct >= 50.0 {
        70.0
    } else if change_pct >= 20.0 {
        90.0
    } else if change_pct >= 10.0 {
        100.0
    } else if change_pct >= 0.0 {
        60.0 + change_pct * 4.0
    } else if change_pct >= -20.0 {
        (60.0 + change_pct * 2.0).max(20.0)
    } else if change_pct >= -50.0 {
        (20.0 + change_pct * 0.5).max(5.0)
    } else {
        0.0
    }
}

/// Hours elapsed between `created_at` and `now`. Negative for future timestamps.
pub fn age_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_seconds() as f64 / 3600.0
}

/// Score pair age. The 3-12h window is the peak.
pub fn age_score(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(created_at) = created_at else {
        return AGE_UNKNOWN_SCORE;
    };
    let hours = age_hours(created_at, now);
    if hours < 1.0 {
        40.0
    } else if hours < 3.0 {
        70.0
    } else if hours < 12.0 {
        100.0
    } else if hours < 24.0 {
        60.0
    } else {
        30.0
    }
}

/// Additive social presence score, capped at 100.
pub fn social_score(links: SocialLinks, points: &SocialPoints) -> f64 {
    let mut score = 0.0;
    if links.twitter {
        score += points.twitter;
    }
    if links.website {
        score += points.website;
    }
    if links.discord {
        score += points.discord;
    }
    if links.telegram {
        score += points.telegram;
    }
    score.min(100.0)
}

/// Score the contents of a safety report.
///
/// Independent contributions (LP lock, mint authority, freeze authority,
/// holder concentration, insiders) are summed and capped at 100. Without a
/// report the result is [`SAFETY_UNKNOWN_SCORE`].
pub fn safety_score(report: Option<&SafetyReport>, thresholds: &ScoreThresholds) -> f64 {
    let Some(report) = report else {
        return SAFETY_UNKNOWN_SCORE;
    };

    // NaN counts as not reported
    let lp = match report.lp_locked_pct.filter(|v| !v.is_nan()) {
        Some(pct) if pct >= thresholds.lp_locked_full_pct => 30.0,
        Some(pct) if pct >= thresholds.lp_locked_partial_pct => 20.0,
        Some(pct) if pct > 0.0 => 10.0,
        Some(_) => 0.0,
        None => 10.0,
    };

    let mint = match report.mint_authority {
        Authority::Renounced => 25.0,
        Authority::Active(_) => 0.0,
        Authority::Unknown => 10.0,
    };

    let freeze = match report.freeze_authority {
        Authority::Renounced => 15.0,
        Authority::Active(_) => 0.0,
        Authority::Unknown => 5.0,
    };

    let holders = match report.top_holders_pct.filter(|v| !v.is_nan()) {
        Some(pct) => descending_credit(
            pct,
            thresholds.holders_low_pct,
            thresholds.holders_high_pct,
            20.0,
        ),
        None => 8.0,
    };

    let insiders = match report.insider_count {
        Some(count) => descending_credit(
            count as f64,
            0.0,
            thresholds.insider_danger_count as f64,
            10.0,
        ),
        None => 5.0,
    };

    let total = (lp + mint + freeze + holders + insiders).min(100.0);
    debug!(
        "Safety data: lp={} mint={} freeze={} holders={} insiders={} -> {}",
        lp, mint, freeze, holders, insiders, total
    );
    total
}

/// Full credit at or below `full_at`, linearly down to zero at `zero_at`.
fn descending_credit(value: f64, full_at: f64, zero_at: f64, max_points: f64) -> f64 {
    if value <= full_at {
        max_points
    } else if value >= zero_at {
        0.0
    } else {
        max_points * (zero_at - value) / (zero_at - full_at)
    }
}

/// Coerce a raw non-negative metric: NaN, infinities and negatives become zero.
pub fn sanitize_metric(name: &str, value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        debug!("Malformed metric {}={} coerced to 0", name, value);
        0.0
    }
}

/// Coerce a signed metric: only non-finite values become zero.
pub fn sanitize_signed_metric(name: &str, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        debug!("Malformed metric {}={} coerced to 0", name, value);
        0.0
    }
}
