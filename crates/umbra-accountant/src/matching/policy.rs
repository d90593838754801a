use crate::{ClientError, ClientResult};

/// Scoring/assignment policy identifier.
///
/// Persisted with every run so a change to the weights or tolerances shows up
/// as a new version rather than silently shifting historical confidences.
pub const MATCH_POLICY_VERSION: &str = "match/v1";

/// v1 expense/transaction matching policy.
///
/// Notes:
/// - The weights 0.45 / 0.35 / 0.20 are a contract for golden-file
///   compatibility; changing them requires a new policy version.
/// - Amount and date scores decay linearly to 0.0 at their tolerance bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub amount_weight: f64,
    pub date_weight: f64,
    pub text_weight: f64,
    pub auto_match_threshold: f64,
    pub review_floor: f64,
    pub date_window_days: u32,
    /// Relative amount tolerance in basis points of the expense amount.
    pub amount_tolerance_bps: i64,
    pub amount_tolerance_floor_cents: i64,
    pub exact_amount_slack_cents: i64,
    pub missing_text_score: f64,
    pub max_review_candidates: usize,
    pub fx_lookback_days: u32,
    pub lock_stale_after_secs: i64,
}

impl MatchPolicy {
    pub fn composite(self, amount_score: f64, date_score: f64, text_score: f64) -> f64 {
        let raw = (self.amount_weight * amount_score)
            + (self.date_weight * date_score)
            + (self.text_weight * text_score);
        raw.clamp(0.0, 1.0)
    }

    /// Largest absolute difference (minor units) still considered a match for
    /// an expense of `expense_amount` minor units.
    pub fn amount_tolerance(self, expense_amount: i64) -> i64 {
        let scaled = expense_amount.saturating_abs().saturating_mul(self.amount_tolerance_bps);
        // Ceiling division keeps odd amounts from rounding the bound down.
        let ratio_bound = scaled.saturating_add(9_999) / 10_000;
        ratio_bound.max(self.amount_tolerance_floor_cents)
    }

    pub fn decide(self, confidence: f64) -> Decision {
        if confidence >= self.auto_match_threshold {
            Decision::AutoCommit
        } else if confidence >= self.review_floor {
            Decision::Review
        } else {
            Decision::Discard
        }
    }

    pub fn with_overrides(self, overrides: PolicyOverrides) -> ClientResult<Self> {
        let mut policy = self;
        if let Some(threshold) = overrides.auto_match_threshold {
            policy.auto_match_threshold = threshold;
        }
        if let Some(floor) = overrides.review_floor {
            policy.review_floor = floor;
        }
        if let Some(window) = overrides.date_window_days {
            policy.date_window_days = window;
        }
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(self) -> ClientResult<()> {
        if !(0.0..=1.0).contains(&self.auto_match_threshold) {
            return Err(ClientError::invalid_argument_for_command(
                "`threshold` must be between 0 and 1.",
                Some("reconcile"),
            ));
        }
        if !(0.0..=1.0).contains(&self.review_floor) {
            return Err(ClientError::invalid_argument_for_command(
                "`review-floor` must be between 0 and 1.",
                Some("reconcile"),
            ));
        }
        if self.review_floor > self.auto_match_threshold {
            return Err(ClientError::invalid_argument_for_command(
                "`review-floor` must not exceed `threshold`.",
                Some("reconcile"),
            ));
        }
        if self.date_window_days == 0 {
            return Err(ClientError::invalid_argument_for_command(
                "`window-days` must be at least 1.",
                Some("reconcile"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AutoCommit,
    Review,
    Discard,
}

/// Per-run overrides layered on top of [`MATCH_POLICY_V1`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolicyOverrides {
    pub auto_match_threshold: Option<f64>,
    pub review_floor: Option<f64>,
    pub date_window_days: Option<u32>,
}

pub const MATCH_POLICY_V1: MatchPolicy = MatchPolicy {
    amount_weight: 0.45,
    date_weight: 0.35,
    text_weight: 0.20,
    auto_match_threshold: 0.95,
    review_floor: 0.50,
    date_window_days: 3,
    amount_tolerance_bps: 200,
    amount_tolerance_floor_cents: 50,
    exact_amount_slack_cents: 1,
    missing_text_score: 0.5,
    max_review_candidates: 3,
    fx_lookback_days: 4,
    lock_stale_after_secs: 300,
};
