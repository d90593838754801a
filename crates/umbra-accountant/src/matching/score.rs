use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::matching::fx::{FxCache, FxKey, convert_minor};
use crate::matching::normalize::{MerchantAliases, canonical_fingerprint, similarity};
use crate::matching::policy::MatchPolicy;
use crate::model::{Expense, Transaction};

/// Why a candidate scored the way it did, in component order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    ExactAmount,
    AmountWithinTolerance,
    ExactDate,
    DateWithinWindow,
    CurrencyMatch,
    FxImplied,
    TextSimilarity,
    TextUnavailable,
}

/// A scored expense/transaction pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub expense_id: String,
    pub transaction_id: String,
    pub confidence: f64,
    pub amount_score: f64,
    pub date_score: f64,
    pub text_score: f64,
    /// `posted_date - date_local`, in days.
    pub date_delta_days: i64,
    /// Transaction amount in the expense currency, signed minor units.
    pub converted_amount: i64,
    pub fx_rate: Option<Decimal>,
    pub reasons: Vec<MatchReason>,
}

/// Why a pair never became a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Direction,
    DateOutsideWindow,
    MissingFx,
    AmountOutsideTolerance,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Candidate(MatchCandidate),
    Excluded(Exclusion),
}

/// Expense with its alias-resolved merchant fingerprint, computed once per run.
#[derive(Debug, Clone)]
pub struct PreparedExpense {
    pub expense: Expense,
    pub fingerprint: Option<String>,
}

impl PreparedExpense {
    pub fn new(expense: Expense, aliases: &MerchantAliases) -> Self {
        let fingerprint = canonical_fingerprint(&expense.merchant_text, aliases);
        Self {
            expense,
            fingerprint,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub transaction: Transaction,
    pub fingerprint: Option<String>,
}

impl PreparedTransaction {
    pub fn new(transaction: Transaction, aliases: &MerchantAliases) -> Self {
        let fingerprint = canonical_fingerprint(&transaction.counterparty_text, aliases);
        Self {
            transaction,
            fingerprint,
        }
    }
}

/// The FX lookup a pair needs, if its currencies differ and it survives the
/// cheaper gates.
pub fn fx_key(
    expense: &PreparedExpense,
    transaction: &PreparedTransaction,
    policy: &MatchPolicy,
) -> Option<FxKey> {
    let expense = &expense.expense;
    let transaction = &transaction.transaction;
    if expense.currency == transaction.currency
        || !expense.direction.accepts(transaction.amount)
        || date_delta(expense, transaction).abs() > i64::from(policy.date_window_days)
    {
        return None;
    }
    Some((
        transaction.currency.clone(),
        expense.currency.clone(),
        transaction.posted_date,
    ))
}

/// Scores one pair. Pure in its inputs.
pub fn score_pair(
    prepared_expense: &PreparedExpense,
    prepared_transaction: &PreparedTransaction,
    fx: &FxCache,
    policy: &MatchPolicy,
) -> PairOutcome {
    let expense = &prepared_expense.expense;
    let transaction = &prepared_transaction.transaction;
    let mut reasons = Vec::with_capacity(4);

    if !expense.direction.accepts(transaction.amount) {
        return PairOutcome::Excluded(Exclusion::Direction);
    }

    let delta_days = date_delta(expense, transaction);
    let window = i64::from(policy.date_window_days);
    if delta_days.abs() > window {
        return PairOutcome::Excluded(Exclusion::DateOutsideWindow);
    }

    let (converted_amount, fx_rate) = if expense.currency == transaction.currency {
        (transaction.amount, None)
    } else {
        let Some(rate) = fx.get(
            &transaction.currency,
            &expense.currency,
            transaction.posted_date,
        ) else {
            return PairOutcome::Excluded(Exclusion::MissingFx);
        };
        let Some(converted) =
            convert_minor(transaction.amount, &transaction.currency, &expense.currency, rate)
        else {
            return PairOutcome::Excluded(Exclusion::MissingFx);
        };
        (converted, Some(rate))
    };

    let expense_amount = i64::try_from(expense.amount_cents).unwrap_or(i64::MAX);
    let difference = converted_amount
        .saturating_abs()
        .saturating_sub(expense_amount)
        .saturating_abs();
    let tolerance = policy.amount_tolerance(expense_amount);
    let amount_score = if difference <= policy.exact_amount_slack_cents {
        reasons.push(MatchReason::ExactAmount);
        1.0
    } else if difference > tolerance {
        return PairOutcome::Excluded(Exclusion::AmountOutsideTolerance);
    } else {
        reasons.push(MatchReason::AmountWithinTolerance);
        1.0 - (difference as f64 / tolerance as f64)
    };

    let date_score = if delta_days == 0 {
        reasons.push(MatchReason::ExactDate);
        1.0
    } else {
        reasons.push(MatchReason::DateWithinWindow);
        1.0 - (delta_days.abs() as f64 / window as f64)
    };

    reasons.push(if fx_rate.is_some() {
        MatchReason::FxImplied
    } else {
        MatchReason::CurrencyMatch
    });

    let text_score = match (
        prepared_expense.fingerprint.as_deref(),
        prepared_transaction.fingerprint.as_deref(),
    ) {
        (Some(merchant), Some(counterparty)) => {
            reasons.push(MatchReason::TextSimilarity);
            similarity(merchant, counterparty)
        }
        _ => {
            reasons.push(MatchReason::TextUnavailable);
            policy.missing_text_score
        }
    };

    PairOutcome::Candidate(MatchCandidate {
        expense_id: expense.expense_id.clone(),
        transaction_id: transaction.transaction_id.clone(),
        confidence: policy.composite(amount_score, date_score, text_score),
        amount_score,
        date_score,
        text_score,
        date_delta_days: delta_days,
        converted_amount,
        fx_rate,
        reasons,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBatch {
    pub candidates: Vec<MatchCandidate>,
    pub candidate_pairs: usize,
    pub excluded_missing_fx: usize,
    pub cancelled: bool,
}

/// Scores the full cross product in parallel, skipping suppressed pairs.
///
/// The output order is deterministic: expenses in input order, then
/// transactions in input order.
pub fn score_all(
    expenses: &[PreparedExpense],
    transactions: &[PreparedTransaction],
    suppressed: &BTreeSet<(String, String)>,
    fx: &FxCache,
    policy: &MatchPolicy,
    cancel: &AtomicBool,
) -> ScoreBatch {
    let per_expense = expenses
        .par_iter()
        .map(|expense| {
            let mut batch = ScoreBatch::default();
            for transaction in transactions {
                if cancel.load(Ordering::Relaxed) {
                    batch.cancelled = true;
                    break;
                }
                if suppressed.contains(&(
                    expense.expense.expense_id.clone(),
                    transaction.transaction.transaction_id.clone(),
                )) {
                    continue;
                }
                match score_pair(expense, transaction, fx, policy) {
                    PairOutcome::Candidate(candidate) => {
                        batch.candidate_pairs += 1;
                        batch.candidates.push(candidate);
                    }
                    PairOutcome::Excluded(Exclusion::MissingFx) => {
                        batch.excluded_missing_fx += 1;
                    }
                    PairOutcome::Excluded(_) => {}
                }
            }
            batch
        })
        .collect::<Vec<ScoreBatch>>();

    let mut merged = ScoreBatch::default();
    for batch in per_expense {
        merged.candidate_pairs += batch.candidate_pairs;
        merged.excluded_missing_fx += batch.excluded_missing_fx;
        merged.cancelled |= batch.cancelled;
        merged.candidates.extend(batch.candidates);
    }
    merged
}

fn date_delta(expense: &Expense, transaction: &Transaction) -> i64 {
    transaction
        .posted_date
        .signed_duration_since(expense.date_local)
        .num_days()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicBool;

    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::{
        Exclusion, MatchReason, PairOutcome, PreparedExpense, PreparedTransaction, score_all,
        score_pair,
    };
    use crate::matching::fx::{FxCache, StaticFxRates};
    use crate::matching::normalize::MerchantAliases;
    use crate::matching::policy::MATCH_POLICY_V1;
    use crate::model::{Direction, Expense, ExpenseSource, Transaction, parse_iso_date};

    fn day(value: &str) -> NaiveDate {
        parse_iso_date(value).unwrap_or(NaiveDate::MIN)
    }

    fn expense(date: &str, amount_cents: u64, currency: &str, merchant: &str) -> PreparedExpense {
        let expense = Expense {
            expense_id: "exp_1".to_string(),
            user_id: "u_1".to_string(),
            date_local: day(date),
            amount_cents,
            direction: Direction::Debit,
            currency: currency.to_string(),
            merchant_text: merchant.to_string(),
            category_code: None,
            source: ExpenseSource::Manual,
            vat_breakdown: None,
        };
        PreparedExpense::new(expense, &MerchantAliases::default())
    }

    fn transaction(date: &str, amount: i64, currency: &str, text: &str) -> PreparedTransaction {
        let transaction = Transaction {
            transaction_id: "txn_1".to_string(),
            account_ref: "acct_1".to_string(),
            posted_date: day(date),
            amount,
            currency: currency.to_string(),
            counterparty_text: text.to_string(),
            mcc: None,
            statement_id: "stm_1".to_string(),
        };
        PreparedTransaction::new(transaction, &MerchantAliases::default())
    }

    fn candidate(outcome: PairOutcome) -> Option<super::MatchCandidate> {
        match outcome {
            PairOutcome::Candidate(candidate) => Some(candidate),
            PairOutcome::Excluded(_) => None,
        }
    }

    #[test]
    fn exact_migros_pair_scores_full_confidence() {
        let outcome = score_pair(
            &expense("2024-09-07", 2750, "CHF", "Migros"),
            &transaction("2024-09-07", -2750, "CHF", "MIGROS SA LAUSANNE"),
            &FxCache::default(),
            &MATCH_POLICY_V1,
        );
        let scored = candidate(outcome);
        assert!(scored.is_some());
        if let Some(value) = scored {
            assert!(value.confidence > 0.999);
            assert_eq!(
                value.reasons,
                vec![
                    MatchReason::ExactAmount,
                    MatchReason::ExactDate,
                    MatchReason::CurrencyMatch,
                    MatchReason::TextSimilarity,
                ]
            );
        }
    }

    #[test]
    fn two_days_late_lands_in_review_band() {
        let outcome = score_pair(
            &expense("2024-09-07", 2750, "CHF", "Migros"),
            &transaction("2024-09-09", -2750, "CHF", "MIGROS SA LAUSANNE"),
            &FxCache::default(),
            &MATCH_POLICY_V1,
        );
        let scored = candidate(outcome);
        assert!(scored.is_some());
        if let Some(value) = scored {
            assert!((value.confidence - 0.766_666).abs() < 1e-4);
            assert_eq!(value.date_delta_days, 2);
            assert!(value.reasons.contains(&MatchReason::DateWithinWindow));
        }
    }

    #[test]
    fn opposite_direction_is_excluded() {
        let outcome = score_pair(
            &expense("2024-09-07", 2750, "CHF", "Migros"),
            &transaction("2024-09-07", 2750, "CHF", "MIGROS"),
            &FxCache::default(),
            &MATCH_POLICY_V1,
        );
        assert_eq!(outcome, PairOutcome::Excluded(Exclusion::Direction));
    }

    #[test]
    fn missing_fx_rate_excludes_cross_currency_pair() {
        let outcome = score_pair(
            &expense("2024-09-07", 2000, "CHF", "Hotel Lugano"),
            &transaction("2024-09-07", -2000, "EUR", "HOTEL LUGANO"),
            &FxCache::default(),
            &MATCH_POLICY_V1,
        );
        assert_eq!(outcome, PairOutcome::Excluded(Exclusion::MissingFx));
    }

    #[test]
    fn fx_implied_pair_uses_converted_amount() {
        let rates = StaticFxRates::new(4).with_rate("EUR", "CHF", day("2024-09-06"), dec!(0.95));
        let mut cache = FxCache::default();
        cache.resolve_missing(
            &rates,
            &BTreeSet::from([("EUR".to_string(), "CHF".to_string(), day("2024-09-07"))]),
        );

        let outcome = score_pair(
            &expense("2024-09-07", 1900, "CHF", "Hotel"),
            &transaction("2024-09-07", -2000, "EUR", "HOTEL"),
            &cache,
            &MATCH_POLICY_V1,
        );
        let scored = candidate(outcome);
        assert!(scored.is_some());
        if let Some(value) = scored {
            assert_eq!(value.converted_amount, -1900);
            assert_eq!(value.fx_rate, Some(dec!(0.95)));
            assert!(value.reasons.contains(&MatchReason::FxImplied));
        }
    }

    #[test]
    fn amount_beyond_tolerance_is_excluded() {
        let outcome = score_pair(
            &expense("2024-09-07", 2750, "CHF", "Migros"),
            &transaction("2024-09-07", -2806, "CHF", "MIGROS"),
            &FxCache::default(),
            &MATCH_POLICY_V1,
        );
        assert_eq!(outcome, PairOutcome::Excluded(Exclusion::AmountOutsideTolerance));
    }

    #[test]
    fn empty_counterparty_uses_neutral_text_score() {
        let outcome = score_pair(
            &expense("2024-09-07", 2750, "CHF", "Migros"),
            &transaction("2024-09-07", -2750, "CHF", ""),
            &FxCache::default(),
            &MATCH_POLICY_V1,
        );
        let scored = candidate(outcome);
        assert!(scored.is_some());
        if let Some(value) = scored {
            assert!((value.confidence - 0.9).abs() < 1e-9);
            assert_eq!(value.reasons.last(), Some(&MatchReason::TextUnavailable));
        }
    }

    #[test]
    fn score_all_counts_missing_fx_and_skips_suppressed_pairs() {
        let expenses = vec![expense("2024-09-07", 2000, "CHF", "Hotel")];
        let transactions = vec![transaction("2024-09-07", -2000, "EUR", "HOTEL")];
        let cancel = AtomicBool::new(false);

        let batch = score_all(
            &expenses,
            &transactions,
            &BTreeSet::new(),
            &FxCache::default(),
            &MATCH_POLICY_V1,
            &cancel,
        );
        assert_eq!(batch.excluded_missing_fx, 1);
        assert!(batch.candidates.is_empty());

        let suppressed = BTreeSet::from([("exp_1".to_string(), "txn_1".to_string())]);
        let batch = score_all(
            &expenses,
            &transactions,
            &suppressed,
            &FxCache::default(),
            &MATCH_POLICY_V1,
            &cancel,
        );
        assert_eq!(batch.excluded_missing_fx, 0);
    }
}
