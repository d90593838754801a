//! Greedy one-to-one assignment of scored candidates.
//!
//! Not an optimal bipartite matching: the highest-confidence pair always wins
//! and its two sides leave the pool. Ties resolve by smaller date gap, then
//! transaction id, then expense id, so the outcome is independent of input
//! order.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::matching::policy::{Decision, MatchPolicy};
use crate::matching::score::MatchCandidate;

/// A review-band selection plus its ranked alternatives; `candidates[0]` is
/// the greedy pick.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewProposal {
    pub expense_id: String,
    pub candidates: Vec<MatchCandidate>,
}

impl ReviewProposal {
    pub fn selected(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentPlan {
    pub auto_commits: Vec<MatchCandidate>,
    pub reviews: Vec<ReviewProposal>,
    pub discarded: usize,
}

pub fn compare_candidates(left: &MatchCandidate, right: &MatchCandidate) -> Ordering {
    right
        .confidence
        .total_cmp(&left.confidence)
        .then_with(|| {
            left.date_delta_days
                .unsigned_abs()
                .cmp(&right.date_delta_days.unsigned_abs())
        })
        .then_with(|| left.transaction_id.cmp(&right.transaction_id))
        .then_with(|| left.expense_id.cmp(&right.expense_id))
}

pub fn assign(mut candidates: Vec<MatchCandidate>, policy: &MatchPolicy) -> AssignmentPlan {
    candidates.sort_by(compare_candidates);

    let mut plan = AssignmentPlan::default();
    let mut taken_expenses = BTreeSet::new();
    let mut taken_transactions = BTreeSet::new();
    let mut review_selections = Vec::new();

    for candidate in &candidates {
        if taken_expenses.contains(candidate.expense_id.as_str())
            || taken_transactions.contains(candidate.transaction_id.as_str())
        {
            continue;
        }

        match policy.decide(candidate.confidence) {
            Decision::AutoCommit => plan.auto_commits.push(candidate.clone()),
            Decision::Review => review_selections.push(candidate.clone()),
            Decision::Discard => {
                plan.discarded += 1;
                continue;
            }
        }
        taken_expenses.insert(candidate.expense_id.as_str());
        taken_transactions.insert(candidate.transaction_id.as_str());
    }

    for selected in review_selections {
        let mut ranked = vec![selected.clone()];
        for alternative in candidates.iter().filter(|candidate| {
            candidate.expense_id == selected.expense_id
                && candidate.transaction_id != selected.transaction_id
                && candidate.confidence >= policy.review_floor
                && !taken_transactions.contains(candidate.transaction_id.as_str())
        }) {
            if ranked.len() >= policy.max_review_candidates.max(1) {
                break;
            }
            ranked.push(alternative.clone());
        }
        plan.reviews.push(ReviewProposal {
            expense_id: selected.expense_id.clone(),
            candidates: ranked,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::assign;
    use crate::matching::policy::MATCH_POLICY_V1;
    use crate::matching::score::MatchCandidate;

    fn candidate(expense_id: &str, transaction_id: &str, confidence: f64, delta: i64) -> MatchCandidate {
        MatchCandidate {
            expense_id: expense_id.to_string(),
            transaction_id: transaction_id.to_string(),
            confidence,
            amount_score: 1.0,
            date_score: 1.0,
            text_score: 1.0,
            date_delta_days: delta,
            converted_amount: -2750,
            fx_rate: None,
            reasons: Vec::new(),
        }
    }

    #[test]
    fn higher_confidence_wins_the_shared_transaction() {
        let plan = assign(
            vec![
                candidate("exp_b", "txn_1", 0.93, 0),
                candidate("exp_a", "txn_1", 0.97, 0),
            ],
            &MATCH_POLICY_V1,
        );

        assert_eq!(plan.auto_commits.len(), 1);
        assert_eq!(plan.auto_commits[0].expense_id, "exp_a");
        assert!(plan.reviews.is_empty());
    }

    #[test]
    fn ties_break_on_date_gap_then_transaction_id() {
        let plan = assign(
            vec![
                candidate("exp_a", "txn_2", 0.96, 0),
                candidate("exp_a", "txn_1", 0.96, 2),
                candidate("exp_a", "txn_0", 0.96, -2),
            ],
            &MATCH_POLICY_V1,
        );
        assert_eq!(plan.auto_commits[0].transaction_id, "txn_2");

        let plan = assign(
            vec![
                candidate("exp_a", "txn_9", 0.96, 1),
                candidate("exp_a", "txn_3", 0.96, -1),
            ],
            &MATCH_POLICY_V1,
        );
        assert_eq!(plan.auto_commits[0].transaction_id, "txn_3");
    }

    #[test]
    fn discarded_pairs_leave_both_sides_available() {
        let plan = assign(
            vec![
                candidate("exp_a", "txn_1", 0.40, 0),
                candidate("exp_a", "txn_2", 0.30, 0),
                candidate("exp_b", "txn_1", 0.35, 0),
            ],
            &MATCH_POLICY_V1,
        );
        assert!(plan.auto_commits.is_empty());
        assert!(plan.reviews.is_empty());
        assert_eq!(plan.discarded, 3);
    }

    #[test]
    fn review_entry_lists_unassigned_alternatives_in_rank_order() {
        let plan = assign(
            vec![
                candidate("exp_a", "txn_1", 0.80, 0),
                candidate("exp_a", "txn_2", 0.70, 1),
                candidate("exp_a", "txn_3", 0.60, 1),
                candidate("exp_a", "txn_4", 0.55, 2),
                candidate("exp_a", "txn_5", 0.45, 0),
                candidate("exp_b", "txn_2", 0.99, 0),
            ],
            &MATCH_POLICY_V1,
        );

        assert_eq!(plan.auto_commits.len(), 1);
        assert_eq!(plan.reviews.len(), 1);
        let ids = plan.reviews[0]
            .candidates
            .iter()
            .map(|candidate| candidate.transaction_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(ids, vec!["txn_1", "txn_3", "txn_4"]);
    }
}
