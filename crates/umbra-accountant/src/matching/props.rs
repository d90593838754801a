//! Property-based tests for the assignment pass.

use std::collections::BTreeSet;

use proptest::prelude::*;

use super::assign::assign;
use super::policy::MATCH_POLICY_V1;
use super::score::MatchCandidate;

/// Candidates over a small id space so that collisions on either side are
/// common.
fn candidate_set() -> impl Strategy<Value = Vec<MatchCandidate>> {
    prop::collection::vec((0u8..6, 0u8..6, 0u32..=1_000, -3i64..=3), 0..30).prop_map(|rows| {
        let mut seen = BTreeSet::new();
        rows.into_iter()
            .filter(|(expense, transaction, _, _)| seen.insert((*expense, *transaction)))
            .map(|(expense, transaction, confidence, delta)| MatchCandidate {
                expense_id: format!("exp_{expense}"),
                transaction_id: format!("txn_{transaction}"),
                confidence: f64::from(confidence) / 1_000.0,
                amount_score: 1.0,
                date_score: 1.0,
                text_score: 1.0,
                date_delta_days: delta,
                converted_amount: -1_000,
                fx_rate: None,
                reasons: Vec::new(),
            })
            .collect()
    })
}

fn selected_pairs(plan: &super::assign::AssignmentPlan) -> BTreeSet<(String, String)> {
    plan.auto_commits
        .iter()
        .chain(plan.reviews.iter().filter_map(|review| review.selected()))
        .map(|candidate| (candidate.expense_id.clone(), candidate.transaction_id.clone()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// No expense and no transaction is selected twice.
    #[test]
    fn prop_each_side_selected_at_most_once(candidates in candidate_set()) {
        let plan = assign(candidates, &MATCH_POLICY_V1);
        let pairs = selected_pairs(&plan);

        let expenses = pairs.iter().map(|(expense, _)| expense).collect::<BTreeSet<_>>();
        let transactions = pairs.iter().map(|(_, transaction)| transaction).collect::<BTreeSet<_>>();
        prop_assert_eq!(expenses.len(), pairs.len());
        prop_assert_eq!(transactions.len(), pairs.len());
    }

    /// Input order does not change the plan.
    #[test]
    fn prop_assignment_is_order_independent(candidates in candidate_set()) {
        let forward = assign(candidates.clone(), &MATCH_POLICY_V1);
        let mut reversed_input = candidates;
        reversed_input.reverse();
        let reversed = assign(reversed_input, &MATCH_POLICY_V1);

        prop_assert_eq!(forward, reversed);
    }

    /// Raising the auto-match threshold never adds auto commits and never
    /// changes which pairs are selected.
    #[test]
    fn prop_threshold_is_monotone(
        candidates in candidate_set(),
        low in 500u32..=1_000,
        raise in 0u32..=500,
    ) {
        let high = (low + raise).min(1_000);
        let mut low_policy = MATCH_POLICY_V1;
        low_policy.auto_match_threshold = f64::from(low) / 1_000.0;
        let mut high_policy = MATCH_POLICY_V1;
        high_policy.auto_match_threshold = f64::from(high) / 1_000.0;

        let low_plan = assign(candidates.clone(), &low_policy);
        let high_plan = assign(candidates, &high_policy);

        let low_auto = low_plan
            .auto_commits
            .iter()
            .map(|candidate| (candidate.expense_id.clone(), candidate.transaction_id.clone()))
            .collect::<BTreeSet<_>>();
        let high_auto = high_plan
            .auto_commits
            .iter()
            .map(|candidate| (candidate.expense_id.clone(), candidate.transaction_id.clone()))
            .collect::<BTreeSet<_>>();

        prop_assert!(high_auto.is_subset(&low_auto));
        prop_assert_eq!(selected_pairs(&low_plan), selected_pairs(&high_plan));
    }

    /// Every selected pair clears the review floor.
    #[test]
    fn prop_selected_pairs_clear_the_floor(candidates in candidate_set()) {
        let plan = assign(candidates, &MATCH_POLICY_V1);
        for candidate in plan
            .auto_commits
            .iter()
            .chain(plan.reviews.iter().flat_map(|review| review.candidates.iter()))
        {
            prop_assert!(candidate.confidence >= MATCH_POLICY_V1.review_floor);
        }
    }
}
