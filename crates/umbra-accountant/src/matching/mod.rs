//! Expense/transaction matching: per-pair scoring, greedy assignment and the
//! run orchestration that commits or queues the result.

pub mod assign;
pub mod engine;
pub mod fx;
pub mod normalize;
pub mod policy;
pub mod score;

#[cfg(test)]
mod props;

pub use engine::{ReconcileRequest, ReconciliationRunResult, RunCounts, reconcile};
pub use policy::{MATCH_POLICY_V1, MATCH_POLICY_VERSION, MatchPolicy, PolicyOverrides};
