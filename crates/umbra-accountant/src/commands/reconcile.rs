use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::ClientResult;
use crate::commands::common::{load_setup, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::matching::fx::SqliteFxRates;
use crate::matching::{MATCH_POLICY_V1, PolicyOverrides, ReconcileRequest, reconcile};
use crate::model::{Period, parse_iso_date_arg};

#[derive(Debug, Default)]
pub struct ReconcileOptions<'a> {
    pub user_id: String,
    pub from: String,
    pub to: String,
    pub threshold: Option<f64>,
    pub review_floor: Option<f64>,
    pub window_days: Option<u32>,
    pub home_override: Option<&'a Path>,
    /// Set from another thread to stop the run between pairs or commits.
    pub cancel: Option<&'a AtomicBool>,
}

pub fn run(user_id: String, from: String, to: String) -> ClientResult<SuccessEnvelope> {
    run_with_options(ReconcileOptions {
        user_id,
        from,
        to,
        ..ReconcileOptions::default()
    })
}

#[doc(hidden)]
pub fn run_with_options(options: ReconcileOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "reconcile";
    let user_id = require_arg(&options.user_id, "--user", command)?;
    let start = parse_iso_date_arg(&options.from, "--from", command)?;
    let end = parse_iso_date_arg(&options.to, "--to", command)?;
    let period = Period::new(start, end)?;
    let policy = MATCH_POLICY_V1.with_overrides(PolicyOverrides {
        auto_match_threshold: options.threshold,
        review_floor: options.review_floor,
        date_window_days: options.window_days,
    })?;

    let setup = load_setup(options.home_override)?;
    let mut connection = setup.connect()?;
    // Rate lookups read through their own handle while the run holds the
    // main connection mutably.
    let fx_connection = setup.connect()?;
    let fx_source = SqliteFxRates::new(&fx_connection, &setup.db_path, policy.fx_lookback_days);

    let result = reconcile(
        &mut connection,
        &setup.db_path,
        &fx_source,
        &ReconcileRequest {
            user_id,
            period,
            policy,
            cancel: options.cancel,
        },
    )?;
    success(command, result)
}
