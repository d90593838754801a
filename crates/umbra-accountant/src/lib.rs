//! Statement-to-expense reconciliation for the Swiss Accountant ledger.
//!
//! The [`commands`] module is the public surface: every function resolves the
//! ledger home, runs one operation and returns a [`SuccessEnvelope`].

pub mod commands;
pub mod contracts;
pub mod error;
mod ingest;
pub mod ledger;
pub mod matching;
pub mod migrations;
pub mod model;
pub mod review;
pub mod setup;
pub mod state;
pub mod store;

pub use contracts::envelope::{FailureEnvelope, SuccessEnvelope};
pub use error::{ClientError, ClientResult};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");
