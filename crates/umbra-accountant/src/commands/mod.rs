pub mod alias;
pub(crate) mod common;
pub mod expense;
pub mod fx;
pub mod link;
pub mod reconcile;
pub mod review;
pub mod statement;
