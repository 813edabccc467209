//! Pipeline entry points.
//!
//! - `run_pipeline`: one ingestion run (fetch, reconcile, persist, notify)
//! - `ListingView`: read-only, filtered access to the stored listings

pub mod ingest;
pub mod reconcile;
pub mod view;

pub use ingest::{Pipeline, run_pipeline};
pub use reconcile::{Reconciler, Reconciliation, reconcile};
pub use view::{ListingView, ViewFilter, ViewStats};
