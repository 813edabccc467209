//! SQL schema for the SQLite listing store.
//!
//! The identity column is named after the store's policy (`id` or `key`), so
//! the table DDL is rendered per store rather than kept as one constant.

use crate::models::IdentityPolicy;

/// Metadata table; created before anything else so the policy can be checked.
pub const META: &str = "
CREATE TABLE IF NOT EXISTS store_meta (
    name   TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);
";

/// Row in `store_meta` holding the identity policy.
pub const POLICY_ENTRY: &str = "identity_policy";

/// Listing table DDL; idempotent thanks to `IF NOT EXISTS`.
///
/// Listings are strictly append-only. No UPDATE or DELETE is ever issued.
pub fn jobs_table(policy: IdentityPolicy) -> String {
    format!(
        "
CREATE TABLE IF NOT EXISTS jobs (
    {key}       TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    company     TEXT NOT NULL,
    location    TEXT NOT NULL,
    site        TEXT,
    job_url     TEXT NOT NULL,
    date_added  TEXT NOT NULL    -- ISO 8601 UTC, set once at ingestion
);

CREATE INDEX IF NOT EXISTS jobs_date_added_idx ON jobs(date_added);
",
        key = policy.key_column()
    )
}
