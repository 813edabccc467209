//! Row encoding shared by the storage backends.
//!
//! Both backends expose the same layout to readers:
//! `<id|key>, title, company, location, site, job_url, date_added`.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AppError, Result};
use crate::models::{IdentityPolicy, ListingRecord};

/// Columns following the identity column.
pub const DATA_COLUMNS: [&str; 6] = ["title", "company", "location", "site", "job_url", "date_added"];

/// Full header for a store under `policy`.
pub fn header(policy: IdentityPolicy) -> Vec<&'static str> {
    let mut columns = Vec::with_capacity(DATA_COLUMNS.len() + 1);
    columns.push(policy.key_column());
    columns.extend(DATA_COLUMNS);
    columns
}

/// Fixed-width RFC 3339 so lexical order matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::validation(format!("bad date_added '{s}': {e}")))
}

/// A stored row in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub key: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub site: String,
    pub job_url: String,
    pub date_added: String,
}

impl StoredRow {
    /// Encode a record; fails if it has no identity under `policy`.
    pub fn encode(record: &ListingRecord, policy: IdentityPolicy) -> Result<Self> {
        let key = record.identity(policy).ok_or_else(|| {
            AppError::integrity(
                record.job_url.clone(),
                format!("record has no identity under the {policy} policy"),
            )
        })?;

        Ok(Self {
            key: key.to_string(),
            title: record.title.clone(),
            company: record.company.clone(),
            location: record.location.clone(),
            site: record.site.clone().unwrap_or_default(),
            job_url: record.job_url.clone(),
            date_added: encode_dt(record.observed_at),
        })
    }

    /// Decode back into a record.
    ///
    /// Composite stores do not keep the upstream id.
    pub fn decode(self, policy: IdentityPolicy) -> Result<ListingRecord> {
        let observed_at = decode_dt(&self.date_added)?;
        let id = match policy {
            IdentityPolicy::StableId => Some(self.key),
            IdentityPolicy::Composite => None,
        };

        Ok(ListingRecord {
            id,
            title: self.title,
            company: self.company,
            location: self.location,
            site: (!self.site.is_empty()).then_some(self.site),
            job_url: self.job_url,
            observed_at,
        })
    }

    pub fn fields(&self) -> [&str; 7] {
        [
            &self.key,
            &self.title,
            &self.company,
            &self.location,
            &self.site,
            &self.job_url,
            &self.date_added,
        ]
    }

    pub fn from_fields<'a>(mut fields: impl Iterator<Item = &'a str>) -> Self {
        let mut next = || fields.next().unwrap_or_default().to_string();
        Self {
            key: next(),
            title: next(),
            company: next(),
            location: next(),
            site: next(),
            job_url: next(),
            date_added: next(),
        }
    }
}

/// Encode a batch headed for `append`.
///
/// Every record must be keyed and no identity may repeat within the batch.
pub fn encode_batch(records: &[ListingRecord], policy: IdentityPolicy) -> Result<Vec<StoredRow>> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let row = StoredRow::encode(record, policy)?;
        if !seen.insert(row.key.clone()) {
            return Err(AppError::integrity(row.key, "identity repeated within one append"));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Decode rows, dropping those whose timestamp does not parse.
pub fn decode_rows(rows: Vec<StoredRow>, policy: IdentityPolicy) -> Vec<ListingRecord> {
    rows.into_iter()
        .filter_map(|row| {
            let key = row.key.clone();
            match row.decode(policy) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping stored listing {}: {}", key, e);
                    None
                }
            }
        })
        .collect()
}

/// Newest first; ties keep their stored order.
pub fn sort_newest_first(records: &mut [ListingRecord]) {
    records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
}
