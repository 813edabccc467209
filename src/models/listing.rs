//! Listing data structures and the identity rule used for deduplication.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between composite key components.
const KEY_SEPARATOR: &[u8] = b"\x1f";

/// How a store decides whether two listings are the same listing.
///
/// A store is created under one policy and keeps it for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Upstream identifier string used as primary key
    #[default]
    StableId,
    /// Hash of `(title, company, location)`
    Composite,
}

impl IdentityPolicy {
    /// Name persisted alongside the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityPolicy::StableId => "stable_id",
            IdentityPolicy::Composite => "composite",
        }
    }

    /// Parse a persisted policy name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stable_id" => Some(IdentityPolicy::StableId),
            "composite" => Some(IdentityPolicy::Composite),
            _ => None,
        }
    }

    /// Column name holding the identity in the exposed layout.
    pub fn key_column(&self) -> &'static str {
        match self {
            IdentityPolicy::StableId => "id",
            IdentityPolicy::Composite => "key",
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity value of a listing under a given policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingKey(String);

impl ListingKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Composite key over title, company and location.
    ///
    /// Empty components are valid, so listings with all three fields empty
    /// collapse onto the same key.
    pub fn composite(title: &str, company: &str, location: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(KEY_SEPARATOR);
        hasher.update(company.as_bytes());
        hasher.update(KEY_SEPARATOR);
        hasher.update(location.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A listing as returned by a source, before ingestion.
///
/// Upstream frames contain nulls, so every text field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RawListing {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub job_url: Option<String>,
}

/// One observed job posting, stamped with its ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingRecord {
    /// Upstream identifier, if the source supplied one
    pub id: Option<String>,

    /// Job title
    pub title: String,

    /// Employer name
    pub company: String,

    /// Location as given upstream, never normalized
    pub location: String,

    /// Site that produced the record
    pub site: Option<String>,

    /// Link to the original posting
    pub job_url: String,

    /// When the pipeline first pulled this listing in
    pub observed_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Stamp a raw listing with the ingestion time.
    pub fn observed(raw: RawListing, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: raw.id.filter(|id| !id.trim().is_empty()),
            title: raw.title.unwrap_or_default(),
            company: raw.company.unwrap_or_default(),
            location: raw.location.unwrap_or_default(),
            site: raw.site.filter(|s| !s.is_empty()),
            job_url: raw.job_url.unwrap_or_default(),
            observed_at,
        }
    }

    /// Identity under `policy`, or `None` when the record cannot be keyed.
    pub fn identity(&self, policy: IdentityPolicy) -> Option<ListingKey> {
        match policy {
            IdentityPolicy::StableId => self
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ListingKey::new),
            IdentityPolicy::Composite => Some(ListingKey::composite(
                &self.title,
                &self.company,
                &self.location,
            )),
        }
    }

    /// Whether two records are the same listing under `policy`.
    pub fn same_listing(&self, other: &ListingRecord, policy: IdentityPolicy) -> bool {
        match (self.identity(policy), other.identity(policy)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Format the record using a template.
    ///
    /// Supported placeholders:
    /// - `{id}`, `{title}`, `{company}`, `{location}`
    /// - `{site}`, `{job_url}`, `{date_added}`
    pub fn format(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 64);
        let mut rest = template;

        // Values are written once and never rescanned for placeholders.
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = tail
                .find('}')
                .and_then(|close| self.placeholder(&tail[1..close]).map(|v| (close, v)));
            match value {
                Some((close, value)) => {
                    out.push_str(&value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn placeholder(&self, name: &str) -> Option<String> {
        let value = match name {
            "id" => self.id.clone().unwrap_or_default(),
            "title" => self.title.clone(),
            "company" => self.company.clone(),
            "location" => self.location.clone(),
            "site" => self.site.clone().unwrap_or_default(),
            "job_url" => self.job_url.clone(),
            "date_added" => self.observed_at.to_rfc3339(),
            _ => return None,
        };
        Some(value)
    }
}
