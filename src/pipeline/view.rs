// src/pipeline/view.rs

//! Read-only view over the stored listings.
//!
//! Opens the store without write access, filters in memory and computes a few
//! aggregate counts for display.

use std::collections::{BTreeSet, HashMap};

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::error::Result;
use crate::models::{ListingRecord, StoreConfig};
use crate::storage;

/// Filter applied to the view. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Case-insensitive substring of the company
    pub company: Option<String>,
    /// Exact location values to keep
    pub locations: Vec<String>,
}

impl ViewFilter {
    pub fn matches(&self, record: &ListingRecord) -> bool {
        contains_ci(&record.title, self.title.as_deref())
            && contains_ci(&record.company, self.company.as_deref())
            && (self.locations.is_empty() || self.locations.iter().any(|l| *l == record.location))
    }
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim) {
        None | Some("") => true,
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
    }
}

/// Aggregate counts over a set of listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewStats {
    pub total: usize,
    /// Listings observed on the reference date
    pub today: usize,
    pub top_company: Option<(String, usize)>,
    pub top_location: Option<(String, usize)>,
}

impl ViewStats {
    /// Compute stats with `today` as the reference date (local time).
    pub fn compute<'a, I>(records: I, today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a ListingRecord>,
    {
        let mut stats = Self::default();
        let mut companies = Tally::default();
        let mut locations = Tally::default();

        for record in records {
            stats.total += 1;
            if record.observed_at.with_timezone(&Local).date_naive() == today {
                stats.today += 1;
            }
            companies.add(&record.company);
            locations.add(&record.location);
        }

        stats.top_company = companies.top();
        stats.top_location = locations.top();
        stats
    }
}

/// Counts values, remembering first-seen order for tie breaks.
#[derive(Default)]
struct Tally<'a> {
    order: Vec<&'a str>,
    counts: HashMap<&'a str, usize>,
}

impl<'a> Tally<'a> {
    fn add(&mut self, value: &'a str) {
        if value.is_empty() {
            return;
        }
        let count = self.counts.entry(value).or_insert(0);
        if *count == 0 {
            self.order.push(value);
        }
        *count += 1;
    }

    fn top(&self) -> Option<(String, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for &value in &self.order {
            let count = self.counts[value];
            if best.is_none_or(|(_, n)| count > n) {
                best = Some((value, count));
            }
        }
        best.map(|(value, count)| (value.to_string(), count))
    }
}

/// All stored listings, newest first.
#[derive(Debug, Clone, Default)]
pub struct ListingView {
    records: Vec<ListingRecord>,
}

impl ListingView {
    pub fn new(records: Vec<ListingRecord>) -> Self {
        Self { records }
    }

    /// Load the configured store read-only.
    ///
    /// A store that does not exist yet gives an empty view.
    pub async fn load(config: &StoreConfig) -> Result<Self> {
        let Some(reader) = storage::open_reader(config).await? else {
            log::warn!(
                "No stored listings at {}; run the pipeline first",
                config.path.display()
            );
            return Ok(Self::default());
        };
        let records = reader.load_all().await?;
        log::debug!("Loaded {} listings from {}", records.len(), config.path.display());
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Listings matching `filter`, order preserved.
    pub fn filter<'a>(&'a self, filter: &'a ViewFilter) -> impl Iterator<Item = &'a ListingRecord> {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    /// Distinct non-empty locations, sorted.
    pub fn locations(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.location.as_str())
            .filter(|l| !l.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Headline stats over every stored listing; filters do not apply.
    pub fn stats(&self) -> ViewStats {
        ViewStats::compute(&self.records, Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentityPolicy, RawListing, StoreBackend};
    use crate::storage::{ListingStore, SqliteStore};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn record(id: &str, title: &str, company: &str, location: &str, at: DateTime<Utc>) -> ListingRecord {
        ListingRecord::observed(
            RawListing {
                id: Some(id.into()),
                title: Some(title.into()),
                company: Some(company.into()),
                location: Some(location.into()),
                site: Some("indeed".into()),
                job_url: Some(format!("https://example.com/{id}")),
            },
            at,
        )
    }

    fn sample() -> ListingView {
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        ListingView::new(vec![
            record("4", "Senior Rust Engineer", "Acme", "Remote", t),
            record("3", "Data Analyst", "Globex", "NYC", t - Duration::hours(1)),
            record("2", "Rust Developer", "Globex", "Remote", t - Duration::days(2)),
            record("1", "Designer", "Initech", "Austin", t - Duration::days(3)),
        ])
    }

    fn ids<'a>(records: impl Iterator<Item = &'a ListingRecord>) -> Vec<&'a str> {
        records.filter_map(|r| r.id.as_deref()).collect()
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let view = sample();
        assert_eq!(ids(view.filter(&ViewFilter::default())), vec!["4", "3", "2", "1"]);
    }

    #[test]
    fn test_text_filters_are_case_insensitive() {
        let view = sample();
        let filter = ViewFilter {
            title: Some("rust".into()),
            company: Some("GLOBEX".into()),
            ..ViewFilter::default()
        };
        assert_eq!(ids(view.filter(&filter)), vec!["2"]);
    }

    #[test]
    fn test_location_is_exact_membership() {
        let view = sample();
        let filter = ViewFilter {
            locations: vec!["Remote".into(), "Austin".into()],
            ..ViewFilter::default()
        };
        assert_eq!(ids(view.filter(&filter)), vec!["4", "2", "1"]);

        let partial = ViewFilter {
            locations: vec!["remote".into()],
            ..ViewFilter::default()
        };
        assert_eq!(view.filter(&partial).count(), 0);
    }

    #[test]
    fn test_stats() {
        let view = sample();
        let today = Utc
            .with_ymd_and_hms(2025, 6, 2, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local)
            .date_naive();
        let stats = ViewStats::compute(view.records(), today);

        assert_eq!(stats.total, 4);
        assert!(stats.today >= 1);
        assert_eq!(stats.top_company, Some(("Globex".into(), 2)));
        assert_eq!(stats.top_location, Some(("Remote".into(), 2)));
    }

    #[test]
    fn test_view_stats_cover_whole_store() {
        let view = sample();
        let narrow = ViewFilter {
            company: Some("initech".into()),
            ..ViewFilter::default()
        };
        assert_eq!(view.filter(&narrow).count(), 1);

        let stats = view.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.top_company, Some(("Globex".into(), 2)));
    }

    #[test]
    fn test_stats_tie_goes_to_first_seen() {
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let records = [
            record("2", "A", "Globex", "NYC", t),
            record("1", "B", "Acme", "Austin", t),
        ];
        let stats = ViewStats::compute(&records, t.date_naive());
        assert_eq!(stats.top_company, Some(("Globex".into(), 1)));
        assert_eq!(stats.top_location, Some(("NYC".into(), 1)));
    }

    #[test]
    fn test_locations_are_distinct_and_sorted() {
        assert_eq!(sample().locations(), vec!["Austin", "NYC", "Remote"]);
    }

    #[tokio::test]
    async fn test_missing_store_is_empty_view() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path: tmp.path().join("jobs.db"),
            identity: IdentityPolicy::StableId,
            lock_timeout_secs: 1,
        };
        let view = ListingView::load(&config).await.unwrap();
        assert!(view.is_empty());
        assert!(!config.path.exists());
    }

    #[tokio::test]
    async fn test_load_reads_store_newest_first() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobs.db");
        let mut store = SqliteStore::open(&path, IdentityPolicy::StableId, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        let t = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        store
            .append(&[record("old", "A", "Acme", "NYC", t - Duration::days(1))])
            .await
            .unwrap();
        store.append(&[record("new", "B", "Acme", "NYC", t)]).await.unwrap();
        store.close().await.unwrap();

        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path,
            identity: IdentityPolicy::StableId,
            lock_timeout_secs: 1,
        };
        let view = ListingView::load(&config).await.unwrap();
        assert_eq!(ids(view.records().iter()), vec!["new", "old"]);
    }
}
