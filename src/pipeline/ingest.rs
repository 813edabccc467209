// src/pipeline/ingest.rs

//! One ingestion run: fetch → reconcile → persist → notify.
//!
//! The run moves linearly through [`RunStage`]s and logs exactly one entry per
//! transition under the `jobwatch::run` target. A fetch problem ends the run
//! successfully with nothing new; a storage problem fails it before any
//! notification goes out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{
    Config, ListingRecord, NotifyTally, RawListing, RunReport, RunStage, RunState, SearchQuery,
};
use crate::pipeline::reconcile::Reconciler;
use crate::services::notify::Notifier;
use crate::services::source::{self, ListingSource};
use crate::storage::{self, ListingStore};

const LOG_TARGET: &str = "jobwatch::run";

/// Tracks stage, counters and elapsed time for one run.
struct RunTracker {
    started: Instant,
    stage: RunStage,
    fetched: usize,
    new_records: usize,
    duplicates: usize,
    unkeyed: usize,
    notify: NotifyTally,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            stage: RunStage::Idle,
            fetched: 0,
            new_records: 0,
            duplicates: 0,
            unkeyed: 0,
            notify: NotifyTally::default(),
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// Move to `next`, logging one entry.
    fn advance(&mut self, next: RunStage, detail: &str) {
        log::info!(
            target: LOG_TARGET,
            "stage={} from={} {} elapsed_ms={}",
            next,
            self.stage,
            detail,
            self.elapsed_ms()
        );
        self.stage = next;
    }

    fn done(mut self, detail: &str) -> RunReport {
        self.advance(RunStage::Done, detail);
        self.report(RunState::Done)
    }

    fn fail(self, error: AppError) -> RunReport {
        log::error!(
            target: LOG_TARGET,
            "stage=failed from={} fetched={} new={} reason=\"{}\" elapsed_ms={}",
            self.stage,
            self.fetched,
            self.new_records,
            error,
            self.elapsed_ms()
        );
        let stage = self.stage;
        self.report(RunState::Failed {
            stage,
            reason: error.to_string(),
        })
    }

    fn report(self, state: RunState) -> RunReport {
        RunReport {
            state,
            fetched: self.fetched,
            new_records: self.new_records,
            duplicates: self.duplicates,
            unkeyed: self.unkeyed,
            notify: self.notify,
            elapsed: self.started.elapsed(),
        }
    }
}

/// The ingestion pipeline with its collaborators.
pub struct Pipeline {
    config: Arc<Config>,
    source: Arc<dyn ListingSource>,
    notifier: Notifier,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, source: Arc<dyn ListingSource>, notifier: Notifier) -> Self {
        Self {
            config,
            source,
            notifier,
        }
    }

    /// Build the source and notifier described by `config`.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let source = source::from_config(&config.source)?;
        let notifier = Notifier::from_config(&config.notify, &config.source.user_agent)?;
        Ok(Self::new(config, source, notifier))
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.source.timeout_secs)
    }

    /// Fetch one batch, bounded by the configured timeout.
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawListing>> {
        let timeout = self.fetch_timeout();
        match tokio::time::timeout(timeout, self.source.fetch(query)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(
                format!("fetch from {}", self.source.name()),
                timeout.as_secs(),
            )),
        }
    }

    /// Execute one run against an open store.
    pub async fn run(&self, store: &mut dyn ListingStore) -> RunReport {
        let mut tracker = RunTracker::new();
        let query = SearchQuery::from(&self.config.scraping);

        tracker.advance(
            RunStage::Fetching,
            &format!(
                "source=\"{}\" term=\"{}\" location=\"{}\" sites={}",
                self.source.name(),
                query.search_term,
                query.location,
                query.sites.join(",")
            ),
        );

        let raw = match self.fetch(&query).await {
            Ok(raw) if raw.is_empty() => {
                log::warn!("No listings found for '{}'", query.search_term);
                return tracker.done("fetched=0 new=0 reason=\"empty batch\"");
            }
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Fetching listings failed: {}", e);
                return tracker.done(&format!("fetched=0 new=0 reason=\"{}\"", e));
            }
        };

        // One ingestion timestamp for the whole batch.
        let observed_at = Utc::now();
        let batch: Vec<ListingRecord> = raw
            .into_iter()
            .map(|listing| ListingRecord::observed(listing, observed_at))
            .collect();
        tracker.fetched = batch.len();

        tracker.advance(
            RunStage::Reconciling,
            &format!("fetched={} policy={}", batch.len(), store.policy()),
        );
        let known = match store.existing_identities().await {
            Ok(known) => known,
            Err(e) => return tracker.fail(e),
        };
        let outcome = Reconciler::new(store.policy()).reconcile(&batch, &known);
        tracker.duplicates = outcome.duplicate_count;
        tracker.unkeyed = outcome.unkeyed_count;

        let summary = format!(
            "known={} new={} duplicates={} unkeyed={}",
            known.len(),
            outcome.new_records.len(),
            outcome.duplicate_count,
            outcome.unkeyed_count
        );
        if !outcome.has_new() {
            return tracker.done(&summary);
        }

        tracker.advance(RunStage::Persisting, &summary);
        let inserted = match store.append(&outcome.new_records).await {
            Ok(inserted) => inserted,
            Err(e) => return tracker.fail(e),
        };
        // Listings an overlapping run stored first count as duplicates.
        tracker.duplicates += outcome.new_records.len().saturating_sub(inserted.len());
        tracker.new_records = inserted.len();
        if inserted.is_empty() {
            let detail = format!(
                "persisted=0 duplicates={} reason=\"stored by another run\"",
                tracker.duplicates
            );
            return tracker.done(&detail);
        }

        tracker.advance(
            RunStage::Notifying,
            &format!("persisted={} sink={}", tracker.new_records, self.notifier.has_sink()),
        );
        for record in &inserted {
            let result = self.notifier.notify(record).await;
            tracker.notify.record(&result);
        }

        let summary = format!(
            "new={} sent={} skipped={} failed={}",
            tracker.new_records, tracker.notify.sent, tracker.notify.skipped, tracker.notify.failed
        );
        tracker.done(&summary)
    }
}

/// Build everything from `config`, run once, and close the store.
pub async fn run_pipeline(config: Arc<Config>) -> RunReport {
    let pipeline = match Pipeline::from_config(Arc::clone(&config)) {
        Ok(pipeline) => pipeline,
        Err(e) => return RunTracker::new().fail(e),
    };

    let mut store = match storage::open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => return RunTracker::new().fail(e),
    };

    let report = pipeline.run(store.as_mut()).await;

    if let Err(e) = store.close().await {
        log::warn!("Closing store failed: {}", e);
    }
    report
}
