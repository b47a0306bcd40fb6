//! Collect-cycle orchestration: batch validation, similarity dedup, upsert
//! reconciliation, retention, and cron scheduling.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jobradar_core::{Offer, ScrapedOffer};
use jobradar_store::{IdentityKey, OfferStore, OfferWrite, StoreError, UpsertOutcome};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobradar-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub queries_path: PathBuf,
    pub fixtures_dir: PathBuf,
    pub dedup: DedupConfig,
    pub retention_days: i64,
    pub scheduler_enabled: bool,
    pub collect_cron: String,
    pub purge_cron: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            queries_path: std::env::var("JOBRADAR_QUERIES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("queries.yaml")),
            fixtures_dir: std::env::var("JOBRADAR_FIXTURES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("fixtures")),
            dedup: DedupConfig {
                company_threshold: env_f64("JOBRADAR_COMPANY_THRESHOLD", 0.80),
                role_threshold: env_f64("JOBRADAR_ROLE_THRESHOLD", 0.80),
            },
            retention_days: std::env::var("JOBRADAR_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            scheduler_enabled: std::env::var("JOBRADAR_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            // Monday and Thursday mornings, like the original collection DAG.
            collect_cron: std::env::var("JOBRADAR_COLLECT_CRON")
                .unwrap_or_else(|_| "0 0 5 * * Mon,Thu".to_string()),
            purge_cron: std::env::var("JOBRADAR_PURGE_CRON")
                .unwrap_or_else(|_| "0 0 3 * * *".to_string()),
        }
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Search queries driving collection, one crawl batch per enabled query.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRegistry {
    pub queries: Vec<QueryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub query: String,
    pub enabled: bool,
}

impl QueryRegistry {
    pub async fn load(path: &PathBuf) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Independent thresholds for the two similarity signals. Both default to
/// 0.80; the single-threshold variant is the degenerate case with both equal.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub company_threshold: f64,
    pub role_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            company_threshold: 0.80,
            role_threshold: 0.80,
        }
    }
}

/// Similarity ratio between two raw strings, case-insensitive and trimmed.
/// 1.0 means identical. Raw strings on purpose: normalization is for
/// storage and indexing, and would erase distinctions (e.g. "Senior") the
/// duplicate decision needs.
pub fn similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

/// Collapse near-duplicates within one crawl batch, preserving order; the
/// first occurrence wins. An incoming offer is dropped when some already
/// kept offer has company and role similarity above both thresholds AND both
/// offers carry listing URLs that differ (the same employer/role posted on
/// two sites). Two URL-less offers are never deduped against each other:
/// without URLs they cannot be told apart from a re-scrape, so they are
/// conservatively kept.
pub fn deduplicate(offers: Vec<Offer>, config: &DedupConfig) -> Vec<Offer> {
    if offers.is_empty() {
        return offers;
    }

    let total = offers.len();
    let mut kept: Vec<Offer> = Vec::with_capacity(total);

    for offer in offers {
        let duplicate_of = kept.iter().find(|existing| {
            let company_similarity = similarity(&offer.employer_name, &existing.employer_name);
            let role_similarity = similarity(&offer.role_title, &existing.role_title);
            let urls_present_and_distinct = match (&offer.listing_url, &existing.listing_url) {
                (Some(a), Some(b)) => !a.is_empty() && !b.is_empty() && a != b,
                _ => false,
            };
            company_similarity >= config.company_threshold
                && role_similarity >= config.role_threshold
                && urls_present_and_distinct
        });

        match duplicate_of {
            Some(existing) => {
                info!(
                    employer = %offer.employer_name,
                    role = %offer.role_title,
                    kept_employer = %existing.employer_name,
                    kept_role = %existing.role_title,
                    "dropping duplicate offer"
                );
            }
            None => kept.push(offer),
        }
    }

    let removed = total - kept.len();
    if removed > 0 {
        info!(removed, kept = kept.len(), "batch dedup finished");
    }
    kept
}

/// Per-batch reconciliation counters, aggregated by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub created: u64,
    pub updated: u64,
    pub errors: u64,
}

impl BatchSummary {
    pub fn absorb(&mut self, other: BatchSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.errors += other.errors;
    }
}

/// Merge a deduplicated batch into the store, one atomic upsert per offer.
/// A failed write is logged with enough context for manual follow-up and
/// counted; the rest of the batch continues. Only a store-level outage
/// aborts the cycle.
pub async fn reconcile_batch(
    store: &dyn OfferStore,
    offers: &[Offer],
) -> Result<BatchSummary, StoreError> {
    let mut summary = BatchSummary::default();

    for offer in offers {
        let key = IdentityKey::for_offer(offer);
        let write = OfferWrite::from_offer(offer);
        match store.upsert(&key, write, Utc::now()).await {
            Ok(UpsertOutcome::Created(id)) => {
                debug!(%id, %key, "offer created");
                summary.created += 1;
            }
            Ok(UpsertOutcome::Updated(id)) => {
                debug!(%id, %key, "offer updated");
                summary.updated += 1;
            }
            Err(StoreError::Write { key, reason }) => {
                warn!(
                    employer = %offer.employer_name,
                    role = %offer.role_title,
                    %key,
                    %reason,
                    "offer write failed, continuing batch"
                );
                summary.errors += 1;
            }
            Err(err @ StoreError::Unavailable(_)) => return Err(err),
        }
    }

    Ok(summary)
}

/// Delete offers older than the retention window. Runs as its own scheduled
/// maintenance job, independent of collection.
pub async fn purge_expired(store: &dyn OfferStore, retention_days: i64) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let deleted = store.delete_created_before(cutoff).await?;
    if deleted > 0 {
        info!(deleted, retention_days, "purged expired offers");
    }
    Ok(deleted)
}

/// External crawler/search collaborator: given a search query, produce one
/// batch of raw offer records. The real implementation shells out to a
/// search API plus an LLM-driven crawler; tests and the CLI use the
/// fixture-file source below.
#[async_trait::async_trait]
pub trait OfferSource: Send + Sync {
    async fn collect(&self, query: &str) -> Result<Vec<ScrapedOffer>>;
}

/// Fixture-first source: reads `<dir>/<query-slug>.json`, a JSON array of
/// raw offer records captured from a real crawl.
pub struct FixtureOfferSource {
    dir: PathBuf,
}

impl FixtureOfferSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn slug(query: &str) -> String {
        let slug = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>();
        slug.split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[async_trait::async_trait]
impl OfferSource for FixtureOfferSource {
    async fn collect(&self, query: &str) -> Result<Vec<ScrapedOffer>> {
        let path = self.dir.join(format!("{}.json", Self::slug(query)));
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }
}

/// Outcome of one collect cycle across all enabled queries.
#[derive(Debug, Clone, Serialize)]
pub struct CollectRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub queries_run: usize,
    pub scraped: usize,
    pub kept_after_dedup: usize,
    pub created: u64,
    pub updated: u64,
    pub errors: u64,
}

pub struct CollectPipeline {
    config: SyncConfig,
    source: Box<dyn OfferSource>,
    store: Arc<dyn OfferStore>,
}

impl CollectPipeline {
    pub fn new(config: SyncConfig, source: Box<dyn OfferSource>, store: Arc<dyn OfferStore>) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One full cycle: per enabled query, collect a batch from the source,
    /// validate at the boundary, dedup within the batch, reconcile against
    /// the store. A query whose collection fails is logged and skipped; a
    /// store outage fails the whole cycle.
    pub async fn run_once(&self) -> Result<CollectRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let registry = QueryRegistry::load(&self.config.queries_path).await?;
        let enabled: Vec<_> = registry.queries.into_iter().filter(|q| q.enabled).collect();

        let mut scraped = 0usize;
        let mut kept_after_dedup = 0usize;
        let mut totals = BatchSummary::default();

        for query in &enabled {
            info!(%run_id, query = %query.query, "collecting offers");
            let batch = match self.source.collect(&query.query).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(query = %query.query, error = %err, "collection failed, skipping query");
                    continue;
                }
            };
            scraped += batch.len();

            let offers: Vec<Offer> = batch.into_iter().map(Offer::from_scraped).collect();
            let offers = deduplicate(offers, &self.config.dedup);
            kept_after_dedup += offers.len();

            let summary = reconcile_batch(self.store.as_ref(), &offers)
                .await
                .context("reconciling batch against offer store")?;
            info!(
                query = %query.query,
                created = summary.created,
                updated = summary.updated,
                errors = summary.errors,
                "query cycle finished"
            );
            totals.absorb(summary);
        }

        Ok(CollectRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            queries_run: enabled.len(),
            scraped,
            kept_after_dedup,
            created: totals.created,
            updated: totals.updated,
            errors: totals.errors,
        })
    }
}

/// Wire the collect and purge jobs onto a cron scheduler when enabled by
/// configuration. The caller keeps the returned scheduler alive.
pub async fn maybe_build_scheduler(pipeline: Arc<CollectPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config().scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let collect_cron = pipeline.config().collect_cron.clone();
    let collect_pipeline = pipeline.clone();
    let collect_job = Job::new_async(collect_cron.as_str(), move |_uuid, _lock| {
        let pipeline = collect_pipeline.clone();
        Box::pin(async move {
            match pipeline.run_once().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    created = summary.created,
                    updated = summary.updated,
                    errors = summary.errors,
                    "scheduled collect cycle finished"
                ),
                Err(err) => warn!(error = %err, "scheduled collect cycle failed"),
            }
        })
    })
    .with_context(|| format!("creating collect job for cron {collect_cron}"))?;
    sched.add(collect_job).await.context("adding collect job")?;

    let purge_cron = pipeline.config().purge_cron.clone();
    let retention_days = pipeline.config().retention_days;
    let purge_pipeline = pipeline.clone();
    let purge_job = Job::new_async(purge_cron.as_str(), move |_uuid, _lock| {
        let pipeline = purge_pipeline.clone();
        Box::pin(async move {
            if let Err(err) = purge_expired(pipeline.store.as_ref(), retention_days).await {
                warn!(error = %err, "scheduled purge failed");
            }
        })
    })
    .with_context(|| format!("creating purge job for cron {purge_cron}"))?;
    sched.add(purge_job).await.context("adding purge job")?;

    Ok(Some(sched))
}
