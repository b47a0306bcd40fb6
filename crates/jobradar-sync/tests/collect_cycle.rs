//! End-to-end collect cycle: fixture source -> boundary validation ->
//! dedup -> reconciliation against the in-memory store.

use std::sync::Arc;

use jobradar_store::{MemoryOfferStore, OfferStore};
use jobradar_sync::{
    CollectPipeline, DedupConfig, FixtureOfferSource, SyncConfig,
};

const FIXTURE: &str = r#"[
  {"role_title": "Développeur Python", "employer_name": "Google",
   "listing_url": "https://site1.com/job1", "location": "69001 Lyon"},
  {"role_title": "Développeur Python Senior", "employer_name": "Google Inc",
   "listing_url": "https://site2.com/job2", "location": "Lyon"},
  {"role_title": "Data Scientist", "employer_name": "Microsoft",
   "listing_url": "https://site3.com/job3"},
  {"role_title": "iOS Developer", "employer_name": "Apple",
   "source_page_url": "https://www.site4.com/listing"},
  {"employer_name": "Mystère SARL"}
]"#;

fn test_config(dir: &std::path::Path) -> SyncConfig {
    SyncConfig {
        queries_path: dir.join("queries.yaml"),
        fixtures_dir: dir.join("fixtures"),
        dedup: DedupConfig::default(),
        retention_days: 7,
        scheduler_enabled: false,
        collect_cron: "0 0 5 * * Mon,Thu".to_string(),
        purge_cron: "0 0 3 * * *".to_string(),
    }
}

#[tokio::test]
async fn collect_cycle_dedups_and_reconciles_a_fixture_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("queries.yaml"),
        "queries:\n  - query: data scientist lyon\n    enabled: true\n  - query: disabled query\n    enabled: false\n",
    )
    .expect("write registry");

    let fixtures = dir.path().join("fixtures");
    std::fs::create_dir_all(&fixtures).expect("fixtures dir");
    std::fs::write(fixtures.join("data-scientist-lyon.json"), FIXTURE).expect("write fixture");

    let config = test_config(dir.path());
    let store = Arc::new(MemoryOfferStore::new());
    let pipeline = CollectPipeline::new(
        config,
        Box::new(FixtureOfferSource::new(&fixtures)),
        store.clone(),
    );

    let summary = pipeline.run_once().await.expect("first cycle");
    assert_eq!(summary.queries_run, 1);
    assert_eq!(summary.scraped, 5);
    // The Google Inc offer collapses onto the Google one; everything else
    // survives, including the URL-less record.
    assert_eq!(summary.kept_after_dedup, 4);
    assert_eq!(summary.created, 4);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.errors, 0);

    let stored = store.all().await;
    assert_eq!(stored.len(), 4);

    let google = stored
        .iter()
        .find(|o| o.employer_name == "Google")
        .expect("google offer");
    assert_eq!(google.normalized_employer, "GOOGLE");
    assert_eq!(google.normalized_location, "Lyon");
    assert_eq!(google.normalized_source_site, "site1.com");

    let apple = stored
        .iter()
        .find(|o| o.employer_name == "Apple")
        .expect("apple offer");
    // Listing URL fell back to the page the offer was discovered on.
    assert_eq!(apple.listing_url.as_deref(), Some("https://www.site4.com/listing"));
    assert_eq!(apple.normalized_source_site, "site4.com");

    let mystery = stored
        .iter()
        .find(|o| o.employer_name == "Mystère SARL")
        .expect("url-less offer");
    assert_eq!(mystery.role_title, jobradar_core::DEFAULT_ROLE_TITLE);
    assert_eq!(mystery.normalized_employer, "MYSTÈRE");
    assert_eq!(mystery.normalized_location, jobradar_core::SENTINEL);

    // Second identical cycle: everything reconciles as an update, nothing
    // new is created, created_at survives.
    let again = pipeline.run_once().await.expect("second cycle");
    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 4);
    assert_eq!(store.all().await.len(), 4);

    let google_again = store.all().await;
    let google_again = google_again
        .iter()
        .find(|o| o.employer_name == "Google")
        .expect("google offer after update");
    assert_eq!(google_again.created_at, google.created_at);
    assert!(google_again.updated_at >= google.updated_at);
}

#[tokio::test]
async fn store_stats_reflect_reconciled_offers() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("queries.yaml"),
        "queries:\n  - query: data scientist lyon\n    enabled: true\n",
    )
    .expect("write registry");
    let fixtures = dir.path().join("fixtures");
    std::fs::create_dir_all(&fixtures).expect("fixtures dir");
    std::fs::write(fixtures.join("data-scientist-lyon.json"), FIXTURE).expect("write fixture");

    let store = Arc::new(MemoryOfferStore::new());
    let pipeline = CollectPipeline::new(
        test_config(dir.path()),
        Box::new(FixtureOfferSource::new(&fixtures)),
        store.clone(),
    );
    pipeline.run_once().await.expect("cycle");

    let stats = store.stats(7).await.expect("stats");
    assert_eq!(stats.total_offers, 4);
    assert_eq!(stats.recent_offers, 4);
}
