//! Persistent-store collaborator seam for Job Offer Radar.
//!
//! The reconciler only ever asks the store for one primitive: an atomic
//! find-one-and-update with upsert semantics, keyed by [`IdentityKey`]. The
//! in-memory implementation here backs tests and the CLI; a database-backed
//! implementation plugs in behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jobradar_core::{extract_domain, normalize_city, normalize_company, Offer, StoredOffer, SENTINEL};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobradar-store";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Per-offer write failure. The caller logs it, counts it, and moves on
    /// to the next offer in the batch.
    #[error("write failed for {key}: {reason}")]
    Write { key: IdentityKey, reason: String },
    /// The store itself is unreachable. No per-offer retry is meaningful;
    /// the whole cycle fails.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup filter used to decide between update-in-place and insert-as-new.
/// A non-empty listing URL is authoritative; offers without one fall back to
/// the exact role/employer/location triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKey {
    ListingUrl(String),
    Fields {
        role_title: String,
        employer_name: String,
        location: Option<String>,
    },
}

impl IdentityKey {
    pub fn for_offer(offer: &Offer) -> Self {
        match offer.listing_url.as_deref() {
            Some(url) if !url.is_empty() => Self::ListingUrl(url.to_string()),
            _ => Self::Fields {
                role_title: offer.role_title.clone(),
                employer_name: offer.employer_name.clone(),
                location: offer.location.clone(),
            },
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListingUrl(url) => write!(f, "url={url}"),
            Self::Fields {
                role_title,
                employer_name,
                location,
            } => write!(
                f,
                "role={role_title} employer={employer_name} location={}",
                location.as_deref().unwrap_or(SENTINEL)
            ),
        }
    }
}

/// Mutable fields written unconditionally on every upsert. `created_at` is
/// not here on purpose; the store sets it on insert only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferWrite {
    pub role_title: String,
    pub employer_name: String,
    pub location: Option<String>,
    pub posting_date: Option<String>,
    pub listing_url: Option<String>,
    pub source_page_url: Option<String>,
    pub normalized_employer: String,
    pub normalized_location: String,
    pub normalized_source_site: String,
}

impl OfferWrite {
    /// Derive the write payload from a validated offer. Raw strings are kept
    /// untouched; normalized forms are computed here, at the storage
    /// boundary, never earlier.
    pub fn from_offer(offer: &Offer) -> Self {
        let source_for_site = offer
            .listing_url
            .as_deref()
            .or(offer.source_page_url.as_deref())
            .unwrap_or_default();

        Self {
            role_title: offer.role_title.clone(),
            employer_name: offer.employer_name.clone(),
            location: offer.location.clone(),
            posting_date: offer.posting_date.clone(),
            listing_url: offer.listing_url.clone(),
            source_page_url: offer.source_page_url.clone(),
            normalized_employer: normalize_company(&offer.employer_name),
            normalized_location: normalize_city(offer.location.as_deref().unwrap_or_default()),
            normalized_source_site: extract_domain(source_for_site),
        }
    }
}

/// Whether an upsert created a new record or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Uuid),
    Updated(Uuid),
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Updated(id) => *id,
        }
    }
}

/// Store counts surfaced for diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub total_offers: u64,
    pub recent_offers: u64,
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Atomic find-one-and-update with upsert. Sets every mutable field and
    /// `updated_at` unconditionally; sets `created_at` only when inserting.
    async fn upsert(
        &self,
        key: &IdentityKey,
        write: OfferWrite,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn find(&self, key: &IdentityKey) -> Result<Option<StoredOffer>, StoreError>;

    /// Total offers plus offers created within the trailing `recent_days`.
    async fn stats(&self, recent_days: i64) -> Result<StoreStats, StoreError>;

    /// Retention maintenance: delete offers created before the cutoff.
    /// Returns the number of deleted records.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory store. A single mutex over the record map gives the same
/// atomic find-and-modify guarantee the reconciler expects from a real
/// database collection.
#[derive(Debug, Default)]
pub struct MemoryOfferStore {
    records: Mutex<HashMap<Uuid, StoredOffer>>,
}

impl MemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<StoredOffer> {
        let records = self.records.lock().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        all
    }
}

fn matches_key(record: &StoredOffer, key: &IdentityKey) -> bool {
    match key {
        IdentityKey::ListingUrl(url) => record.listing_url.as_deref() == Some(url.as_str()),
        IdentityKey::Fields {
            role_title,
            employer_name,
            location,
        } => {
            record.role_title == *role_title
                && record.employer_name == *employer_name
                && record.location == *location
        }
    }
}

#[async_trait]
impl OfferStore for MemoryOfferStore {
    async fn upsert(
        &self,
        key: &IdentityKey,
        write: OfferWrite,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut records = self.records.lock().await;

        if let Some(existing) = records.values_mut().find(|r| matches_key(r, key)) {
            existing.role_title = write.role_title;
            existing.employer_name = write.employer_name;
            existing.location = write.location;
            existing.posting_date = write.posting_date;
            existing.listing_url = write.listing_url;
            existing.source_page_url = write.source_page_url;
            existing.normalized_employer = write.normalized_employer;
            existing.normalized_location = write.normalized_location;
            existing.normalized_source_site = write.normalized_source_site;
            existing.updated_at = now;
            return Ok(UpsertOutcome::Updated(existing.id));
        }

        let id = Uuid::new_v4();
        records.insert(
            id,
            StoredOffer {
                id,
                role_title: write.role_title,
                employer_name: write.employer_name,
                location: write.location,
                posting_date: write.posting_date,
                listing_url: write.listing_url,
                source_page_url: write.source_page_url,
                normalized_employer: write.normalized_employer,
                normalized_location: write.normalized_location,
                normalized_source_site: write.normalized_source_site,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(UpsertOutcome::Created(id))
    }

    async fn find(&self, key: &IdentityKey) -> Result<Option<StoredOffer>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.values().find(|r| matches_key(r, key)).cloned())
    }

    async fn stats(&self, recent_days: i64) -> Result<StoreStats, StoreError> {
        let records = self.records.lock().await;
        let cutoff = Utc::now() - Duration::days(recent_days);
        Ok(StoreStats {
            total_offers: records.len() as u64,
            recent_offers: records.values().filter(|r| r.created_at >= cutoff).count() as u64,
        })
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
