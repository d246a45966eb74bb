//! Persistence and marketplace collaborators for h2credit.

#![deny(unsafe_code)]

use async_trait::async_trait;
use h2credit_core::collaborators::{MarketplaceCollaborator, PersistenceCollaborator};
use h2credit_core::error::H2Error;
use h2credit_core::identity::{Clock, SystemClock};
use h2credit_core::types::{MarketplaceListing, SubmissionReceipt, VerificationSubmission};
use reqwest::Client;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Records the in-memory collaborators keep before dropping the oldest.
pub const DEFAULT_IN_MEMORY_RETENTION: usize = 10_000;

/// Bounded, insertion-ordered record log.
#[derive(Debug)]
struct Retained<T> {
    records: VecDeque<T>,
    capacity: usize,
    accepted: u64,
}

impl<T: Clone> Retained<T> {
    fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            accepted: 0,
        }
    }

    /// Append `record`, returning the oldest one when the log was full.
    fn push(&mut self, record: T) -> Option<T> {
        self.accepted += 1;
        let evicted = if self.records.len() == self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    fn snapshot(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }
}

/// Records verification submissions in memory. Only the most recent
/// [`DEFAULT_IN_MEMORY_RETENTION`] (or the configured retention) are kept.
#[derive(Clone)]
pub struct InMemoryPersistence {
    clock: Arc<dyn Clock>,
    submissions: Arc<Mutex<Retained<VerificationSubmission>>>,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_retention(clock, DEFAULT_IN_MEMORY_RETENTION)
    }

    pub fn with_retention(clock: Arc<dyn Clock>, retention: usize) -> Self {
        Self {
            clock,
            submissions: Arc::new(Mutex::new(Retained::new(retention))),
        }
    }

    pub async fn submissions(&self) -> Vec<VerificationSubmission> {
        self.submissions.lock().await.snapshot()
    }
}

#[async_trait]
impl PersistenceCollaborator for InMemoryPersistence {
    fn name(&self) -> &'static str {
        "in-memory-persistence"
    }

    async fn submit_verification(
        &self,
        submission: &VerificationSubmission,
    ) -> Result<SubmissionReceipt, H2Error> {
        let mut submissions = self.submissions.lock().await;
        if submissions.push(submission.clone()).is_some() {
            debug!(
                retained = submissions.capacity,
                "oldest in-memory verification submission dropped"
            );
        }
        Ok(SubmissionReceipt {
            collaborator: PersistenceCollaborator::name(self).to_string(),
            reference: format!("verification-{}", submissions.accepted),
            acknowledged_at: self.clock.now(),
        })
    }
}

#[derive(Debug)]
struct ListingBook {
    listings: Retained<MarketplaceListing>,
    ids: HashSet<String>,
}

/// Keeps published listings in memory. Duplicate credit ids are refused while the earlier
/// listing is still retained.
#[derive(Clone)]
pub struct InMemoryMarketplace {
    clock: Arc<dyn Clock>,
    book: Arc<Mutex<ListingBook>>,
}

impl Default for InMemoryMarketplace {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_retention(clock, DEFAULT_IN_MEMORY_RETENTION)
    }

    pub fn with_retention(clock: Arc<dyn Clock>, retention: usize) -> Self {
        Self {
            clock,
            book: Arc::new(Mutex::new(ListingBook {
                listings: Retained::new(retention),
                ids: HashSet::new(),
            })),
        }
    }

    pub async fn listings(&self) -> Vec<MarketplaceListing> {
        self.book.lock().await.listings.snapshot()
    }
}

#[async_trait]
impl MarketplaceCollaborator for InMemoryMarketplace {
    fn name(&self) -> &'static str {
        "in-memory-marketplace"
    }

    async fn publish_credit(
        &self,
        listing: &MarketplaceListing,
    ) -> Result<SubmissionReceipt, H2Error> {
        let mut book = self.book.lock().await;
        if !book.ids.insert(listing.id.clone()) {
            return Err(H2Error::submission(
                MarketplaceCollaborator::name(self),
                format!("credit '{}' is already listed", listing.id),
            ));
        }
        if let Some(evicted) = book.listings.push(listing.clone()) {
            book.ids.remove(&evicted.id);
            debug!(credit_id = %evicted.id, "oldest in-memory listing dropped");
        }
        Ok(SubmissionReceipt {
            collaborator: MarketplaceCollaborator::name(self).to_string(),
            reference: listing.id.clone(),
            acknowledged_at: self.clock.now(),
        })
    }
}

/// Deterministic failing persistence useful for chaos testing.
#[derive(Debug, Clone)]
pub struct UnreachablePersistence {
    reason: String,
}

impl UnreachablePersistence {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PersistenceCollaborator for UnreachablePersistence {
    fn name(&self) -> &'static str {
        "unreachable-persistence"
    }

    async fn submit_verification(
        &self,
        _submission: &VerificationSubmission,
    ) -> Result<SubmissionReceipt, H2Error> {
        Err(H2Error::submission(self.name(), self.reason.clone()))
    }
}

/// Deterministic failing marketplace.
#[derive(Debug, Clone)]
pub struct UnreachableMarketplace {
    reason: String,
}

impl UnreachableMarketplace {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MarketplaceCollaborator for UnreachableMarketplace {
    fn name(&self) -> &'static str {
        "unreachable-marketplace"
    }

    async fn publish_credit(
        &self,
        _listing: &MarketplaceListing,
    ) -> Result<SubmissionReceipt, H2Error> {
        Err(H2Error::submission(self.name(), self.reason.clone()))
    }
}

pub const VERIFICATION_SUBMIT_PATH: &str = "/api/verification/submit";
pub const CREATE_CREDIT_PATH: &str = "/api/NGO/create-credit";

/// JSON-over-HTTP poster shared by the HTTP collaborators.
#[derive(Clone)]
struct JsonPoster {
    client: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl JsonPoster {
    fn new(
        collaborator: &str,
        base_url: &str,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, H2Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| H2Error::Config(format!("{collaborator}: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            clock,
        })
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        collaborator: &str,
        path: &str,
        body: &T,
    ) -> Result<SubmissionReceipt, H2Error> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| H2Error::submission(collaborator, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(H2Error::submission(
                collaborator,
                format!("HTTP {}: {}", status.as_u16(), message),
            ));
        }

        // Collaborators answer with arbitrary JSON; any id-like field becomes the reference.
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let reference = ["id", "reference", "verification_id", "credit_id"]
            .iter()
            .find_map(|key| match payload.get(*key) {
                Some(Value::String(text)) => Some(text.clone()),
                Some(Value::Number(number)) => Some(number.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| format!("http-{}", status.as_u16()));

        debug!(collaborator, url = %url, reference = %reference, "collaborator acknowledged");
        Ok(SubmissionReceipt {
            collaborator: collaborator.to_string(),
            reference,
            acknowledged_at: self.clock.now(),
        })
    }
}

/// Posts verification submissions to `{base}/api/verification/submit`.
#[derive(Clone)]
pub struct HttpPersistence {
    poster: JsonPoster,
}

impl HttpPersistence {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, H2Error> {
        Self::with_clock(base_url, timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(
        base_url: &str,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, H2Error> {
        Ok(Self {
            poster: JsonPoster::new("http-persistence", base_url, timeout, clock)?,
        })
    }
}

#[async_trait]
impl PersistenceCollaborator for HttpPersistence {
    fn name(&self) -> &'static str {
        "http-persistence"
    }

    async fn submit_verification(
        &self,
        submission: &VerificationSubmission,
    ) -> Result<SubmissionReceipt, H2Error> {
        self.poster
            .post(self.name(), VERIFICATION_SUBMIT_PATH, submission)
            .await
    }
}

/// Posts credit listings to `{base}/api/NGO/create-credit`.
#[derive(Clone)]
pub struct HttpMarketplace {
    poster: JsonPoster,
}

impl HttpMarketplace {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, H2Error> {
        Self::with_clock(base_url, timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(
        base_url: &str,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, H2Error> {
        Ok(Self {
            poster: JsonPoster::new("http-marketplace", base_url, timeout, clock)?,
        })
    }
}

#[async_trait]
impl MarketplaceCollaborator for HttpMarketplace {
    fn name(&self) -> &'static str {
        "http-marketplace"
    }

    async fn publish_credit(
        &self,
        listing: &MarketplaceListing,
    ) -> Result<SubmissionReceipt, H2Error> {
        self.poster
            .post(self.name(), CREATE_CREDIT_PATH, listing)
            .await
    }
}
