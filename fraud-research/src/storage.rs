//! Result store adapters
//!
//! Reports are cached under the award identifier as JSON text. Two
//! adapters live here:
//! - [`MemoryResultStore`] for tests and one-off runs
//! - [`S3ResultStore`] persisting `{prefix}{award_id}.json` objects
//!
//! [`ReportCache`] wraps any adapter with retries and (de)serialization.
//! Unlike a read-through cache, a store error is never downgraded to a
//! miss: the orchestrator treats it as fatal.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{operation::get_object::GetObjectError, primitives::ByteStream, Client};
use fraud_core::FraudError;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::providers::ResultStore;
use crate::retry::RetryPolicy;
use crate::types::AwardSearchContext;

/// Retried, typed access to stored reports
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<dyn ResultStore>,
    retry: RetryPolicy,
}

impl ReportCache {
    pub fn new(store: Arc<dyn ResultStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Whatever is stored for the award, including mid-run checkpoints
    ///
    /// Corrupt JSON is logged and reported as a miss.
    pub async fn load(&self, award_id: &str) -> Result<Option<AwardSearchContext>, FraudError> {
        let raw = self
            .retry
            .run("store get", || self.store.get(award_id))
            .await
            .map_err(into_storage)?;

        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("Ignoring corrupt stored report for {}: {}", award_id, e);
                None
            }
        }))
    }

    /// The stored report, only if research on it finished
    pub async fn completed(
        &self,
        award_id: &str,
    ) -> Result<Option<AwardSearchContext>, FraudError> {
        Ok(self.load(award_id).await?.filter(AwardSearchContext::is_complete))
    }

    pub async fn is_cached(&self, award_id: &str) -> Result<bool, FraudError> {
        Ok(self.completed(award_id).await?.is_some())
    }

    pub async fn save(&self, context: &AwardSearchContext) -> Result<(), FraudError> {
        let json = serde_json::to_string(context)
            .map_err(|e| FraudError::internal(format!("Failed to serialize report: {}", e)))?;
        let key = context.original_award_id.as_str();

        self.retry
            .run("store put", || self.store.put(key, json.clone()))
            .await
            .map_err(into_storage)
    }
}

fn into_storage(e: FraudError) -> FraudError {
    match e {
        FraudError::Storage(_) => e,
        other => FraudError::storage(other.to_string()),
    }
}

/// In-process store backed by a map
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().remove(key)
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FraudError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), FraudError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// S3-based result store
pub struct S3ResultStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ResultStore {
    /// Create a new S3 store
    ///
    /// Requires AWS credentials to be configured via environment variables:
    /// - AWS_ACCESS_KEY_ID
    /// - AWS_SECRET_ACCESS_KEY
    /// - AWS_REGION
    /// - RESEARCH_S3_BUCKET (optional, defaults to "award-fraud-research")
    pub async fn new() -> Result<Self, FraudError> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = Client::new(&config);

        let bucket = std::env::var("RESEARCH_S3_BUCKET")
            .unwrap_or_else(|_| "award-fraud-research".to_string());

        info!("Research store initialized with bucket: {}", bucket);

        Ok(Self {
            client,
            bucket,
            prefix: "research/".to_string(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{}.json", self.prefix, key)
    }
}

#[async_trait]
impl ResultStore for S3ResultStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, FraudError> {
        let object_key = self.object_key(key);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| FraudError::storage(format!("Failed to read S3 body: {}", e)))?
                    .into_bytes();

                let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    FraudError::storage(format!("Stored research is not UTF-8: {}", e))
                })?;
                debug!("Store hit for key: {}", object_key);
                Ok(Some(text))
            }
            Err(e) => {
                if let Some(GetObjectError::NoSuchKey(_)) = e.as_service_error() {
                    debug!("Store miss for key: {}", object_key);
                    return Ok(None);
                }
                Err(FraudError::storage(format!(
                    "S3 get error for {}: {}",
                    object_key, e
                )))
            }
        }
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: String) -> Result<(), FraudError> {
        let object_key = self.object_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(value.into_bytes()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| FraudError::storage(format!("S3 put error: {}", e)))?;

        debug!("Saved research to store: {}", object_key);
        Ok(())
    }
}
