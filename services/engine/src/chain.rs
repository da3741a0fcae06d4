//! HTTP client for reading claim transaction receipts
//!
//! The claim confirmer and the recovery sweep only ever read from the
//! chain indexer; nothing in the engine submits transactions.

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shared::errors::{EngineError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::retry::{is_transient_http, RetryPolicy};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_RETRIES: u32 = 3;

/// One `Claimed` event emitted by the claim contract in a transaction.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClaimEventLog {
    pub bet_id: Uuid,
    pub claimant: String,
    pub amount: u64,
    pub round_commitment: String,
    pub nonce: u64,
}

/// A finalized transaction as reported by the chain indexer.
#[derive(Debug, Clone, Deserialize)]
pub struct TxReceipt {
    pub succeeded: bool,
    /// Address the transaction invoked
    pub to: String,
    #[serde(default)]
    pub logs: Vec<ClaimEventLog>,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Fetch the receipt for a transaction hash. `None` means the
    /// transaction is not yet finalized (or the indexer has not seen it).
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>>;
}

/// Why a single receipt fetch failed, kept typed so transience is
/// decided on the error itself rather than its message.
enum FetchError {
    Http(reqwest::Error),
    Status(StatusCode, String),
}

impl FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => is_transient_http(e),
            FetchError::Status(status, _) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "{}", e),
            FetchError::Status(status, body) => write!(f, "chain API error {}: {}", status, body),
        }
    }
}

pub struct HttpChainReader {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpChainReader {
    pub fn new(base_url: String, api_key: Option<String>) -> AnyResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            retry: RetryPolicy::new(MAX_RETRIES),
        })
    }

    async fn fetch_receipt_once(&self, url: &str) -> std::result::Result<Option<TxReceipt>, FetchError> {
        let mut request = self.http_client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(FetchError::Http)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status(status, body));
        }

        let receipt: TxReceipt = response.json().await.map_err(FetchError::Http)?;
        Ok(Some(receipt))
    }
}

#[async_trait]
impl ChainReader for HttpChainReader {
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let url = format!("{}/api/tx/{}", self.base_url, tx_hash);

        let mut backoff = self.retry.backoff();
        let mut failures = 0;
        loop {
            match self.fetch_receipt_once(&url).await {
                Ok(receipt) => {
                    debug!(tx_hash, failures, found = receipt.is_some(), "Fetched receipt");
                    return Ok(receipt);
                }
                Err(e) => {
                    failures += 1;
                    if !e.is_transient() || !self.retry.should_retry(failures) {
                        return Err(EngineError::upstream(format!(
                            "receipt lookup for {} failed: {}",
                            tx_hash, e
                        )));
                    }

                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(15));
                    warn!(
                        tx_hash,
                        failures,
                        error = %e,
                        backoff_ms = wait.as_millis() as u64,
                        "Receipt fetch failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// In-process chain reader for tests and local development.
#[derive(Default)]
pub struct StubChainReader {
    receipts: Mutex<HashMap<String, TxReceipt>>,
}

impl StubChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_receipt(&self, tx_hash: &str, receipt: TxReceipt) {
        self.receipts
            .lock()
            .expect("stub chain poisoned")
            .insert(tx_hash.to_string(), receipt);
    }
}

#[async_trait]
impl ChainReader for StubChainReader {
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        Ok(self
            .receipts
            .lock()
            .expect("stub chain poisoned")
            .get(tx_hash)
            .cloned())
    }
}
