//! Key-value persistence substrate + HTTP fetch utilities.
//!
//! Reads fail open (missing or unreadable data is treated as absent) while
//! writes fail loud; callers that must not lose state propagate the write
//! error instead of swallowing it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info_span, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "paperfeed-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Minimal KV contract shared by every persisted set: `get` returns the
/// raw JSON text if present and unexpired, `put` replaces it with an
/// optional TTL.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put_raw(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;
}

/// Fail-open typed read: any store or decode failure is logged and treated
/// as "no existing data".
pub async fn read_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    match store.get_raw(key).await {
        Ok(Some(text)) => match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "stored value failed to decode, treating as absent");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(key, %err, "store read failed, treating as absent");
            None
        }
    }
}

/// Fail-loud typed write.
pub async fn write_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let text = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put_raw(key, text, ttl).await
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: Option<DateTime<Utc>>,
    payload: String,
}

impl Envelope {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// File-backed store: one JSON envelope per key, written with an atomic
/// temp-file rename so a crashed run never leaves a torn value behind.
#[derive(Debug, Clone)]
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KvStore for FileKv {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let envelope: Envelope = serde_json::from_str(&text).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        if envelope.expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(envelope.payload))
    }

    async fn put_raw(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).await.map_err(io_err)?;

        let envelope = Envelope {
            expires_at: ttl.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default()),
            payload: value,
        };
        let text = serde_json::to_string(&envelope).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;

        let path = self.path_for(key);
        let temp = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp).await.map_err(io_err)?;
        file.write_all(text.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        drop(file);
        fs::rename(&temp, &path).await.map_err(io_err)
    }
}

/// In-memory store for tests and the web handlers' unit coverage.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Envelope>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.expired(Utc::now()))
            .map(|e| e.payload.clone()))
    }

    async fn put_raw(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Envelope {
                expires_at: ttl
                    .map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default()),
                payload: value,
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    Retryable,
    Fatal,
}

fn classify_status(status: StatusCode) -> RetryClass {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryClass::Retryable
    } else {
        RetryClass::Fatal
    }
}

fn classify_request_error(err: &reqwest::Error) -> RetryClass {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryClass::Retryable
    } else {
        RetryClass::Fatal
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: "paperfeed/0.1".to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Outbound HTTP with a hard per-request timeout, bounded retries, and
/// per-provider call sequencing (one in-flight request per source tag, so
/// adapter-level politeness delays actually space the calls out).
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            client,
            per_source: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn source_gate(&self, source: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    pub async fn fetch_text(&self, source: &str, url: &str) -> Result<String, FetchError> {
        let gate = self.source_gate(source).await;
        let _permit = gate.acquire().await.expect("semaphore not closed");

        let span = info_span!("feed_fetch", source, url);
        let _guard = span.enter();

        let mut last_error: Option<reqwest::Error> = None;
        for attempt in 0..=self.backoff.max_retries {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    if status.is_success() {
                        return Ok(resp.text().await?);
                    }
                    if classify_status(status) == RetryClass::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_request_error(&err) == RetryClass::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
        Err(FetchError::Request(
            last_error.expect("retry loop captures a request error"),
        ))
    }
}
