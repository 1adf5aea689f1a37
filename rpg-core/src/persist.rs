//! Persistence port and its stores.
//!
//! Entities are stored as `serde_json::Value` documents keyed by kind and id.
//! The typed helpers at the bottom of this module convert to and from the
//! domain types.

use crate::campaign::{Campaign, CampaignId};
use crate::character::{Character, CharacterId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Character,
    Campaign,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Campaign => "campaign",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Storage backend error: {message}")]
    Backend { message: String, retryable: bool },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} {id} is corrupt: {reason}")]
    Corrupt {
        kind: EntityKind,
        id: String,
        reason: String,
    },
}

impl StorageError {
    pub fn backend(message: impl Into<String>, retryable: bool) -> Self {
        StorageError::Backend {
            message: message.into(),
            retryable,
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Backend { retryable: true, .. })
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        let retryable = matches!(
            err.kind(),
            io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        );
        StorageError::backend(err.to_string(), retryable)
    }
}

/// Durable storage for characters and campaigns.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Insert or replace a document.
    async fn save(&self, kind: EntityKind, id: &str, value: Value) -> Result<(), StorageError>;

    async fn load(&self, kind: EntityKind, id: &str) -> Result<Value, StorageError>;

    /// Every document of a kind, ordered by id.
    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError>;

    /// Remove a document. Returns false if it did not exist.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError>;
}

#[async_trait]
impl<P: PersistencePort + ?Sized> PersistencePort for Arc<P> {
    async fn save(&self, kind: EntityKind, id: &str, value: Value) -> Result<(), StorageError> {
        (**self).save(kind, id, value).await
    }

    async fn load(&self, kind: EntityKind, id: &str) -> Result<Value, StorageError> {
        (**self).load(kind, id).await
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        (**self).list_all(kind).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError> {
        (**self).delete(kind, id).await
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store backed by a map. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(EntityKind, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl PersistencePort for MemoryStore {
    async fn save(&self, kind: EntityKind, id: &str, value: Value) -> Result<(), StorageError> {
        self.documents
            .write()
            .await
            .insert((kind, id.to_string()), value);
        Ok(())
    }

    async fn load(&self, kind: EntityKind, id: &str) -> Result<Value, StorageError> {
        self.documents
            .read()
            .await
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        let documents = self.documents.read().await;
        let mut matching: Vec<(&String, &Value)> = documents
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), value)| (id, value))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        Ok(matching.into_iter().map(|(_, v)| v.clone()).collect())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError> {
        Ok(self
            .documents
            .write()
            .await
            .remove(&(kind, id.to_string()))
            .is_some())
    }
}

// ============================================================================
// JSON directory store
// ============================================================================

/// Store that keeps one pretty-printed JSON file per document under
/// `<root>/<kind>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn path_for(&self, kind: EntityKind, id: &str) -> Result<PathBuf, StorageError> {
        if id.is_empty() || id.contains(|c: char| c == '/' || c == '\\') || id.starts_with('.') {
            return Err(StorageError::backend(format!("invalid document id: {id:?}"), false));
        }
        Ok(self.kind_dir(kind).join(format!("{id}.json")))
    }
}

#[async_trait]
impl PersistencePort for JsonDirStore {
    async fn save(&self, kind: EntityKind, id: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(kind, id)?;
        tokio::fs::create_dir_all(self.kind_dir(kind)).await?;

        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&value)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, kind: EntityKind, id: &str) -> Result<Value, StorageError> {
        let path = self.path_for(kind, id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    kind,
                    id: id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        let mut entries = match tokio::fs::read_dir(self.kind_dir(kind)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = tokio::fs::read(&path).await?;
            documents.push(serde_json::from_slice(&bytes)?);
        }
        Ok(documents)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError> {
        let path = self.path_for(kind, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Retries
// ============================================================================

/// Bounded exponential backoff for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds; doubles per retry.
    pub base_delay_ms: u64,
    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

/// Wraps a store and retries retryable errors according to a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryingStore<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: PersistencePort> RetryingStore<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, StorageError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, operation, "storage call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        operation,
                        "storage call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: PersistencePort> PersistencePort for RetryingStore<P> {
    async fn save(&self, kind: EntityKind, id: &str, value: Value) -> Result<(), StorageError> {
        self.with_retry("save", || self.inner.save(kind, id, value.clone()))
            .await
    }

    async fn load(&self, kind: EntityKind, id: &str) -> Result<Value, StorageError> {
        self.with_retry("load", || self.inner.load(kind, id)).await
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        self.with_retry("list_all", || self.inner.list_all(kind))
            .await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError> {
        self.with_retry("delete", || self.inner.delete(kind, id))
            .await
    }
}

// ============================================================================
// Typed helpers
// ============================================================================

async fn save_typed<P, T>(
    store: &P,
    kind: EntityKind,
    id: &str,
    entity: &T,
) -> Result<(), StorageError>
where
    P: PersistencePort + ?Sized,
    T: Serialize,
{
    let value = serde_json::to_value(entity)?;
    store.save(kind, id, value).await?;
    tracing::info!(%kind, id, "saved");
    Ok(())
}

async fn load_typed<P, T>(store: &P, kind: EntityKind, id: &str) -> Result<T, StorageError>
where
    P: PersistencePort + ?Sized,
    T: DeserializeOwned,
{
    let value = store.load(kind, id).await?;
    Ok(serde_json::from_value(value)?)
}

async fn list_typed<P, T>(store: &P, kind: EntityKind) -> Result<Vec<T>, StorageError>
where
    P: PersistencePort + ?Sized,
    T: DeserializeOwned,
{
    store
        .list_all(kind)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(StorageError::from))
        .collect()
}

pub async fn save_character<P: PersistencePort + ?Sized>(
    store: &P,
    character: &Character,
) -> Result<(), StorageError> {
    save_typed(store, EntityKind::Character, &character.id.to_string(), character).await
}

pub async fn load_character<P: PersistencePort + ?Sized>(
    store: &P,
    id: CharacterId,
) -> Result<Character, StorageError> {
    load_typed(store, EntityKind::Character, &id.to_string()).await
}

pub async fn list_characters<P: PersistencePort + ?Sized>(
    store: &P,
) -> Result<Vec<Character>, StorageError> {
    list_typed(store, EntityKind::Character).await
}

pub async fn save_campaign<P: PersistencePort + ?Sized>(
    store: &P,
    campaign: &Campaign,
) -> Result<(), StorageError> {
    save_typed(store, EntityKind::Campaign, &campaign.id.to_string(), campaign).await
}

fn checked(campaign: Campaign) -> Result<Campaign, StorageError> {
    campaign.validate().map_err(|err| StorageError::Corrupt {
        kind: EntityKind::Campaign,
        id: campaign.id.to_string(),
        reason: err.to_string(),
    })?;
    Ok(campaign)
}

/// Load a campaign, refusing documents whose combat state is inconsistent.
pub async fn load_campaign<P: PersistencePort + ?Sized>(
    store: &P,
    id: CampaignId,
) -> Result<Campaign, StorageError> {
    checked(load_typed(store, EntityKind::Campaign, &id.to_string()).await?)
}

pub async fn list_campaigns<P: PersistencePort + ?Sized>(
    store: &P,
) -> Result<Vec<Campaign>, StorageError> {
    list_typed(store, EntityKind::Campaign)
        .await?
        .into_iter()
        .map(checked)
        .collect()
}
