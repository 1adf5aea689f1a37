//! Test doubles for the narrator and persistence ports.

use crate::character::{AbilityScores, Character, CharacterClass, Race};
use crate::character_builder::create_character;
use crate::narrator::{NarrationError, NarrationRequest, Narrator};
use crate::persist::{EntityKind, MemoryStore, PersistencePort, StorageError};
use crate::session::{CampaignSession, SessionConfig, SessionError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Narrator that replays a fixed script, then reports itself unavailable.
#[derive(Default)]
pub struct ScriptedNarrator {
    lines: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<NarrationRequest>>,
}

impl ScriptedNarrator {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far, in order.
    pub async fn requests(&self) -> Vec<NarrationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, NarrationError> {
        self.requests.lock().await.push(request.clone());
        self.lines
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| NarrationError::Unavailable("script exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// In-memory store whose saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicU32,
    retryable: AtomicBool,
    save_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: u32, retryable: bool) {
        self.retryable.store(retryable, Ordering::SeqCst);
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of save calls, failed ones included.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PersistencePort for FlakyStore {
    async fn save(&self, kind: EntityKind, id: &str, value: Value) -> Result<(), StorageError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(StorageError::backend(
                "injected failure",
                self.retryable.load(Ordering::SeqCst),
            ));
        }
        self.inner.save(kind, id, value).await
    }

    async fn load(&self, kind: EntityKind, id: &str) -> Result<Value, StorageError> {
        self.inner.load(kind, id).await
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        self.inner.list_all(kind).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StorageError> {
        self.inner.delete(kind, id).await
    }
}

/// A seeded session over a [`FlakyStore`] with a two-member party.
pub struct TestHarness {
    pub store: Arc<FlakyStore>,
    pub narrator: Arc<ScriptedNarrator>,
    pub session: CampaignSession<FlakyStore>,
}

impl TestHarness {
    pub async fn new(seed: u64) -> Result<Self, SessionError> {
        Self::with_config(SessionConfig::new("Test Campaign").with_seed(seed), Vec::<String>::new())
            .await
    }

    pub async fn with_config<I, S>(config: SessionConfig, script: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Arc::new(FlakyStore::new());
        let narrator = Arc::new(ScriptedNarrator::new(script));
        let session = CampaignSession::create(
            config,
            Arc::clone(&store),
            Arc::clone(&narrator) as Arc<dyn Narrator>,
            default_party(),
        )
        .await?;
        Ok(Self {
            store,
            narrator,
            session,
        })
    }
}

/// A fighter and a wizard with fixed scores.
pub fn default_party() -> Vec<Character> {
    vec![
        create_character(
            "Brunhild",
            Race::Dwarf,
            CharacterClass::Fighter,
            AbilityScores::new(16, 12, 15, 8, 10, 10),
            None,
        ),
        create_character(
            "Elowen",
            Race::Elf,
            CharacterClass::Wizard,
            AbilityScores::new(8, 14, 12, 17, 13, 10),
            None,
        ),
    ]
}
