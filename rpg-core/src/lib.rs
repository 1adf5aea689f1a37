//! Tabletop RPG rules engine.
//!
//! This crate provides:
//! - Dice rolling with critical detection and damage expressions
//! - Character generation from race, class and rolled ability scores
//! - Class rule tables for all twelve classes
//! - Challenge-rating based encounter generation
//! - A campaign state machine with an append-only story log
//! - Persisted, single-writer campaign sessions
//!
//! # Quick Start
//!
//! ```ignore
//! use rpg_core::{CampaignSession, CannedNarrator, MemoryStore, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new("My Campaign").with_seed(7);
//!     let party = rpg_core::testing::default_party();
//!
//!     let session = CampaignSession::create(
//!         config,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(CannedNarrator::new(7)),
//!         party,
//!     )
//!     .await?;
//!
//!     let narration = session.player_action("Thorin", "I look around the tavern").await?;
//!     println!("{}", narration.content);
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod character;
pub mod character_builder;
pub mod class_data;
pub mod dice;
pub mod encounter;
pub mod narrator;
pub mod persist;
pub mod session;
pub mod testing;

// Primary public API
pub use campaign::{Campaign, CampaignError, CampaignId, CampaignPhase, CombatantId, EntryType};
pub use character::{Character, CharacterClass, CharacterId, Race, RulesError, SkillName};
pub use character_builder::{create_character, generate_ability_scores, CharacterBuilder};
pub use dice::{roll, DiceError, DiceRollResult, DieType};
pub use encounter::{generate_encounter, Difficulty, Encounter, EncounterError, EnemyCatalog};
pub use narrator::{CannedNarrator, Narrator};
pub use persist::{
    JsonDirStore, MemoryStore, PersistencePort, RetryPolicy, RetryingStore, StorageError,
};
pub use session::{CampaignSession, SessionConfig, SessionError};
pub use testing::{FlakyStore, ScriptedNarrator, TestHarness};
