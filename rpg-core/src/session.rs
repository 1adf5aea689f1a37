//! Campaign sessions.
//!
//! A [`CampaignSession`] is the single writer for one campaign. Every
//! mutating call holds the session lock for its whole duration, applies the
//! change to a copy of the state, persists the copy and only then makes it
//! live. A failed save leaves the session exactly as it was.

use crate::campaign::{
    Campaign, CampaignError, CampaignId, CampaignPhase, CombatantId, DamageReport, DmIdentity,
    EntryType, NewStoryEntry, Setting, StoryLogEntry,
};
use crate::character::{
    Character, CharacterId, InventoryItem, ItemCategory, RulesError, SkillCheck, SkillName,
};
use crate::dice::{self, DamageExpression, DiceError, DiceRollResult, DieType};
use crate::encounter::{
    generate_encounter, roll_loot, Difficulty, EncounterError, Encounter, EnemyCatalog, EnemyId,
    Loot,
};
use crate::narrator::{NarrationError, NarrationRequest, Narrator};
use crate::persist::{
    load_campaign, load_character, save_campaign, save_character, PersistencePort, StorageError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// Anything that can go wrong in a session call.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    #[error("Encounter error: {0}")]
    Encounter(#[from] EncounterError),

    #[error("Campaign error: {0}")]
    Campaign(#[from] CampaignError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Narration error: {0}")]
    Narration(#[from] NarrationError),

    #[error("Character {0} is not in this party")]
    UnknownCharacter(CharacterId),

    #[error("{character} is not carrying {item}")]
    ItemNotCarried { character: String, item: String },

    #[error("{0} cannot be used up")]
    NotConsumable(String),

    #[error("Invalid session config: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether repeating the call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Storage(e) => e.is_retryable(),
            SessionError::Narration(NarrationError::Unavailable(_)) => true,
            _ => false,
        }
    }

    /// Text fit to show a player.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Storage(StorageError::NotFound { kind, .. }) => {
                format!("That {kind} could not be found.")
            }
            SessionError::Storage(StorageError::Corrupt { kind, .. }) => {
                format!("That saved {kind} is damaged and cannot be loaded.")
            }
            SessionError::Storage(_) => {
                "Couldn't save your progress. Please try again.".to_string()
            }
            SessionError::Narration(_) => {
                "The storyteller is silent for now. Please try again.".to_string()
            }
            SessionError::Campaign(CampaignError::AlreadyInCombat) => {
                "You are already in combat. Finish this fight first.".to_string()
            }
            SessionError::Campaign(CampaignError::NotInCombat) => {
                "There is no fight in progress.".to_string()
            }
            SessionError::Campaign(CampaignError::Concluded) => {
                "This campaign has ended and can no longer change.".to_string()
            }
            SessionError::Campaign(CampaignError::UnknownEnemy(_)) => {
                "That enemy is not part of this fight.".to_string()
            }
            SessionError::Campaign(CampaignError::EnemyDefeated(_)) => {
                "That enemy has already fallen.".to_string()
            }
            SessionError::Dice(DiceError::InvalidRollRequest { .. }) => {
                "Roll at least one die.".to_string()
            }
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for a new or resumed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub name: String,
    pub description: String,
    pub setting: Setting,
    pub difficulty: Difficulty,
    pub dm: DmIdentity,
    /// Seed for the session RNG. `None` draws from entropy.
    pub seed: Option<u64>,
    pub opening_scene: Option<String>,
    /// Replaces the standard enemy catalog.
    pub catalog: Option<EnemyCatalog>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "New Campaign".to_string(),
            description: String::new(),
            setting: Setting::default(),
            difficulty: Difficulty::default(),
            dm: DmIdentity::default(),
            seed: None,
            opening_scene: None,
            catalog: None,
        }
    }
}

impl SessionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_setting(mut self, setting: Setting) -> Self {
        self.setting = setting;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_dm(mut self, dm: DmIdentity) -> Self {
        self.dm = dm;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_opening_scene(mut self, scene: impl Into<String>) -> Self {
        self.opening_scene = Some(scene.into());
        self
    }

    pub fn with_catalog(mut self, catalog: EnemyCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn build_campaign(&self, party: &[Character]) -> Campaign {
        let mut campaign = Campaign::new(self.name.clone(), self.dm)
            .with_description(self.description.clone())
            .with_setting(self.setting)
            .with_difficulty(self.difficulty)
            .with_participants(party.iter().map(|c| c.id));
        if let Some(scene) = &self.opening_scene {
            campaign = campaign.with_opening_scene(scene.clone());
        }
        campaign
    }
}

// ============================================================================
// Session
// ============================================================================

/// Hit points a healing potion restores.
pub const HEALING_POTION: &str = "2d4+2";

/// Result of an attack on an enemy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    pub report: DamageReport,
    /// Rolled and shared out when the attack ended the fight.
    pub loot: Option<Loot>,
}

/// Result of an enemy attacking a party member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyAttackOutcome {
    pub enemy: EnemyId,
    pub target: CharacterId,
    /// The d20 against the target's armor class.
    pub attack_roll: DiceRollResult,
    pub hit: bool,
    /// Damage actually taken; 0 on a miss.
    pub damage: i32,
    /// The target's hit points after the attack.
    pub hit_points: i32,
}

/// Result of a party member using an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUse {
    pub item: InventoryItem,
    pub roll: DiceRollResult,
    /// Hit points actually restored.
    pub healed: i32,
}

#[derive(Debug, Clone)]
struct SessionState {
    campaign: Campaign,
    party: Vec<Character>,
    rng: StdRng,
}

impl SessionState {
    fn member(&self, id: CharacterId) -> Result<&Character, SessionError> {
        self.party
            .iter()
            .find(|c| c.id == id)
            .ok_or(SessionError::UnknownCharacter(id))
    }

    fn member_mut(&mut self, id: CharacterId) -> Result<&mut Character, SessionError> {
        self.party
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(SessionError::UnknownCharacter(id))
    }

    /// Mean participant level rounded down, at least 1.
    fn party_level(&self) -> u32 {
        if self.party.is_empty() {
            return 1;
        }
        let total: u32 = self.party.iter().map(|c| u32::from(c.level)).sum();
        (total / self.party.len() as u32).max(1)
    }

    /// Split gold and experience evenly. The first member keeps any
    /// remainder. Items are dealt out one each in party order.
    fn share_loot(&mut self, loot: &Loot) {
        let members = self.party.len() as u32;
        if members == 0 {
            return;
        }
        for (i, item) in loot.items.iter().enumerate() {
            self.party[i % members as usize].add_item(item.clone());
        }
        for (i, character) in self.party.iter_mut().enumerate() {
            let (gold, xp) = if i == 0 {
                (
                    loot.gold / members + loot.gold % members,
                    loot.experience / members + loot.experience % members,
                )
            } else {
                (loot.gold / members, loot.experience / members)
            };
            character.add_gold(gold);
            character.gain_experience(xp);
        }
    }
}

/// Live, persisted play session for one campaign.
pub struct CampaignSession<P: PersistencePort + ?Sized> {
    id: CampaignId,
    store: Arc<P>,
    narrator: Arc<dyn Narrator>,
    catalog: EnemyCatalog,
    state: Mutex<SessionState>,
}

impl<P: PersistencePort + ?Sized> CampaignSession<P> {
    /// Start a new campaign for `party` and persist it with its characters.
    pub async fn create(
        config: SessionConfig,
        store: Arc<P>,
        narrator: Arc<dyn Narrator>,
        party: Vec<Character>,
    ) -> Result<Self, SessionError> {
        let campaign = config.build_campaign(&party);
        for character in &party {
            save_character(&*store, character).await?;
        }
        save_campaign(&*store, &campaign).await?;
        tracing::info!(
            campaign = %campaign.id,
            name = %campaign.name,
            party = party.len(),
            narrator = narrator.name(),
            "session created"
        );

        Ok(Self {
            id: campaign.id,
            store,
            narrator,
            catalog: config.catalog.clone().unwrap_or_default(),
            state: Mutex::new(SessionState {
                rng: config.rng(),
                campaign,
                party,
            }),
        })
    }

    /// Load a stored campaign and its participants.
    pub async fn resume(
        id: CampaignId,
        config: SessionConfig,
        store: Arc<P>,
        narrator: Arc<dyn Narrator>,
    ) -> Result<Self, SessionError> {
        let campaign = load_campaign(&*store, id).await?;
        let mut party = Vec::with_capacity(campaign.participants().len());
        for member in campaign.participants() {
            party.push(load_character(&*store, *member).await?);
        }
        tracing::info!(
            campaign = %id,
            entries = campaign.story_log().len(),
            narrator = narrator.name(),
            "session resumed"
        );

        Ok(Self {
            id,
            store,
            narrator,
            catalog: config.catalog.clone().unwrap_or_default(),
            state: Mutex::new(SessionState {
                rng: config.rng(),
                campaign,
                party,
            }),
        })
    }

    pub fn id(&self) -> CampaignId {
        self.id
    }

    /// Copy of the live campaign.
    pub async fn snapshot(&self) -> Campaign {
        self.state.lock().await.campaign.clone()
    }

    /// Copy of the live party.
    pub async fn party(&self) -> Vec<Character> {
        self.state.lock().await.party.clone()
    }

    // ------------------------------------------------------------------
    // Commit protocol
    // ------------------------------------------------------------------

    async fn persist(&self, next: &SessionState, live: &SessionState) -> Result<(), StorageError> {
        for character in &next.party {
            if !live.party.contains(character) {
                save_character(&*self.store, character).await?;
            }
        }
        save_campaign(&*self.store, &next.campaign).await
    }

    async fn commit(
        &self,
        live: &mut MutexGuard<'_, SessionState>,
        next: SessionState,
    ) -> Result<(), SessionError> {
        self.persist(&next, &**live).await?;
        **live = next;
        Ok(())
    }

    async fn mutate<T, F>(&self, apply: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut SessionState) -> Result<T, SessionError> + Send,
    {
        let mut live = self.state.lock().await;
        let mut next = live.clone();
        let out = apply(&mut next)?;
        self.commit(&mut live, next).await?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Story
    // ------------------------------------------------------------------

    /// Record a player action and the narrator's response to it.
    pub async fn player_action(
        &self,
        speaker: &str,
        action: &str,
    ) -> Result<StoryLogEntry, SessionError> {
        let mut live = self.state.lock().await;
        if live.campaign.phase() == CampaignPhase::Concluded {
            return Err(CampaignError::Concluded.into());
        }
        let request = NarrationRequest {
            campaign_id: self.id,
            scene: live.campaign.current_scene().to_string(),
            speaker: Some(speaker.to_string()),
            action: action.to_string(),
        };
        let narration = self.narrator.narrate(&request).await?;
        tracing::debug!(
            campaign = %self.id,
            narrator = self.narrator.name(),
            chars = narration.len(),
            "narration received"
        );
        if narration.trim().is_empty() {
            return Err(NarrationError::Empty.into());
        }

        let mut next = live.clone();
        next.campaign
            .append_story_entry(NewStoryEntry::action(speaker, action))?;
        let entry = next
            .campaign
            .append_story_entry(NewStoryEntry::narration(narration))?
            .clone();
        self.commit(&mut live, next).await?;
        Ok(entry)
    }

    pub async fn record_dialogue(
        &self,
        speaker: &str,
        text: &str,
    ) -> Result<StoryLogEntry, SessionError> {
        self.mutate(|state| {
            let entry = NewStoryEntry::new(EntryType::Dialogue, text).with_speaker(speaker);
            Ok(state.campaign.append_story_entry(entry)?.clone())
        })
        .await
    }

    pub async fn set_scene(&self, scene: &str) -> Result<(), SessionError> {
        self.mutate(|state| Ok(state.campaign.set_scene(scene)?))
            .await
    }

    /// Roll dice in the open and log the result.
    pub async fn roll_dice(
        &self,
        speaker: &str,
        die_type: DieType,
        count: u32,
        modifier: i32,
    ) -> Result<DiceRollResult, SessionError> {
        self.mutate(|state| {
            let result = dice::roll(&mut state.rng, die_type, count, modifier)?;
            let entry = NewStoryEntry::new(EntryType::DiceRoll, format!("{speaker} rolls {result}"))
                .with_speaker(speaker)
                .with_roll(result.clone());
            state.campaign.append_story_entry(entry)?;
            Ok(result)
        })
        .await
    }

    pub async fn skill_check(
        &self,
        character_id: CharacterId,
        skill: SkillName,
        dc: i32,
    ) -> Result<SkillCheck, SessionError> {
        self.mutate(|state| {
            let character = state.member(character_id)?.clone();
            let check = character.skill_check(&mut state.rng, skill, dc)?;
            let verdict = if check.success { "succeeds" } else { "fails" };
            let content = format!(
                "{} {} a {} check ({} vs DC {})",
                character.name,
                verdict,
                skill.name(),
                check.roll.final_total,
                dc
            );
            let entry = NewStoryEntry::new(EntryType::SkillCheck, content)
                .with_speaker(character.name.clone())
                .with_roll(check.roll.clone());
            state.campaign.append_story_entry(entry)?;
            Ok(check)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// Generate an encounter for the party and enter combat.
    pub async fn start_encounter(&self) -> Result<Encounter, SessionError> {
        let catalog = &self.catalog;
        self.mutate(|state| {
            let difficulty = state.campaign.difficulty;
            let level = state.party_level();
            let encounter = generate_encounter(&mut state.rng, catalog, level, difficulty)?;

            let mut initiative = Vec::with_capacity(state.party.len());
            for character in &state.party {
                let roll = dice::roll(&mut state.rng, DieType::D20, 1, character.initiative_bonus)?;
                initiative.push((character.id, roll.final_total));
            }
            state.campaign.start_combat(encounter, &initiative)?;
            state
                .campaign
                .encounter()
                .cloned()
                .ok_or(SessionError::Campaign(CampaignError::NotInCombat))
        })
        .await
    }

    pub async fn advance_turn(&self) -> Result<CombatantId, SessionError> {
        self.mutate(|state| Ok(state.campaign.advance_turn()?))
            .await
    }

    /// Apply damage to an enemy. Ending the fight rolls loot for the party.
    pub async fn attack_enemy(
        &self,
        enemy_id: EnemyId,
        damage: i32,
    ) -> Result<AttackOutcome, SessionError> {
        self.mutate(|state| {
            let report = state.campaign.damage_enemy(enemy_id, damage)?;
            let loot = match (report.combat_ended, state.campaign.encounter()) {
                (true, Some(encounter)) => Some(roll_loot(&mut state.rng, encounter)),
                _ => None,
            };
            if let Some(loot) = &loot {
                state.share_loot(loot);
                let mut content = format!(
                    "The party gains {} gold and {} experience.",
                    loot.gold, loot.experience
                );
                if !loot.items.is_empty() {
                    let names: Vec<&str> = loot.items.iter().map(|i| i.name.as_str()).collect();
                    content.push_str(&format!(" Found: {}.", names.join(", ")));
                }
                state
                    .campaign
                    .append_story_entry(NewStoryEntry::narration(content))?;
            }
            Ok(AttackOutcome { report, loot })
        })
        .await
    }

    /// An enemy attacks a party member: a d20 against the target's armor
    /// class, then the enemy's damage on a hit. A natural 20 always hits and
    /// a natural 1 always misses.
    pub async fn enemy_attack(
        &self,
        enemy_id: EnemyId,
        character_id: CharacterId,
    ) -> Result<EnemyAttackOutcome, SessionError> {
        self.mutate(|state| {
            let enemy = state.campaign.active_enemy(enemy_id)?.clone();
            let armor_class = state.member(character_id)?.effective_armor_class();

            let attack_roll = dice::roll(&mut state.rng, DieType::D20, 1, 0)?;
            let hit = !attack_roll.critical_fail
                && (attack_roll.critical_hit || attack_roll.final_total >= armor_class);
            let rolled = if hit {
                enemy.roll_damage(&mut state.rng)?.final_total
            } else {
                0
            };

            let target = state.member_mut(character_id)?;
            let was_conscious = target.is_conscious();
            let damage = target.take_damage(rolled);
            let name = target.name.clone();
            let hit_points = target.hit_points;

            let content = if hit {
                let mut line = format!("{} hits {} for {} damage.", enemy.name, name, damage);
                if was_conscious && hit_points <= 0 {
                    line.push_str(&format!(" {name} falls unconscious!"));
                }
                line
            } else {
                format!(
                    "{} misses {} ({} vs AC {}).",
                    enemy.name, name, attack_roll.final_total, armor_class
                )
            };
            let entry = NewStoryEntry::new(EntryType::Combat, content)
                .with_speaker(enemy.name.clone())
                .with_roll(attack_roll.clone());
            state.campaign.append_story_entry(entry)?;
            tracing::debug!(enemy = %enemy_id, target = %character_id, hit, damage, "enemy attack");

            Ok(EnemyAttackOutcome {
                enemy: enemy_id,
                target: character_id,
                attack_roll,
                hit,
                damage,
                hit_points,
            })
        })
        .await
    }

    /// Use one of a character's consumable items. A potion heals
    /// [`HEALING_POTION`] hit points, capped at the character's maximum.
    pub async fn use_item(
        &self,
        character_id: CharacterId,
        item_id: &str,
    ) -> Result<ItemUse, SessionError> {
        self.mutate(|state| {
            let character = state.member(character_id)?;
            let item = character
                .inventory
                .iter()
                .find(|i| i.id == item_id && i.quantity > 0)
                .cloned()
                .ok_or_else(|| SessionError::ItemNotCarried {
                    character: character.name.clone(),
                    item: item_id.to_string(),
                })?;
            if item.category != ItemCategory::Potion {
                return Err(SessionError::NotConsumable(item.name));
            }
            let roll = DamageExpression::parse(HEALING_POTION)?.roll(&mut state.rng)?;

            let character = state.member_mut(character_id)?;
            character.remove_item(&item.id, 1);
            let healed = character.heal(roll.final_total);
            let name = character.name.clone();

            let entry = NewStoryEntry::new(
                EntryType::Action,
                format!("{name} drinks a {} and recovers {healed} hit points.", item.name),
            )
            .with_speaker(name)
            .with_roll(roll.clone());
            state.campaign.append_story_entry(entry)?;
            Ok(ItemUse {
                item: InventoryItem {
                    quantity: 1,
                    ..item
                },
                roll,
                healed,
            })
        })
        .await
    }

    pub async fn end_combat(&self) -> Result<(), SessionError> {
        self.mutate(|state| Ok(state.campaign.end_combat()?))
            .await
    }

    /// Conclude the campaign. No further changes are accepted.
    pub async fn archive(&self) -> Result<(), SessionError> {
        self.mutate(|state| Ok(state.campaign.archive()?))
            .await
    }
}
