//! Campaign state machine.
//!
//! A campaign moves `Setup -> InStory <-> InCombat -> Concluded`. The story
//! log is append-only and is the audit trail of the session: entries are
//! never edited, removed or reordered.

use crate::character::CharacterId;
use crate::dice::DiceRollResult;
use crate::encounter::{Difficulty, Encounter, Enemy, EnemyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opening line of every new campaign unless configured otherwise.
pub const DEFAULT_OPENING_SCENE: &str =
    "You find yourselves at the entrance of a mysterious dungeon...";

/// Errors from campaign state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignError {
    #[error("Invalid story entry type: {0}")]
    InvalidEntryType(String),

    #[error("Combat is already active")]
    AlreadyInCombat,

    #[error("Combat is not active")]
    NotInCombat,

    #[error("Campaign has been archived")]
    Concluded,

    #[error("Encounter has no enemies")]
    EmptyEncounter,

    #[error("Character {0} is not part of this campaign")]
    UnknownParticipant(CharacterId),

    #[error("Enemy {0} is not in the current encounter")]
    UnknownEnemy(EnemyId),

    #[error("Enemy {0} has already been defeated")]
    EnemyDefeated(EnemyId),

    #[error("{0} appears more than once in the turn order")]
    DuplicateCombatant(CombatantId),

    #[error("Campaign state is inconsistent")]
    InconsistentState,
}

// ============================================================================
// IDs and tags
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub Uuid);

impl CampaignId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anyone who can hold a turn in combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatantId {
    Character(CharacterId),
    Enemy(EnemyId),
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombatantId::Character(id) => write!(f, "Character {id}"),
            CombatantId::Enemy(id) => write!(f, "Enemy {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Narration,
    Action,
    Dialogue,
    Combat,
    SkillCheck,
    DiceRoll,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Narration => "narration",
            EntryType::Action => "action",
            EntryType::Dialogue => "dialogue",
            EntryType::Combat => "combat",
            EntryType::SkillCheck => "skill_check",
            EntryType::DiceRoll => "dice_roll",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "narration" => Ok(EntryType::Narration),
            "action" => Ok(EntryType::Action),
            "dialogue" => Ok(EntryType::Dialogue),
            "combat" => Ok(EntryType::Combat),
            "skill_check" => Ok(EntryType::SkillCheck),
            "dice_roll" => Ok(EntryType::DiceRoll),
            _ => Err(CampaignError::InvalidEntryType(s.to_string())),
        }
    }
}

/// Who runs the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DmIdentity {
    #[default]
    Automated,
    Human,
}

impl DmIdentity {
    pub fn display_name(&self) -> &'static str {
        match self {
            DmIdentity::Automated => "AI Dungeon Master",
            DmIdentity::Human => "Dungeon Master",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Setting {
    #[default]
    #[serde(rename = "Forgotten Realms")]
    ForgottenRealms,
    Eberron,
    Ravenloft,
    #[serde(rename = "Dark Sun")]
    DarkSun,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignPhase {
    Setup,
    InStory,
    InCombat,
    Concluded,
}

// ============================================================================
// Story log
// ============================================================================

/// An entry as submitted, before the campaign stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStoryEntry {
    pub entry_type: EntryType,
    pub speaker: Option<String>,
    pub content: String,
    pub dice_roll: Option<DiceRollResult>,
}

impl NewStoryEntry {
    pub fn new(entry_type: EntryType, content: impl Into<String>) -> Self {
        Self {
            entry_type,
            speaker: None,
            content: content.into(),
            dice_roll: None,
        }
    }

    pub fn narration(content: impl Into<String>) -> Self {
        Self::new(EntryType::Narration, content)
    }

    pub fn action(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(EntryType::Action, content).with_speaker(speaker)
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_roll(mut self, roll: DiceRollResult) -> Self {
        self.dice_roll = Some(roll);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub speaker: Option<String>,
    pub content: String,
    pub dice_roll: Option<DiceRollResult>,
}

/// Result of damaging an enemy in the bound encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageReport {
    pub enemy: EnemyId,
    pub dealt: i32,
    pub defeated: bool,
    /// True when this hit cleared the encounter and ended combat.
    pub combat_ended: bool,
}

// ============================================================================
// Campaign
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub description: String,
    pub dm: DmIdentity,
    pub setting: Setting,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
    pub last_played: DateTime<Utc>,

    participants: Vec<CharacterId>,
    current_scene: String,
    story_log: Vec<StoryLogEntry>,
    phase: CampaignPhase,
    combat_active: bool,
    current_turn: Option<CombatantId>,
    turn_order: Vec<CombatantId>,
    encounter: Option<Encounter>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, dm: DmIdentity) -> Self {
        let now = Utc::now();
        Self {
            id: CampaignId::new(),
            name: name.into(),
            description: String::new(),
            dm,
            setting: Setting::default(),
            difficulty: Difficulty::default(),
            created_at: now,
            last_played: now,
            participants: Vec::new(),
            current_scene: DEFAULT_OPENING_SCENE.to_string(),
            story_log: Vec::new(),
            phase: CampaignPhase::Setup,
            combat_active: false,
            current_turn: None,
            turn_order: Vec::new(),
            encounter: None,
        }
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

    pub fn with_opening_scene(mut self, scene: impl Into<String>) -> Self {
        self.current_scene = scene.into();
        self
    }

    pub fn with_participants(mut self, ids: impl IntoIterator<Item = CharacterId>) -> Self {
        for id in ids {
            if !self.participants.contains(&id) {
                self.participants.push(id);
            }
        }
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> CampaignPhase {
        self.phase
    }

    pub fn is_combat_active(&self) -> bool {
        self.combat_active
    }

    pub fn current_turn(&self) -> Option<CombatantId> {
        self.current_turn
    }

    pub fn turn_order(&self) -> &[CombatantId] {
        &self.turn_order
    }

    pub fn story_log(&self) -> &[StoryLogEntry] {
        &self.story_log
    }

    pub fn participants(&self) -> &[CharacterId] {
        &self.participants
    }

    pub fn current_scene(&self) -> &str {
        &self.current_scene
    }

    /// The encounter bound by the latest `start_combat`, if any. It stays
    /// readable (inactive) after combat ends.
    pub fn encounter(&self) -> Option<&Encounter> {
        self.encounter.as_ref()
    }

    pub fn round(&self) -> Option<u32> {
        self.encounter
            .as_ref()
            .filter(|_| self.combat_active)
            .map(|e| e.round_counter)
    }

    /// combat active => non-empty turn order without repeats, containing the
    /// current turn; otherwise no current turn and no turn order.
    pub fn invariants_hold(&self) -> bool {
        if self.combat_active {
            !self.turn_order.is_empty()
                && first_repeat(&self.turn_order).is_none()
                && self
                    .current_turn
                    .is_some_and(|turn| self.turn_order.contains(&turn))
                && self.phase == CampaignPhase::InCombat
        } else {
            self.current_turn.is_none()
                && self.turn_order.is_empty()
                && self.phase != CampaignPhase::InCombat
        }
    }

    /// Reject a campaign whose combat fields disagree, such as a document
    /// edited on disk.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.invariants_hold() {
            Ok(())
        } else {
            Err(CampaignError::InconsistentState)
        }
    }

    // ------------------------------------------------------------------
    // Story
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), CampaignError> {
        if self.phase == CampaignPhase::Concluded {
            Err(CampaignError::Concluded)
        } else {
            Ok(())
        }
    }

    fn push_entry(&mut self, entry: NewStoryEntry) -> &StoryLogEntry {
        let now = Utc::now();
        self.last_played = now;
        self.story_log.push(StoryLogEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            entry_type: entry.entry_type,
            speaker: entry.speaker,
            content: entry.content,
            dice_roll: entry.dice_roll,
        });
        &self.story_log[self.story_log.len() - 1]
    }

    /// Stamp and append an entry. Content is never rejected.
    pub fn append_story_entry(
        &mut self,
        entry: NewStoryEntry,
    ) -> Result<&StoryLogEntry, CampaignError> {
        self.ensure_open()?;
        if self.phase == CampaignPhase::Setup {
            self.phase = CampaignPhase::InStory;
        }
        Ok(self.push_entry(entry))
    }

    /// Append an entry whose type arrives as a free-text tag.
    pub fn append_tagged(
        &mut self,
        tag: &str,
        speaker: Option<String>,
        content: impl Into<String>,
        dice_roll: Option<DiceRollResult>,
    ) -> Result<&StoryLogEntry, CampaignError> {
        let entry_type: EntryType = tag.parse()?;
        self.append_story_entry(NewStoryEntry {
            entry_type,
            speaker,
            content: content.into(),
            dice_roll,
        })
    }

    pub fn set_scene(&mut self, scene: impl Into<String>) -> Result<(), CampaignError> {
        self.ensure_open()?;
        self.current_scene = scene.into();
        Ok(())
    }

    /// Register a party member. Returns false if already present.
    pub fn add_participant(&mut self, id: CharacterId) -> Result<bool, CampaignError> {
        self.ensure_open()?;
        if self.participants.contains(&id) {
            return Ok(false);
        }
        self.participants.push(id);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// Bind an encounter and enter combat.
    ///
    /// Turn order is the party (in the given order) followed by the enemies,
    /// stable-sorted by initiative descending, so ties keep that order.
    pub fn start_combat(
        &mut self,
        mut encounter: Encounter,
        party: &[(CharacterId, i32)],
    ) -> Result<(), CampaignError> {
        self.ensure_open()?;
        if self.combat_active {
            return Err(CampaignError::AlreadyInCombat);
        }
        if encounter.enemies.is_empty() {
            return Err(CampaignError::EmptyEncounter);
        }
        if let Some((id, _)) = party.iter().find(|(id, _)| !self.participants.contains(id)) {
            return Err(CampaignError::UnknownParticipant(*id));
        }

        let mut rolls: Vec<(CombatantId, i32)> = party
            .iter()
            .map(|(id, init)| (CombatantId::Character(*id), *init))
            .chain(
                encounter
                    .enemies
                    .iter()
                    .map(|e| (CombatantId::Enemy(e.id), e.initiative)),
            )
            .collect();
        let ids: Vec<CombatantId> = rolls.iter().map(|(id, _)| *id).collect();
        if let Some(repeat) = first_repeat(&ids) {
            return Err(CampaignError::DuplicateCombatant(repeat));
        }
        rolls.sort_by_key(|(_, init)| Reverse(*init));

        self.turn_order = rolls.into_iter().map(|(id, _)| id).collect();
        self.current_turn = self.turn_order.first().copied();
        encounter.turn_order = self.turn_order.clone();
        encounter.active = true;

        let names = encounter
            .enemies
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.encounter = Some(encounter);
        self.combat_active = true;
        self.phase = CampaignPhase::InCombat;
        self.push_entry(NewStoryEntry::new(
            EntryType::Combat,
            format!("Combat begins against {names}!"),
        ));

        tracing::info!(campaign = %self.id, combatants = self.turn_order.len(), "combat started");
        Ok(())
    }

    /// Pass the turn to the next combatant, wrapping into a new round.
    pub fn advance_turn(&mut self) -> Result<CombatantId, CampaignError> {
        self.ensure_open()?;
        if !self.combat_active {
            return Err(CampaignError::NotInCombat);
        }
        let len = self.turn_order.len();
        if len == 0 {
            return Err(CampaignError::InconsistentState);
        }
        let index = self
            .current_turn
            .and_then(|turn| self.turn_order.iter().position(|t| *t == turn))
            .unwrap_or(0);
        let next = (index + 1) % len;
        if next == 0 {
            if let Some(encounter) = self.encounter.as_mut() {
                encounter.round_counter += 1;
            }
        }
        let turn = self.turn_order[next];
        self.current_turn = Some(turn);
        Ok(turn)
    }

    /// The enemy about to act. It must be in the running fight and still
    /// standing.
    pub fn active_enemy(&self, enemy_id: EnemyId) -> Result<&Enemy, CampaignError> {
        self.ensure_open()?;
        if !self.combat_active {
            return Err(CampaignError::NotInCombat);
        }
        let enemy = self
            .encounter
            .as_ref()
            .and_then(|e| e.enemy(enemy_id))
            .ok_or(CampaignError::UnknownEnemy(enemy_id))?;
        if enemy.is_defeated() {
            return Err(CampaignError::EnemyDefeated(enemy_id));
        }
        Ok(enemy)
    }

    /// Damage an enemy. Clearing the encounter ends combat.
    pub fn damage_enemy(
        &mut self,
        enemy_id: EnemyId,
        amount: i32,
    ) -> Result<DamageReport, CampaignError> {
        self.ensure_open()?;
        if !self.combat_active {
            return Err(CampaignError::NotInCombat);
        }
        let encounter = self
            .encounter
            .as_mut()
            .ok_or(CampaignError::NotInCombat)?;
        let enemy = encounter
            .enemy_mut(enemy_id)
            .ok_or(CampaignError::UnknownEnemy(enemy_id))?;

        let dealt = enemy.take_damage(amount);
        let defeated = enemy.is_defeated();
        let mut content = format!("{} takes {} damage.", enemy.name, dealt);
        if defeated {
            content.push_str(&format!(" {} is defeated!", enemy.name));
        }
        let cleared = encounter.is_cleared();
        self.push_entry(NewStoryEntry::new(EntryType::Combat, content));

        if cleared {
            self.end_combat()?;
        }
        Ok(DamageReport {
            enemy: enemy_id,
            dealt,
            defeated,
            combat_ended: cleared,
        })
    }

    /// Leave combat. A no-op when combat is not active.
    pub fn end_combat(&mut self) -> Result<(), CampaignError> {
        if !self.combat_active {
            return Ok(());
        }
        let rounds = self.round().unwrap_or(1);
        let victory = self.encounter.as_ref().is_some_and(Encounter::is_cleared);
        if let Some(encounter) = self.encounter.as_mut() {
            encounter.active = false;
            encounter.turn_order.clear();
        }
        self.combat_active = false;
        self.current_turn = None;
        self.turn_order.clear();
        self.phase = CampaignPhase::InStory;

        let content = if victory {
            format!("The battle is won after {rounds} round(s).")
        } else {
            format!("Combat ends after {rounds} round(s).")
        };
        self.push_entry(NewStoryEntry::new(EntryType::Combat, content));
        tracing::info!(campaign = %self.id, rounds, victory, "combat ended");
        Ok(())
    }

    /// Archive the campaign. Ends any running combat first; terminal.
    pub fn archive(&mut self) -> Result<(), CampaignError> {
        self.ensure_open()?;
        self.end_combat()?;
        self.phase = CampaignPhase::Concluded;
        tracing::info!(campaign = %self.id, "campaign archived");
        Ok(())
    }
}

fn first_repeat(ids: &[CombatantId]) -> Option<CombatantId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().find(|id| !seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encounter::{generate_encounter, EnemyCatalog, EnemyTemplate};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn party_campaign(size: usize) -> (Campaign, Vec<CharacterId>) {
        let ids: Vec<CharacterId> = (0..size).map(|_| CharacterId::new()).collect();
        let campaign =
            Campaign::new("Lost Mine", DmIdentity::Automated).with_participants(ids.clone());
        (campaign, ids)
    }

    fn goblins(seed: u64, level: u32) -> Encounter {
        let catalog = EnemyCatalog::new(vec![EnemyTemplate::new(
            "Goblin", 0.25, 7, 15, "1d6", "Humanoid",
        )]);
        generate_encounter(&mut StdRng::seed_from_u64(seed), &catalog, level, Difficulty::Normal)
            .unwrap()
    }

    #[test]
    fn test_new_campaign_is_in_setup() {
        let campaign = Campaign::new("Test", DmIdentity::Human);
        assert_eq!(campaign.phase(), CampaignPhase::Setup);
        assert_eq!(campaign.current_scene(), DEFAULT_OPENING_SCENE);
        assert!(campaign.story_log().is_empty());
        assert!(!campaign.is_combat_active());
        assert!(campaign.current_turn().is_none());
        assert!(campaign.invariants_hold());
    }

    #[test]
    fn test_first_entry_enters_story() {
        let mut campaign = Campaign::new("Test", DmIdentity::Automated);
        campaign
            .append_story_entry(NewStoryEntry::narration("The torches gutter."))
            .unwrap();
        assert_eq!(campaign.phase(), CampaignPhase::InStory);
    }

    #[test]
    fn test_log_preserves_order_and_content() {
        let mut campaign = Campaign::new("Test", DmIdentity::Automated);
        let contents: Vec<String> = (0..25).map(|i| format!("entry #{i}")).collect();
        for (i, content) in contents.iter().enumerate() {
            let kind = if i % 2 == 0 { EntryType::Action } else { EntryType::Dialogue };
            campaign
                .append_story_entry(NewStoryEntry::new(kind, content.clone()).with_speaker("Vex"))
                .unwrap();
        }
        let log = campaign.story_log();
        assert_eq!(log.len(), 25);
        for (entry, content) in log.iter().zip(&contents) {
            assert_eq!(&entry.content, content);
            assert_eq!(entry.speaker.as_deref(), Some("Vex"));
        }
        assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_tagged_entries_validate_type() {
        let mut campaign = Campaign::new("Test", DmIdentity::Automated);
        let entry = campaign
            .append_tagged("skill_check", Some("Vex".into()), "Stealth 17 vs DC 15", None)
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::SkillCheck);

        assert_eq!(
            campaign.append_tagged("monologue", None, "...", None).unwrap_err(),
            CampaignError::InvalidEntryType("monologue".to_string())
        );
        assert_eq!(campaign.story_log().len(), 1);
    }

    #[test]
    fn test_empty_content_is_accepted() {
        let mut campaign = Campaign::new("Test", DmIdentity::Automated);
        assert!(campaign.append_story_entry(NewStoryEntry::narration("")).is_ok());
    }

    #[test]
    fn test_turn_order_sorted_with_stable_ties() {
        let (mut campaign, ids) = party_campaign(3);
        let mut encounter = goblins(1, 1);
        for enemy in &mut encounter.enemies {
            enemy.initiative = 10;
        }
        let enemy_ids: Vec<_> = encounter.enemies.iter().map(|e| e.id).collect();

        campaign
            .start_combat(encounter, &[(ids[0], 10), (ids[1], 18), (ids[2], 3)])
            .unwrap();

        let mut expected = vec![CombatantId::Character(ids[1]), CombatantId::Character(ids[0])];
        expected.extend(enemy_ids.iter().map(|id| CombatantId::Enemy(*id)));
        expected.push(CombatantId::Character(ids[2]));
        assert_eq!(campaign.turn_order(), expected.as_slice());
        assert_eq!(campaign.current_turn(), Some(CombatantId::Character(ids[1])));
        assert_eq!(campaign.phase(), CampaignPhase::InCombat);
        assert!(campaign.invariants_hold());
        assert_eq!(
            campaign.encounter().unwrap().turn_order,
            campaign.turn_order().to_vec()
        );
    }

    #[test]
    fn test_no_nested_combat() {
        let (mut campaign, ids) = party_campaign(1);
        campaign.start_combat(goblins(2, 1), &[(ids[0], 12)]).unwrap();
        assert_eq!(
            campaign.start_combat(goblins(3, 1), &[(ids[0], 12)]),
            Err(CampaignError::AlreadyInCombat)
        );
    }

    #[test]
    fn test_advance_requires_combat() {
        let mut campaign = Campaign::new("Test", DmIdentity::Automated);
        assert_eq!(campaign.advance_turn(), Err(CampaignError::NotInCombat));
    }

    #[test]
    fn test_full_cycle_returns_to_start_and_bumps_round() {
        let (mut campaign, ids) = party_campaign(2);
        campaign
            .start_combat(goblins(4, 2), &[(ids[0], 15), (ids[1], 5)])
            .unwrap();
        let start = campaign.current_turn();
        assert_eq!(campaign.round(), Some(1));

        let len = campaign.turn_order().len();
        for step in 1..len {
            campaign.advance_turn().unwrap();
            assert_ne!(campaign.current_turn(), start, "step {step}");
            assert_eq!(campaign.round(), Some(1));
        }
        campaign.advance_turn().unwrap();
        assert_eq!(campaign.current_turn(), start);
        assert_eq!(campaign.round(), Some(2));
        assert!(campaign.invariants_hold());
    }

    #[test]
    fn test_duplicate_party_member_is_rejected() {
        let (mut campaign, ids) = party_campaign(2);
        assert_eq!(
            campaign.start_combat(goblins(15, 1), &[(ids[0], 20), (ids[1], 8), (ids[0], 1)]),
            Err(CampaignError::DuplicateCombatant(CombatantId::Character(ids[0])))
        );
        assert!(!campaign.is_combat_active());
        assert!(campaign.turn_order().is_empty());
        assert!(campaign.story_log().is_empty());
        assert!(campaign.invariants_hold());
    }

    #[test]
    fn test_duplicate_enemy_is_rejected() {
        let (mut campaign, ids) = party_campaign(1);
        let mut encounter = goblins(16, 1);
        let twin = encounter.enemies[0].clone();
        encounter.enemies.push(twin.clone());
        assert_eq!(
            campaign.start_combat(encounter, &[(ids[0], 10)]),
            Err(CampaignError::DuplicateCombatant(CombatantId::Enemy(twin.id)))
        );
    }

    #[test]
    fn test_every_cycle_bumps_round_once() {
        let (mut campaign, ids) = party_campaign(3);
        campaign
            .start_combat(goblins(17, 3), &[(ids[0], 20), (ids[1], 1), (ids[2], 11)])
            .unwrap();
        let len = campaign.turn_order().len();
        let start = campaign.current_turn();
        for round in 2..=6 {
            for _ in 0..len {
                campaign.advance_turn().unwrap();
            }
            assert_eq!(campaign.current_turn(), start);
            assert_eq!(campaign.round(), Some(round));
        }
    }

    #[test]
    fn test_enemy_must_be_standing_to_act() {
        let (mut campaign, ids) = party_campaign(1);
        let encounter = goblins(18, 2);
        let first = encounter.enemies[0].id;
        campaign.start_combat(encounter, &[(ids[0], 11)]).unwrap();
        assert_eq!(campaign.active_enemy(first).unwrap().id, first);

        campaign.damage_enemy(first, 100).unwrap();
        assert!(campaign.is_combat_active());
        assert_eq!(campaign.active_enemy(first), Err(CampaignError::EnemyDefeated(first)));
    }

    #[test]
    fn test_unknown_party_member_is_rejected() {
        let (mut campaign, _) = party_campaign(1);
        let stranger = CharacterId::new();
        assert_eq!(
            campaign.start_combat(goblins(5, 1), &[(stranger, 9)]),
            Err(CampaignError::UnknownParticipant(stranger))
        );
        assert!(!campaign.is_combat_active());
    }

    #[test]
    fn test_empty_encounter_is_rejected() {
        let (mut campaign, ids) = party_campaign(1);
        let mut encounter = goblins(6, 1);
        encounter.enemies.clear();
        assert_eq!(
            campaign.start_combat(encounter, &[(ids[0], 9)]),
            Err(CampaignError::EmptyEncounter)
        );
    }

    #[test]
    fn test_defeating_every_enemy_ends_combat() {
        let (mut campaign, ids) = party_campaign(1);
        let encounter = goblins(7, 1);
        let enemies: Vec<_> = encounter.enemies.iter().map(|e| (e.id, e.hit_points)).collect();
        campaign.start_combat(encounter, &[(ids[0], 11)]).unwrap();

        let (last, rest) = enemies.split_last().unwrap();
        for (id, hp) in rest {
            let report = campaign.damage_enemy(*id, *hp).unwrap();
            assert!(report.defeated);
            assert!(!report.combat_ended);
            assert!(campaign.is_combat_active());
        }
        let log_len = campaign.story_log().len();
        let report = campaign.damage_enemy(last.0, 100).unwrap();
        assert_eq!(report.dealt, last.1);
        assert!(report.combat_ended);

        assert!(!campaign.is_combat_active());
        assert!(campaign.current_turn().is_none());
        assert!(campaign.turn_order().is_empty());
        assert_eq!(campaign.phase(), CampaignPhase::InStory);
        assert!(campaign.invariants_hold());
        // Damage line plus the concluding line.
        assert_eq!(campaign.story_log().len(), log_len + 2);
        assert!(campaign.story_log().last().unwrap().content.contains("won"));
        assert!(campaign.encounter().unwrap().is_cleared());
    }

    #[test]
    fn test_damage_requires_known_enemy() {
        let (mut campaign, ids) = party_campaign(1);
        let other = goblins(8, 1);
        campaign.start_combat(goblins(9, 1), &[(ids[0], 11)]).unwrap();
        let stray = other.enemies[0].id;
        assert_eq!(campaign.damage_enemy(stray, 3), Err(CampaignError::UnknownEnemy(stray)));
    }

    #[test]
    fn test_end_combat_is_idempotent() {
        let (mut campaign, ids) = party_campaign(1);
        campaign.end_combat().unwrap();
        assert!(campaign.story_log().is_empty());

        campaign.start_combat(goblins(10, 1), &[(ids[0], 11)]).unwrap();
        campaign.end_combat().unwrap();
        let len = campaign.story_log().len();
        campaign.end_combat().unwrap();
        assert_eq!(campaign.story_log().len(), len);
        assert!(campaign.invariants_hold());

        // A new fight can start after the last one ended.
        campaign.start_combat(goblins(11, 1), &[(ids[0], 11)]).unwrap();
        assert!(campaign.is_combat_active());
    }

    #[test]
    fn test_archive_is_terminal() {
        let (mut campaign, ids) = party_campaign(1);
        campaign.start_combat(goblins(12, 1), &[(ids[0], 11)]).unwrap();
        campaign.archive().unwrap();
        assert_eq!(campaign.phase(), CampaignPhase::Concluded);
        assert!(!campaign.is_combat_active());
        assert!(campaign.invariants_hold());

        assert_eq!(
            campaign.append_story_entry(NewStoryEntry::narration("Epilogue")),
            Err(CampaignError::Concluded)
        );
        assert_eq!(campaign.set_scene("Elsewhere"), Err(CampaignError::Concluded));
        assert_eq!(
            campaign.start_combat(goblins(13, 1), &[]),
            Err(CampaignError::Concluded)
        );
        assert_eq!(campaign.archive(), Err(CampaignError::Concluded));
    }

    #[test]
    fn test_serde_round_trip_keeps_state() {
        let (mut campaign, ids) = party_campaign(2);
        campaign
            .append_story_entry(NewStoryEntry::action("Vex", "I kick the door."))
            .unwrap();
        campaign
            .start_combat(goblins(14, 2), &[(ids[0], 4), (ids[1], 19)])
            .unwrap();
        campaign.advance_turn().unwrap();

        let json = serde_json::to_string(&campaign).unwrap();
        assert!(json.contains("\"type\":\"action\""));
        let restored: Campaign = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, campaign);
    }

    #[test]
    fn test_bad_tag_fails_deserialization() {
        let (campaign, _) = party_campaign(0);
        let mut value = serde_json::to_value(&campaign).unwrap();
        value["story_log"] = serde_json::json!([{
            "id": Uuid::new_v4(),
            "timestamp": Utc::now(),
            "type": "monologue",
            "speaker": null,
            "content": "...",
            "dice_roll": null
        }]);
        assert!(serde_json::from_value::<Campaign>(value).is_err());
    }

    fn corrupt(campaign: &Campaign, edit: impl FnOnce(&mut serde_json::Value)) -> Campaign {
        let mut value = serde_json::to_value(campaign).unwrap();
        edit(&mut value);
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_combat_flag_without_turn_order_is_an_error() {
        let (campaign, _) = party_campaign(1);
        let mut broken = corrupt(&campaign, |value| {
            value["combat_active"] = serde_json::json!(true);
            value["phase"] = serde_json::json!("InCombat");
        });
        assert!(!broken.invariants_hold());
        assert_eq!(broken.validate(), Err(CampaignError::InconsistentState));
        assert_eq!(broken.advance_turn(), Err(CampaignError::InconsistentState));
    }

    #[test]
    fn test_repeated_turn_order_fails_validation() {
        let (mut campaign, ids) = party_campaign(1);
        campaign.start_combat(goblins(19, 1), &[(ids[0], 11)]).unwrap();
        assert_eq!(campaign.validate(), Ok(()));

        let repeated = serde_json::to_value(CombatantId::Character(ids[0])).unwrap();
        let broken = corrupt(&campaign, |value| {
            value["turn_order"].as_array_mut().unwrap().push(repeated);
        });
        assert_eq!(broken.validate(), Err(CampaignError::InconsistentState));
    }
}
