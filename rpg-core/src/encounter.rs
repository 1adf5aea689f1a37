//! Encounter generation.
//!
//! An encounter is built by drawing enemy templates from a catalog until the
//! summed challenge rating meets the party's difficulty budget. The last draw
//! may overshoot the budget; it is never trimmed.

use crate::campaign::CombatantId;
use crate::character::{InventoryItem, ItemCategory};
use crate::dice::{DamageExpression, DiceError, DiceRollResult, DieType};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors from encounter generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncounterError {
    #[error("Party level must be at least 1, got {0}")]
    InvalidPartyLevel(u32),

    #[error("Enemy catalog has no template with a positive challenge rating")]
    NoEligibleTemplates,

    #[error("Unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

/// Draw a v4 UUID from the session RNG so seeded runs replay the same ids.
fn uuid_from_rng<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnemyId(pub Uuid);

impl fmt::Display for EnemyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncounterId(pub Uuid);

/// Difficulty tier of a campaign or encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
    Deadly,
}

impl Difficulty {
    /// Challenge budget per party level.
    pub fn multiplier(&self) -> f64 {
        match self {
            Difficulty::Easy => 0.5,
            Difficulty::Normal => 1.0,
            Difficulty::Hard => 1.5,
            Difficulty::Deadly => 2.0,
        }
    }

    pub fn budget(&self, party_level: u32) -> f64 {
        party_level as f64 * self.multiplier()
    }
}

impl FromStr for Difficulty {
    type Err = EncounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            "deadly" => Ok(Difficulty::Deadly),
            _ => Err(EncounterError::UnknownDifficulty(s.to_string())),
        }
    }
}

/// A catalog entry from which enemies are instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub name: String,
    pub challenge_rating: f64,
    pub hit_points: i32,
    pub armor_class: i32,
    pub damage: String,
    pub creature_type: String,
}

impl EnemyTemplate {
    pub fn new(
        name: impl Into<String>,
        challenge_rating: f64,
        hit_points: i32,
        armor_class: i32,
        damage: impl Into<String>,
        creature_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            challenge_rating,
            hit_points,
            armor_class,
            damage: damage.into(),
            creature_type: creature_type.into(),
        }
    }

    fn instantiate<R: Rng + ?Sized>(&self, rng: &mut R, ordinal: usize) -> Enemy {
        let initiative = rng.gen_range(1..=DieType::D20.sides()) as i32;
        Enemy {
            id: EnemyId(uuid_from_rng(rng)),
            name: format!("{} {}", self.name, ordinal),
            hit_points: self.hit_points,
            max_hit_points: self.hit_points,
            armor_class: self.armor_class,
            initiative,
            damage: self.damage.clone(),
            challenge_rating: self.challenge_rating,
            creature_type: self.creature_type.clone(),
            description: format!("A fearsome {}", self.name.to_lowercase()),
        }
    }
}

lazy_static::lazy_static! {
    /// The default monster roster.
    pub static ref STANDARD_TEMPLATES: Vec<EnemyTemplate> = vec![
        EnemyTemplate::new("Goblin", 0.25, 7, 15, "1d6", "Humanoid"),
        EnemyTemplate::new("Orc", 0.5, 15, 13, "1d12", "Humanoid"),
        EnemyTemplate::new("Skeleton", 0.25, 13, 13, "1d6", "Undead"),
        EnemyTemplate::new("Ogre", 2.0, 59, 11, "2d8", "Giant"),
        EnemyTemplate::new("Troll", 5.0, 84, 15, "2d6", "Giant"),
    ];
}

/// An immutable set of enemy templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyCatalog {
    templates: Vec<EnemyTemplate>,
}

impl EnemyCatalog {
    pub fn new(templates: Vec<EnemyTemplate>) -> Self {
        Self { templates }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_TEMPLATES.clone())
    }

    pub fn templates(&self) -> &[EnemyTemplate] {
        &self.templates
    }

    /// Templates with a positive challenge rating.
    fn eligible(&self) -> Vec<&EnemyTemplate> {
        self.templates
            .iter()
            .filter(|t| t.challenge_rating > 0.0)
            .collect()
    }
}

impl Default for EnemyCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// A live enemy in an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub id: EnemyId,
    pub name: String,
    pub hit_points: i32,
    pub max_hit_points: i32,
    pub armor_class: i32,
    pub initiative: i32,
    pub damage: String,
    pub challenge_rating: f64,
    pub creature_type: String,
    pub description: String,
}

impl Enemy {
    pub fn is_defeated(&self) -> bool {
        self.hit_points <= 0
    }

    /// Apply damage, returning the damage actually taken. Hit points floor
    /// at zero.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.hit_points;
        self.hit_points = before
            .saturating_sub(amount.max(0))
            .max(before.min(0));
        before.saturating_sub(self.hit_points)
    }

    /// Roll this enemy's damage expression.
    pub fn roll_damage<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<DiceRollResult, DiceError> {
        DamageExpression::parse(&self.damage)?.roll(rng)
    }
}

/// A generated fight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub enemies: Vec<Enemy>,
    pub round_counter: u32,
    pub active: bool,
    /// Filled in by the campaign when combat starts.
    pub turn_order: Vec<CombatantId>,
}

impl Encounter {
    pub fn total_challenge(&self) -> f64 {
        self.enemies.iter().map(|e| e.challenge_rating).sum()
    }

    pub fn is_cleared(&self) -> bool {
        self.enemies.iter().all(Enemy::is_defeated)
    }

    pub fn enemy(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.id == id)
    }

    pub fn enemy_mut(&mut self, id: EnemyId) -> Option<&mut Enemy> {
        self.enemies.iter_mut().find(|e| e.id == id)
    }

    pub fn defeated(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.iter().filter(|e| e.is_defeated())
    }
}

/// Build an encounter for a party of `party_level` at `difficulty`.
pub fn generate_encounter<R: Rng + ?Sized>(
    rng: &mut R,
    catalog: &EnemyCatalog,
    party_level: u32,
    difficulty: Difficulty,
) -> Result<Encounter, EncounterError> {
    if party_level == 0 {
        return Err(EncounterError::InvalidPartyLevel(party_level));
    }
    let eligible = catalog.eligible();
    if eligible.is_empty() {
        return Err(EncounterError::NoEligibleTemplates);
    }

    let budget = difficulty.budget(party_level);
    let mut enemies = Vec::new();
    let mut running_total = 0.0;

    while running_total < budget {
        let Some(template) = eligible.choose(rng) else {
            return Err(EncounterError::NoEligibleTemplates);
        };
        enemies.push(template.instantiate(rng, enemies.len() + 1));
        running_total += template.challenge_rating;
    }

    tracing::debug!(
        party_level,
        ?difficulty,
        budget,
        total = running_total,
        enemies = enemies.len(),
        "encounter generated"
    );

    Ok(Encounter {
        id: EncounterId(uuid_from_rng(rng)),
        enemies,
        round_counter: 1,
        active: true,
        turn_order: Vec::new(),
    })
}

/// Chance that a defeated enemy carries an item.
pub const ITEM_DROP_CHANCE: f64 = 0.3;

lazy_static::lazy_static! {
    /// Items a defeated enemy may drop, drawn uniformly.
    pub static ref LOOT_ITEMS: Vec<InventoryItem> = vec![
        InventoryItem::new(
            "healing_potion",
            "Healing Potion",
            ItemCategory::Potion,
            "Restores 2d4+2 hit points",
        )
        .with_value(50),
        InventoryItem::new(
            "silver_dagger",
            "Silver Dagger",
            ItemCategory::Weapon,
            "A silver dagger",
        )
        .with_damage("1d4")
        .with_value(25),
        InventoryItem::new("torch", "Torch", ItemCategory::Misc, "A torch").with_value(1),
    ];
}

/// Treasure from a cleared fight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Loot {
    pub gold: u32,
    pub experience: u32,
    pub items: Vec<InventoryItem>,
}

/// Gold an enemy of this challenge rating can drop at most.
fn gold_ceiling(challenge_rating: f64) -> u32 {
    ((challenge_rating * 10.0).ceil() as u32).max(1)
}

/// Roll loot for every defeated enemy. Each drops 1 to ceil(CR×10) gold,
/// CR×100 experience rounded up, and an item with [`ITEM_DROP_CHANCE`].
pub fn roll_loot<R: Rng + ?Sized>(rng: &mut R, encounter: &Encounter) -> Loot {
    encounter.defeated().fold(Loot::default(), |mut loot, enemy| {
        loot.gold += rng.gen_range(1..=gold_ceiling(enemy.challenge_rating));
        loot.experience += (enemy.challenge_rating * 100.0).ceil() as u32;
        if rng.gen_bool(ITEM_DROP_CHANCE) {
            if let Some(item) = LOOT_ITEMS.choose(rng) {
                loot.items.push(item.clone());
            }
        }
        loot
    })
}
