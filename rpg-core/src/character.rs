//! Character model.
//!
//! Contains abilities, skills, races, classes, inventory, spells and the
//! `Character` aggregate. Every derived stat is recomputed from ability
//! scores and level by `Character::recompute_derived`.

use crate::character_builder::ability_modifier;
use crate::dice::{self, DiceError, DiceRollResult, DieType};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors from rule-set lookups and character edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("Unknown {kind}: {tag}")]
    UnknownRuleSet { kind: &'static str, tag: String },

    #[error("Character {0} is finalized; ability scores can no longer change")]
    CharacterFinalized(String),
}

impl RulesError {
    fn unknown(kind: &'static str, tag: &str) -> Self {
        RulesError::UnknownRuleSet {
            kind,
            tag: tag.to_string(),
        }
    }
}

/// Lowercase and strip everything but letters and digits, so `Half-Elf`,
/// `half elf` and `halfelf` name the same tag.
fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Raw ability scores. Generated scores fall in 3..=18; manual edits are
/// not bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: i32) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Skills
// ============================================================================

/// The skills tracked on a character sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillName {
    Athletics,
    Acrobatics,
    Stealth,
    Arcana,
    Investigation,
    Perception,
    Insight,
    Persuasion,
    Deception,
}

impl SkillName {
    pub fn name(&self) -> &'static str {
        match self {
            SkillName::Athletics => "Athletics",
            SkillName::Acrobatics => "Acrobatics",
            SkillName::Stealth => "Stealth",
            SkillName::Arcana => "Arcana",
            SkillName::Investigation => "Investigation",
            SkillName::Perception => "Perception",
            SkillName::Insight => "Insight",
            SkillName::Persuasion => "Persuasion",
            SkillName::Deception => "Deception",
        }
    }

    /// The ability that governs this skill.
    pub fn ability(&self) -> Ability {
        match self {
            SkillName::Athletics => Ability::Strength,
            SkillName::Acrobatics | SkillName::Stealth => Ability::Dexterity,
            SkillName::Arcana | SkillName::Investigation => Ability::Intelligence,
            SkillName::Perception | SkillName::Insight => Ability::Wisdom,
            SkillName::Persuasion | SkillName::Deception => Ability::Charisma,
        }
    }

    /// Sheet order.
    pub fn all() -> [SkillName; 9] {
        [
            SkillName::Athletics,
            SkillName::Acrobatics,
            SkillName::Stealth,
            SkillName::Arcana,
            SkillName::Investigation,
            SkillName::Perception,
            SkillName::Insight,
            SkillName::Persuasion,
            SkillName::Deception,
        ]
    }
}

impl fmt::Display for SkillName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SkillName {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_tag(s);
        SkillName::all()
            .into_iter()
            .find(|skill| normalize_tag(skill.name()) == wanted)
            .ok_or_else(|| RulesError::unknown("skill", s))
    }
}

/// A skill entry on a character sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: SkillName,
    pub modifier: i32,
    pub proficient: bool,
}

// ============================================================================
// Race, Class, Alignment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Race {
    Human,
    Elf,
    Dwarf,
    Halfling,
    Dragonborn,
    Gnome,
    #[serde(rename = "Half-Elf")]
    HalfElf,
    #[serde(rename = "Half-Orc")]
    HalfOrc,
    Tiefling,
}

impl Race {
    pub fn name(&self) -> &'static str {
        match self {
            Race::Human => "Human",
            Race::Elf => "Elf",
            Race::Dwarf => "Dwarf",
            Race::Halfling => "Halfling",
            Race::Dragonborn => "Dragonborn",
            Race::Gnome => "Gnome",
            Race::HalfElf => "Half-Elf",
            Race::HalfOrc => "Half-Orc",
            Race::Tiefling => "Tiefling",
        }
    }

    pub fn all() -> &'static [Race] {
        &[
            Race::Human,
            Race::Elf,
            Race::Dwarf,
            Race::Halfling,
            Race::Dragonborn,
            Race::Gnome,
            Race::HalfElf,
            Race::HalfOrc,
            Race::Tiefling,
        ]
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Race {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_tag(s);
        Race::all()
            .iter()
            .copied()
            .find(|race| normalize_tag(race.name()) == wanted)
            .ok_or_else(|| RulesError::unknown("race", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CharacterClass {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_tag(s);
        CharacterClass::all()
            .iter()
            .copied()
            .find(|class| normalize_tag(class.name()) == wanted)
            .ok_or_else(|| RulesError::unknown("class", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Alignment {
    LawfulGood,
    NeutralGood,
    ChaoticGood,
    LawfulNeutral,
    #[default]
    TrueNeutral,
    ChaoticNeutral,
    LawfulEvil,
    NeutralEvil,
    ChaoticEvil,
}

// ============================================================================
// Items and Spells
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Weapon,
    Armor,
    Potion,
    Scroll,
    Misc,
}

/// An inventory entry: an item template plus how many are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: ItemCategory,
    pub description: String,
    pub damage: Option<String>,
    pub armor_class_bonus: Option<i32>,
    pub magical: bool,
    pub quantity: u32,
    pub value: u32,
}

impl InventoryItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: ItemCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            description: description.into(),
            damage: None,
            armor_class_bonus: None,
            magical: false,
            quantity: 1,
            value: 0,
        }
    }

    pub fn with_damage(mut self, damage: impl Into<String>) -> Self {
        self.damage = Some(damage.into());
        self
    }

    pub fn with_armor_bonus(mut self, bonus: i32) -> Self {
        self.armor_class_bonus = Some(bonus);
        self
    }

    pub fn magical(mut self) -> Self {
        self.magical = true;
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spell {
    pub id: String,
    pub name: String,
    /// 0 is a cantrip.
    pub level: u8,
    pub school: String,
    pub casting_time: String,
    pub range: String,
    pub components: String,
    pub duration: String,
    pub description: String,
    pub damage: Option<String>,
}

// ============================================================================
// Character
// ============================================================================

/// Outcome of a d20 skill check against a DC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCheck {
    pub skill: SkillName,
    pub dc: i32,
    pub roll: DiceRollResult,
    pub success: bool,
}

/// Proficiency bonus by character level.
pub fn proficiency_bonus_for_level(level: u8) -> i32 {
    match level {
        0..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        _ => 6,
    }
}

/// A playable character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub race: Race,
    pub class: CharacterClass,
    pub level: u8,
    pub alignment: Alignment,
    pub ability_scores: AbilityScores,

    pub hit_points: i32,
    pub max_hit_points: i32,
    pub armor_class: i32,
    pub initiative_bonus: i32,
    pub proficiency_bonus: i32,

    pub inventory: Vec<InventoryItem>,
    pub spells: Vec<Spell>,
    pub skills: Vec<Skill>,

    pub background: String,
    pub personality: String,
    pub ideals: String,
    pub bonds: String,
    pub flaws: String,

    pub experience: u32,
    pub gold: u32,

    /// Set once the player locks in their sheet for the session.
    #[serde(default)]
    pub finalized: bool,
    pub created_at: DateTime<Utc>,
}

impl Character {
    /// Recompute every derived stat from ability scores, level and class.
    ///
    /// Current hit points are clamped to the new maximum.
    pub fn recompute_derived(&mut self) {
        let scores = self.ability_scores;
        self.proficiency_bonus = proficiency_bonus_for_level(self.level);
        self.max_hit_points = 10 + scores.modifier(Ability::Constitution);
        self.hit_points = self.hit_points.min(self.max_hit_points);
        self.armor_class = 10 + scores.modifier(Ability::Dexterity);
        self.initiative_bonus = scores.modifier(Ability::Dexterity);

        let proficient = self.class.data().proficient_skills;
        self.skills = SkillName::all()
            .into_iter()
            .map(|name| {
                let is_proficient = proficient.contains(&name);
                let bonus = if is_proficient {
                    self.proficiency_bonus
                } else {
                    0
                };
                Skill {
                    name,
                    modifier: scores.modifier(name.ability()) + bonus,
                    proficient: is_proficient,
                }
            })
            .collect();
    }

    /// Replace the ability scores (manual edit or regeneration).
    pub fn set_ability_scores(&mut self, scores: AbilityScores) -> Result<(), RulesError> {
        if self.finalized {
            return Err(RulesError::CharacterFinalized(self.name.clone()));
        }
        self.ability_scores = scores;
        self.recompute_derived();
        Ok(())
    }

    /// Lock the sheet; ability scores are immutable afterwards.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn skill(&self, name: SkillName) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// Roll d20 + skill modifier against `dc`.
    pub fn skill_check<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        name: SkillName,
        dc: i32,
    ) -> Result<SkillCheck, DiceError> {
        let modifier = self
            .skill(name)
            .map(|s| s.modifier)
            .unwrap_or_else(|| self.ability_scores.modifier(name.ability()));
        let roll = dice::roll(rng, DieType::D20, 1, modifier)?;
        Ok(SkillCheck {
            skill: name,
            dc,
            success: roll.meets_dc(dc),
            roll,
        })
    }

    /// Armor class including carried armor bonuses (e.g. a shield).
    pub fn effective_armor_class(&self) -> i32 {
        let bonus: i32 = self
            .inventory
            .iter()
            .filter(|item| item.category == ItemCategory::Armor && item.quantity > 0)
            .filter_map(|item| item.armor_class_bonus)
            .sum();
        self.armor_class + bonus
    }

    /// Apply damage, returning the damage actually taken. Hit points never
    /// drop below zero, or below a value that is already negative.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.hit_points;
        self.hit_points = before
            .saturating_sub(amount.max(0))
            .max(before.min(0));
        before.saturating_sub(self.hit_points)
    }

    /// Heal up to maximum hit points, returning the hit points actually
    /// restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hit_points;
        self.hit_points = before
            .saturating_add(amount.max(0))
            .min(self.max_hit_points)
            .max(before);
        self.hit_points.saturating_sub(before)
    }

    pub fn is_conscious(&self) -> bool {
        self.hit_points > 0
    }

    pub fn gain_experience(&mut self, amount: u32) {
        self.experience = self.experience.saturating_add(amount);
    }

    pub fn add_gold(&mut self, amount: u32) {
        self.gold = self.gold.saturating_add(amount);
    }

    /// Add an item, stacking onto an existing entry with the same id.
    pub fn add_item(&mut self, item: InventoryItem) {
        if let Some(existing) = self.inventory.iter_mut().find(|i| i.id == item.id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.inventory.push(item);
        }
    }

    /// Remove up to `quantity` of an item. Returns false if the item is not
    /// carried or not enough of it is.
    pub fn remove_item(&mut self, id: &str, quantity: u32) -> bool {
        let Some(pos) = self.inventory.iter().position(|i| i.id == id) else {
            return false;
        };
        let item = &mut self.inventory[pos];
        if item.quantity < quantity {
            return false;
        }
        item.quantity -= quantity;
        if item.quantity == 0 {
            self.inventory.remove(pos);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character_builder::create_character;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fighter(scores: AbilityScores) -> Character {
        create_character("Brakka", Race::HalfOrc, CharacterClass::Fighter, scores, None)
    }

    #[test]
    fn test_tags_parse_case_and_punctuation_insensitively() {
        assert_eq!("half-elf".parse::<Race>().unwrap(), Race::HalfElf);
        assert_eq!("Half Orc".parse::<Race>().unwrap(), Race::HalfOrc);
        assert_eq!("WIZARD".parse::<CharacterClass>().unwrap(), CharacterClass::Wizard);
        assert_eq!("stealth".parse::<SkillName>().unwrap(), SkillName::Stealth);
    }

    #[test]
    fn test_unknown_tags_are_errors() {
        assert_eq!(
            "Artificer".parse::<CharacterClass>(),
            Err(RulesError::UnknownRuleSet {
                kind: "class",
                tag: "Artificer".to_string()
            })
        );
        assert!("Orc".parse::<Race>().is_err());
        assert!("Survival".parse::<SkillName>().is_err());
    }

    #[test]
    fn test_proficiency_bonus_by_level() {
        assert_eq!(proficiency_bonus_for_level(1), 2);
        assert_eq!(proficiency_bonus_for_level(5), 3);
        assert_eq!(proficiency_bonus_for_level(20), 6);
    }

    #[test]
    fn test_edit_scores_recomputes_everything() {
        let mut c = fighter(AbilityScores::default());
        assert_eq!(c.max_hit_points, 10);

        c.set_ability_scores(AbilityScores::new(16, 8, 16, 10, 12, 10))
            .unwrap();
        assert_eq!(c.max_hit_points, 13);
        // Current HP is never raised by a recompute, only clamped.
        assert_eq!(c.hit_points, 10);
        assert_eq!(c.armor_class, 9);
        assert_eq!(c.initiative_bonus, -1);
        let athletics = c.skill(SkillName::Athletics).unwrap();
        assert!(athletics.proficient);
        assert_eq!(athletics.modifier, 3 + 2);
        assert_eq!(c.skill(SkillName::Stealth).unwrap().modifier, -1);
    }

    #[test]
    fn test_lowering_con_clamps_hit_points() {
        let mut c = fighter(AbilityScores::new(10, 10, 18, 10, 10, 10));
        assert_eq!(c.hit_points, 14);
        c.set_ability_scores(AbilityScores::new(10, 10, 6, 10, 10, 10))
            .unwrap();
        assert_eq!(c.max_hit_points, 8);
        assert_eq!(c.hit_points, 8);
    }

    #[test]
    fn test_finalized_scores_are_locked() {
        let mut c = fighter(AbilityScores::default());
        c.finalize();
        assert!(matches!(
            c.set_ability_scores(AbilityScores::new(18, 18, 18, 18, 18, 18)),
            Err(RulesError::CharacterFinalized(_))
        ));
        assert_eq!(c.ability_scores, AbilityScores::default());
    }

    #[test]
    fn test_damage_and_healing_stay_in_bounds() {
        let mut c = fighter(AbilityScores::default());
        assert_eq!(c.take_damage(4), 4);
        assert_eq!(c.hit_points, 6);
        assert_eq!(c.heal(100), 4);
        assert_eq!(c.hit_points, c.max_hit_points);
        assert_eq!(c.take_damage(50), 10);
        assert_eq!(c.hit_points, 0);
        assert!(!c.is_conscious());
        assert_eq!(c.take_damage(-5), 0);
    }

    #[test]
    fn test_extreme_amounts_saturate() {
        let mut c = fighter(AbilityScores::new(10, 10, 10, 10, 10, 10));
        c.take_damage(3);
        assert_eq!(c.heal(i32::MAX), 3);
        assert_eq!(c.hit_points, c.max_hit_points);
        assert_eq!(c.take_damage(i32::MAX), c.max_hit_points);
        assert_eq!(c.hit_points, 0);

        c.hit_points = -7;
        assert_eq!(c.take_damage(i32::MAX), 0);
        assert_eq!(c.hit_points, -7);
        assert_eq!(c.heal(i32::MAX), c.max_hit_points + 7);

        c.hit_points = i32::MIN;
        assert_eq!(c.take_damage(5), 0);
        assert_eq!(c.heal(3), 3);
    }

    #[test]
    fn test_shield_counts_toward_effective_ac() {
        let c = fighter(AbilityScores::new(10, 14, 10, 10, 10, 10));
        assert_eq!(c.armor_class, 12);
        assert_eq!(c.effective_armor_class(), 14);
    }

    #[test]
    fn test_inventory_stacks_and_removes() {
        let mut c = fighter(AbilityScores::default());
        let potion = InventoryItem::new(
            "healing_potion",
            "Healing Potion",
            ItemCategory::Potion,
            "Heals 2d4+2",
        )
        .with_value(50);
        c.add_item(potion.clone());
        c.add_item(potion.with_quantity(2));
        let carried = c.inventory.iter().find(|i| i.id == "healing_potion").unwrap();
        assert_eq!(carried.quantity, 3);

        assert!(!c.remove_item("healing_potion", 4));
        assert!(c.remove_item("healing_potion", 3));
        assert!(c.inventory.iter().all(|i| i.id != "healing_potion"));
        assert!(!c.remove_item("missing", 1));
    }

    #[test]
    fn test_skill_check_uses_sheet_modifier() {
        let c = fighter(AbilityScores::new(16, 10, 10, 10, 10, 10));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let check = c.skill_check(&mut rng, SkillName::Athletics, 12).unwrap();
            assert_eq!(check.roll.modifier, 5);
            assert_eq!(check.success, check.roll.final_total >= 12);
        }
    }
}
