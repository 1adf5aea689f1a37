//! Character generation.
//!
//! Rolls ability scores, derives level-1 combat stats and stocks a new
//! character from the class rule tables.

use crate::character::{
    AbilityScores, Alignment, Character, CharacterClass, CharacterId, Race, RulesError,
};
use crate::dice::DieType;
use chrono::Utc;
use rand::Rng;

/// Background used when the player does not write one.
pub const DEFAULT_BACKGROUND: &str = "Adventurer seeking glory and treasure";

/// Gold every new character starts with.
pub const STARTING_GOLD: u32 = 100;

/// Ability modifier: floor((score - 10) / 2), rounding toward negative
/// infinity (8 -> -1, not 0).
pub fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// Roll 4d6 and drop the lowest die.
pub fn roll_4d6_drop_lowest<R: Rng + ?Sized>(rng: &mut R) -> i32 {
    let mut faces: Vec<u32> = (0..4)
        .map(|_| rng.gen_range(1..=DieType::D6.sides()))
        .collect();
    faces.sort_unstable();
    faces[1..].iter().sum::<u32>() as i32
}

/// Roll a full set of ability scores, each independently 4d6 drop lowest.
pub fn generate_ability_scores<R: Rng + ?Sized>(rng: &mut R) -> AbilityScores {
    AbilityScores {
        strength: roll_4d6_drop_lowest(rng),
        dexterity: roll_4d6_drop_lowest(rng),
        constitution: roll_4d6_drop_lowest(rng),
        intelligence: roll_4d6_drop_lowest(rng),
        wisdom: roll_4d6_drop_lowest(rng),
        charisma: roll_4d6_drop_lowest(rng),
    }
}

/// Create a level-1 character with the class starting kit.
pub fn create_character(
    name: impl Into<String>,
    race: Race,
    class: CharacterClass,
    ability_scores: AbilityScores,
    background: Option<String>,
) -> Character {
    let data = class.data();
    let mut character = Character {
        id: CharacterId::new(),
        name: name.into(),
        race,
        class,
        level: 1,
        alignment: Alignment::default(),
        ability_scores,
        hit_points: 0,
        max_hit_points: 0,
        armor_class: 0,
        initiative_bonus: 0,
        proficiency_bonus: 0,
        inventory: data.starting_inventory,
        spells: data.starting_spells,
        skills: Vec::new(),
        background: background.unwrap_or_else(|| DEFAULT_BACKGROUND.to_string()),
        personality: String::new(),
        ideals: String::new(),
        bonds: String::new(),
        flaws: String::new(),
        experience: 0,
        gold: STARTING_GOLD,
        finalized: false,
        created_at: Utc::now(),
    };
    character.recompute_derived();
    character.hit_points = character.max_hit_points;

    tracing::debug!(
        name = %character.name,
        race = %race,
        class = %class,
        max_hp = character.max_hit_points,
        "character created"
    );
    character
}

/// Create a character from free-text race and class tags.
pub fn create_character_from_tags(
    name: impl Into<String>,
    race: &str,
    class: &str,
    ability_scores: AbilityScores,
    background: Option<String>,
) -> Result<Character, RulesError> {
    let race: Race = race.parse()?;
    let class: CharacterClass = class.parse()?;
    Ok(create_character(name, race, class, ability_scores, background))
}

/// Builder for creating characters step by step.
#[derive(Debug, Clone, Default)]
pub struct CharacterBuilder {
    name: Option<String>,
    race: Option<Race>,
    class: Option<CharacterClass>,
    background: Option<String>,
    ability_scores: Option<AbilityScores>,
}

/// Error from character building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    MissingName,
    MissingRace,
    MissingClass,
    MissingAbilityScores,
}

impl std::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderError::MissingName => write!(f, "Character name is required"),
            BuilderError::MissingRace => write!(f, "Race selection is required"),
            BuilderError::MissingClass => write!(f, "Class selection is required"),
            BuilderError::MissingAbilityScores => write!(f, "Ability scores are required"),
        }
    }
}

impl std::error::Error for BuilderError {}

impl CharacterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn race(mut self, race: Race) -> Self {
        self.race = Some(race);
        self
    }

    pub fn class(mut self, class: CharacterClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn background(mut self, background: impl Into<String>) -> Self {
        self.background = Some(background.into());
        self
    }

    /// Set the ability scores directly.
    pub fn ability_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = Some(scores);
        self
    }

    /// Roll fresh ability scores, replacing any earlier set.
    pub fn roll_ability_scores<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.ability_scores = Some(generate_ability_scores(rng));
        self
    }

    pub fn build(self) -> Result<Character, BuilderError> {
        let name = self.name.ok_or(BuilderError::MissingName)?;
        let race = self.race.ok_or(BuilderError::MissingRace)?;
        let class = self.class.ok_or(BuilderError::MissingClass)?;
        let scores = self
            .ability_scores
            .ok_or(BuilderError::MissingAbilityScores)?;
        Ok(create_character(name, race, class, scores, self.background))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{Ability, SkillName};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ability_modifier_floors() {
        assert_eq!(ability_modifier(3), -4);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(18), 4);
        assert_eq!(ability_modifier(1), -5);
    }

    #[test]
    fn test_generated_scores_in_range() {
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..500 {
            let scores = generate_ability_scores(&mut rng);
            for ability in Ability::all() {
                assert!((3..=18).contains(&scores.get(ability)));
            }
        }
    }

    #[test]
    fn test_drop_lowest_keeps_the_top_three_faces() {
        let mut rng = StdRng::seed_from_u64(64);
        for _ in 0..100 {
            let mut replay = rng.clone();
            let mut faces: Vec<u32> = (0..4).map(|_| replay.gen_range(1..=6)).collect();
            faces.sort_unstable();
            let expected = (faces[1] + faces[2] + faces[3]) as i32;
            assert_eq!(roll_4d6_drop_lowest(&mut rng), expected);
        }
    }

    #[test]
    fn test_generated_scores_cluster_near_twelve() {
        let mut rng = StdRng::seed_from_u64(8);
        let total: i32 = (0..2000).map(|_| roll_4d6_drop_lowest(&mut rng)).sum();
        let mean = total as f64 / 2000.0;
        assert!((11.5..13.0).contains(&mean), "mean was {mean}");
    }

    #[test]
    fn test_every_class_starts_at_full_health() {
        let mut rng = StdRng::seed_from_u64(5);
        for class in CharacterClass::all() {
            let scores = generate_ability_scores(&mut rng);
            let c = create_character("Test", Race::Human, *class, scores, None);
            assert_eq!(c.hit_points, c.max_hit_points);
            assert_eq!(c.max_hit_points, 10 + scores.modifier(Ability::Constitution));
            assert_eq!(c.armor_class, 10 + scores.modifier(Ability::Dexterity));
            assert_eq!(c.initiative_bonus, scores.modifier(Ability::Dexterity));
            assert_eq!(c.proficiency_bonus, 2);
            assert_eq!(c.skills.len(), 9);
            assert_eq!(c.gold, 100);
            assert_eq!(c.experience, 0);
            assert_eq!(c.level, 1);
        }
    }

    #[test]
    fn test_low_dexterity_is_not_clamped() {
        let scores = AbilityScores::new(10, 6, 10, 10, 10, 10);
        let c = create_character("Clumsy", Race::Dwarf, CharacterClass::Cleric, scores, None);
        assert_eq!(c.armor_class, 8);
        assert_eq!(c.initiative_bonus, -2);
    }

    #[test]
    fn test_rogue_skills() {
        let scores = AbilityScores::new(10, 16, 10, 12, 10, 8);
        let c = create_character("Vex", Race::Halfling, CharacterClass::Rogue, scores, None);
        let stealth = c.skill(SkillName::Stealth).unwrap();
        assert!(stealth.proficient);
        assert_eq!(stealth.modifier, 5);
        let deception = c.skill(SkillName::Deception).unwrap();
        assert!(deception.proficient);
        assert_eq!(deception.modifier, 1);
        let arcana = c.skill(SkillName::Arcana).unwrap();
        assert!(!arcana.proficient);
        assert_eq!(arcana.modifier, 1);
    }

    #[test]
    fn test_background_default_and_override() {
        let scores = AbilityScores::default();
        let c = create_character("A", Race::Elf, CharacterClass::Bard, scores, None);
        assert_eq!(c.background, DEFAULT_BACKGROUND);
        let c = create_character(
            "B",
            Race::Elf,
            CharacterClass::Bard,
            scores,
            Some("Former court jester".to_string()),
        );
        assert_eq!(c.background, "Former court jester");
    }

    #[test]
    fn test_from_tags_rejects_unknown_rule_sets() {
        let scores = AbilityScores::default();
        assert!(create_character_from_tags("Ok", "Tiefling", "Warlock", scores, None).is_ok());
        assert!(matches!(
            create_character_from_tags("Bad", "Kobold", "Warlock", scores, None),
            Err(RulesError::UnknownRuleSet { kind: "race", .. })
        ));
        assert!(matches!(
            create_character_from_tags("Bad", "Gnome", "Gunslinger", scores, None),
            Err(RulesError::UnknownRuleSet { kind: "class", .. })
        ));
    }

    #[test]
    fn test_builder_requires_fields() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            CharacterBuilder::new().build().unwrap_err(),
            BuilderError::MissingName
        );
        assert_eq!(
            CharacterBuilder::new()
                .name("Nameless")
                .race(Race::Gnome)
                .build()
                .unwrap_err(),
            BuilderError::MissingClass
        );

        let c = CharacterBuilder::new()
            .name("Fizzwick")
            .race(Race::Gnome)
            .class(CharacterClass::Wizard)
            .roll_ability_scores(&mut rng)
            .build()
            .unwrap();
        assert_eq!(c.spells.len(), 2);
        assert!(c.inventory.iter().any(|i| i.id == "spellbook"));
    }
}
