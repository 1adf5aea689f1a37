//! Class rule tables for character creation.
//!
//! Contains the starting kit, starting spells and skill proficiencies for
//! all twelve classes. The tables are a `match` over `CharacterClass`, so a
//! new class cannot compile without an entry.

use crate::character::{CharacterClass, InventoryItem, ItemCategory, SkillName, Spell};

/// Class-specific data for character creation.
pub struct ClassData {
    /// Items every new character of the class starts with.
    pub starting_inventory: Vec<InventoryItem>,
    /// Spells known at level 1. Empty for non-casters.
    pub starting_spells: Vec<Spell>,
    /// Skills the class is proficient in.
    pub proficient_skills: &'static [SkillName],
}

fn weapon(id: &str, name: &str, description: &str, damage: &str, value: u32) -> InventoryItem {
    InventoryItem::new(id, name, ItemCategory::Weapon, description)
        .with_damage(damage)
        .with_value(value)
}

fn gear(id: &str, name: &str, description: &str, value: u32) -> InventoryItem {
    InventoryItem::new(id, name, ItemCategory::Misc, description).with_value(value)
}

#[allow(clippy::too_many_arguments)]
fn spell(
    id: &str,
    name: &str,
    level: u8,
    school: &str,
    casting_time: &str,
    range: &str,
    duration: &str,
    description: &str,
    damage: Option<&str>,
) -> Spell {
    Spell {
        id: id.to_string(),
        name: name.to_string(),
        level,
        school: school.to_string(),
        casting_time: casting_time.to_string(),
        range: range.to_string(),
        components: "V, S".to_string(),
        duration: duration.to_string(),
        description: description.to_string(),
        damage: damage.map(str::to_string),
    }
}

impl CharacterClass {
    /// Get class data for character creation.
    pub fn data(&self) -> ClassData {
        match self {
            CharacterClass::Barbarian => ClassData {
                starting_inventory: vec![weapon("axe", "Greataxe", "A massive axe", "1d12", 30)],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Athletics, SkillName::Perception],
            },
            CharacterClass::Bard => ClassData {
                starting_inventory: vec![weapon("rapier", "Rapier", "An elegant blade", "1d8", 25)],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Persuasion, SkillName::Deception],
            },
            CharacterClass::Cleric => ClassData {
                starting_inventory: vec![
                    weapon("mace", "Mace", "A holy mace", "1d6", 5),
                    gear("holy_symbol", "Holy Symbol", "Symbol of your faith", 10).magical(),
                ],
                starting_spells: vec![spell(
                    "cure_wounds",
                    "Cure Wounds",
                    1,
                    "Evocation",
                    "1 action",
                    "Touch",
                    "Instantaneous",
                    "Heal 1d8 + spellcasting modifier",
                    Some("1d8"),
                )],
                proficient_skills: &[SkillName::Insight, SkillName::Persuasion],
            },
            CharacterClass::Druid => ClassData {
                starting_inventory: vec![
                    weapon("staff", "Druidic Staff", "A natural staff", "1d6", 10).magical(),
                ],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Perception, SkillName::Insight],
            },
            CharacterClass::Fighter => ClassData {
                starting_inventory: vec![
                    weapon("sword", "Longsword", "A versatile blade", "1d8", 15),
                    InventoryItem::new("shield", "Shield", ItemCategory::Armor, "A sturdy shield")
                        .with_armor_bonus(2)
                        .with_value(10),
                ],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Athletics, SkillName::Perception],
            },
            CharacterClass::Monk => ClassData {
                starting_inventory: vec![weapon(
                    "fists",
                    "Martial Arts",
                    "Your body is a weapon",
                    "1d4",
                    0,
                )],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Acrobatics, SkillName::Insight],
            },
            CharacterClass::Paladin => ClassData {
                starting_inventory: vec![
                    weapon("sword", "Longsword", "A holy blade", "1d8", 50).magical(),
                ],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Athletics, SkillName::Persuasion],
            },
            CharacterClass::Ranger => ClassData {
                starting_inventory: vec![weapon("bow", "Longbow", "A hunting bow", "1d8", 50)],
                starting_spells: Vec::new(),
                proficient_skills: &[SkillName::Stealth, SkillName::Perception],
            },
            CharacterClass::Rogue => ClassData {
                starting_inventory: vec![
                    weapon("dagger", "Dagger", "A short blade", "1d4", 2).with_quantity(2),
                    gear("lockpicks", "Thieves' Tools", "For picking locks", 25),
                ],
                starting_spells: Vec::new(),
                proficient_skills: &[
                    SkillName::Stealth,
                    SkillName::Acrobatics,
                    SkillName::Deception,
                ],
            },
            CharacterClass::Sorcerer => ClassData {
                starting_inventory: vec![weapon("dagger", "Dagger", "A simple blade", "1d4", 2)],
                starting_spells: vec![spell(
                    "burning_hands",
                    "Burning Hands",
                    1,
                    "Evocation",
                    "1 action",
                    "15 feet",
                    "Instantaneous",
                    "Cone of fire damage",
                    Some("3d6"),
                )],
                proficient_skills: &[SkillName::Persuasion, SkillName::Arcana],
            },
            CharacterClass::Warlock => ClassData {
                starting_inventory: vec![
                    gear("rod", "Arcane Focus", "Channel eldritch power", 20).magical(),
                ],
                starting_spells: vec![spell(
                    "eldritch_blast",
                    "Eldritch Blast",
                    0,
                    "Evocation",
                    "1 action",
                    "120 feet",
                    "Instantaneous",
                    "A beam of crackling energy",
                    Some("1d10"),
                )],
                proficient_skills: &[SkillName::Deception, SkillName::Arcana],
            },
            CharacterClass::Wizard => ClassData {
                starting_inventory: vec![
                    weapon("staff", "Quarterstaff", "A simple staff", "1d6", 2),
                    gear("spellbook", "Spellbook", "Contains your spells", 50),
                ],
                starting_spells: vec![
                    spell(
                        "magic_missile",
                        "Magic Missile",
                        1,
                        "Evocation",
                        "1 action",
                        "120 feet",
                        "Instantaneous",
                        "Three darts of magical force that never miss, 1d4+1 each",
                        Some("1d4+1"),
                    ),
                    spell(
                        "shield",
                        "Shield",
                        1,
                        "Abjuration",
                        "1 reaction",
                        "Self",
                        "1 round",
                        "+5 AC until your next turn",
                        None,
                    ),
                ],
                proficient_skills: &[SkillName::Arcana, SkillName::Investigation],
            },
        }
    }

    /// Get a short description of the class.
    pub fn description(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "A fierce warrior who can enter a battle rage",
            CharacterClass::Bard => "An inspiring magician whose music weaves magic",
            CharacterClass::Cleric => "A priestly champion who wields divine magic",
            CharacterClass::Druid => "A priest of the Old Faith, wielding nature's power",
            CharacterClass::Fighter => "A master of martial combat, skilled with weapons and armor",
            CharacterClass::Monk => "A master of martial arts, harnessing body and soul",
            CharacterClass::Paladin => "A holy warrior bound to a sacred oath",
            CharacterClass::Ranger => "A warrior who combats threats on the edges of civilization",
            CharacterClass::Rogue => "A scoundrel who uses stealth and trickery",
            CharacterClass::Sorcerer => "A spellcaster who draws on inherent magic",
            CharacterClass::Warlock => {
                "A wielder of magic derived from a bargain with an extraplanar entity"
            }
            CharacterClass::Wizard => "A scholarly magic-user who masters arcane secrets",
        }
    }

    /// Whether the class starts with any spells.
    pub fn is_spellcaster(&self) -> bool {
        !self.data().starting_spells.is_empty()
    }

    /// Get all character classes.
    pub fn all() -> &'static [CharacterClass] {
        &[
            CharacterClass::Barbarian,
            CharacterClass::Bard,
            CharacterClass::Cleric,
            CharacterClass::Druid,
            CharacterClass::Fighter,
            CharacterClass::Monk,
            CharacterClass::Paladin,
            CharacterClass::Ranger,
            CharacterClass::Rogue,
            CharacterClass::Sorcerer,
            CharacterClass::Warlock,
            CharacterClass::Wizard,
        ]
    }
}
