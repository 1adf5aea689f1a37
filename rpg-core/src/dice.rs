//! Dice resolution.
//!
//! Every roll takes an explicit RNG handle so a session seeded once can be
//! replayed exactly. Rolls never advantage-stack; a single d20 is the only
//! pool that can crit.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice requests and notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid roll request: cannot roll {count} dice")]
    InvalidRollRequest { count: u32 },
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
}

/// Standard polyhedral die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    pub fn all() -> [DieType; 7] {
        [
            DieType::D4,
            DieType::D6,
            DieType::D8,
            DieType::D10,
            DieType::D12,
            DieType::D20,
            DieType::D100,
        ]
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

impl FromStr for DieType {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        lower
            .strip_prefix('d')
            .and_then(|sides| sides.parse().ok())
            .and_then(DieType::from_sides)
            .ok_or_else(|| DiceError::InvalidNotation(s.to_string()))
    }
}

/// Outcome of a single `roll` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRollResult {
    pub die_type: DieType,
    pub count: u32,
    /// Face values in the order they were rolled.
    pub results: Vec<u32>,
    pub sum: u32,
    pub modifier: i32,
    pub final_total: i32,
    pub critical_hit: bool,
    pub critical_fail: bool,
}

impl DiceRollResult {
    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.final_total >= dc
    }

    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let faces = self
            .results
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self.modifier {
            0 => format!("[{faces}]"),
            m if m > 0 => format!("[{faces}] + {m}"),
            m => format!("[{faces}] - {}", m.abs()),
        }
    }
}

impl fmt::Display for DiceRollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} = {}",
            self.count,
            self.die_type,
            self.dice_display(),
            self.final_total
        )
    }
}

/// Roll `count` dice of `die_type` and add `modifier`.
pub fn roll<R: Rng + ?Sized>(
    rng: &mut R,
    die_type: DieType,
    count: u32,
    modifier: i32,
) -> Result<DiceRollResult, DiceError> {
    if count == 0 {
        return Err(DiceError::InvalidRollRequest { count });
    }

    let results: Vec<u32> = (0..count)
        .map(|_| rng.gen_range(1..=die_type.sides()))
        .collect();
    let sum: u32 = results.iter().sum();

    // Only a lone d20 can crit; d20 pools are plain sums.
    let natural = if die_type == DieType::D20 && count == 1 {
        results.first().copied()
    } else {
        None
    };

    let result = DiceRollResult {
        die_type,
        count,
        sum,
        modifier,
        final_total: sum as i32 + modifier,
        critical_hit: natural == Some(20),
        critical_fail: natural == Some(1),
        results,
    };
    tracing::debug!(roll = %result, "dice rolled");
    Ok(result)
}

/// A single-component damage expression such as `2d6+3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageExpression {
    pub count: u32,
    pub die_type: DieType,
    pub modifier: i32,
}

impl DamageExpression {
    /// Parse `XdY`, `dY`, `XdY+Z` or `XdY-Z`.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let invalid = || DiceError::InvalidNotation(notation.to_string());
        let compact: String = notation
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        let d_pos = compact.find('d').ok_or_else(invalid)?;
        let count_str = &compact[..d_pos];
        let rest = &compact[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };
        if count == 0 {
            return Err(invalid());
        }

        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(pos) => {
                let value: i32 = rest[pos + 1..].parse().map_err(|_| invalid())?;
                let signed = if rest.as_bytes()[pos] == b'-' {
                    -value
                } else {
                    value
                };
                (&rest[..pos], signed)
            }
            None => (rest, 0),
        };

        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
        let die_type = DieType::from_sides(sides).ok_or_else(invalid)?;

        Ok(Self {
            count,
            die_type,
            modifier,
        })
    }

    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<DiceRollResult, DiceError> {
        roll(rng, self.die_type, self.count, self.modifier)
    }

    /// Smallest and largest totals this expression can produce.
    pub fn range(&self) -> (i32, i32) {
        let count = self.count as i32;
        (
            count + self.modifier,
            count * self.die_type.sides() as i32 + self.modifier,
        )
    }
}

impl FromStr for DamageExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DamageExpression::parse(s)
    }
}

impl fmt::Display for DamageExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.die_type)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_roll_shape_for_every_die() {
        let mut rng = StdRng::seed_from_u64(7);
        for die in DieType::all() {
            for count in 1..=6 {
                let result = roll(&mut rng, die, count, 0).unwrap();
                assert_eq!(result.results.len(), count as usize);
                assert!(result.results.iter().all(|r| (1..=die.sides()).contains(r)));
                assert_eq!(result.sum, result.results.iter().sum::<u32>());
                assert_eq!(result.final_total, result.sum as i32);
            }
        }
    }

    #[test]
    fn test_modifier_applied_to_final_total() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = roll(&mut rng, DieType::D6, 3, -2).unwrap();
        assert_eq!(result.final_total, result.sum as i32 - 2);
        assert_eq!(result.modifier, -2);
    }

    #[test]
    fn test_zero_count_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            roll(&mut rng, DieType::D20, 0, 0),
            Err(DiceError::InvalidRollRequest { count: 0 })
        );
    }

    #[test]
    fn test_single_d20_crit_flags() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut saw_hit = false;
        let mut saw_fail = false;
        for _ in 0..2000 {
            let result = roll(&mut rng, DieType::D20, 1, 0).unwrap();
            let face = result.results[0];
            assert_eq!(result.critical_hit, face == 20);
            assert_eq!(result.critical_fail, face == 1);
            assert!(!(result.critical_hit && result.critical_fail));
            saw_hit |= result.critical_hit;
            saw_fail |= result.critical_fail;
        }
        assert!(saw_hit && saw_fail);
    }

    #[test]
    fn test_pools_and_other_dice_never_crit() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let pool = roll(&mut rng, DieType::D20, 2, 0).unwrap();
            assert!(!pool.critical_hit && !pool.critical_fail);
            let d100 = roll(&mut rng, DieType::D100, 1, 0).unwrap();
            assert!(!d100.critical_hit && !d100.critical_fail);
        }
    }

    #[test]
    fn test_same_seed_same_rolls() {
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            assert_eq!(
                roll(&mut a, DieType::D8, 4, 1).unwrap(),
                roll(&mut b, DieType::D8, 4, 1).unwrap()
            );
        }
    }

    #[test]
    fn test_die_type_from_str() {
        assert_eq!("d20".parse::<DieType>().unwrap(), DieType::D20);
        assert_eq!("D100".parse::<DieType>().unwrap(), DieType::D100);
        assert!("d7".parse::<DieType>().is_err());
        assert!("20".parse::<DieType>().is_err());
    }

    #[test]
    fn test_parse_damage_expression() {
        let expr = DamageExpression::parse("2d6+3").unwrap();
        assert_eq!(expr.count, 2);
        assert_eq!(expr.die_type, DieType::D6);
        assert_eq!(expr.modifier, 3);

        let expr = DamageExpression::parse(" d8 - 1 ").unwrap();
        assert_eq!(expr.count, 1);
        assert_eq!(expr.modifier, -1);
        assert_eq!(expr.to_string(), "1d8-1");

        assert!(DamageExpression::parse("3d7").is_err());
        assert!(DamageExpression::parse("0d6").is_err());
        assert!(DamageExpression::parse("fireball").is_err());
    }

    #[test]
    fn test_damage_expression_rolls_within_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let expr = DamageExpression::parse("2d8").unwrap();
        let (low, high) = expr.range();
        for _ in 0..200 {
            let total = expr.roll(&mut rng).unwrap().final_total;
            assert!(total >= low && total <= high);
        }
    }
}
