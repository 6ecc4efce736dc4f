//! Combat resolution - rock, paper, scissors

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The hidden item a soldier carries into combat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    Rock,
    Paper,
    Scissors,
}

impl Item {
    pub const ALL: [Item; 3] = [Item::Rock, Item::Paper, Item::Scissors];

    /// Draw an item uniformly at random
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Check if this item beats the other
    pub fn beats(self, other: Item) -> bool {
        matches!(
            (self, other),
            (Item::Rock, Item::Scissors) | (Item::Scissors, Item::Paper) | (Item::Paper, Item::Rock)
        )
    }
}

/// Result of comparing two items, from the point of view of the first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Tie,
    FirstWins,
    SecondWins,
}

/// Compare two items. Anything that is neither a tie nor a win for `a` is a win for `b`.
pub fn compare(a: Item, b: Item) -> Outcome {
    if a == b {
        Outcome::Tie
    } else if a.beats(b) {
        Outcome::FirstWins
    } else {
        Outcome::SecondWins
    }
}
