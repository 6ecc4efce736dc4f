//! Bot policy - picks moves and tie-break items for a non-human side

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::board::{Board, Position, Side};
use super::combat::Item;

/// Strategy for a bot-controlled side.
///
/// A policy only sees what a human in the same seat could see: board geometry and
/// ownership. It never reads enemy items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotPolicy {
    /// Uniformly random legal move, uniformly random tie-break item
    #[default]
    Uniform,
}

impl BotPolicy {
    /// Pick a move for `side`, or `None` when it has no legal move
    pub fn choose_move<R: Rng + ?Sized>(
        &self,
        board: &Board,
        side: Side,
        rng: &mut R,
    ) -> Option<(Position, Position)> {
        match self {
            BotPolicy::Uniform => {
                let moves = board.legal_moves(side);
                if moves.is_empty() {
                    return None;
                }
                Some(moves[rng.gen_range(0..moves.len())])
            }
        }
    }

    pub fn choose_tie_item<R: Rng + ?Sized>(&self, rng: &mut R) -> Item {
        match self {
            BotPolicy::Uniform => Item::random(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Soldier, SoldierId};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_bot_moves_are_legal() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut board = Board::empty();
        board.initialize(&mut rng);

        for _ in 0..50 {
            let (from, to) = BotPolicy::Uniform
                .choose_move(&board, Side::Second, &mut rng)
                .unwrap();
            assert_eq!(board.soldier_at(from).unwrap().owner, Side::Second);
            assert!(board.is_legal_destination(from, to));
        }
    }

    #[test]
    fn test_bot_passes_without_moves() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut board = Board::empty();
        assert_eq!(BotPolicy::Uniform.choose_move(&board, Side::Second, &mut rng), None);

        // A lone soldier boxed into a corner by contested cells cannot move either.
        board.place(
            Position::new(5, 6),
            Soldier {
                id: SoldierId(0),
                owner: Side::Second,
                item: Item::Rock,
                revealed: false,
            },
        );
        board.mark_contested(Position::new(4, 6));
        board.mark_contested(Position::new(4, 5));
        board.mark_contested(Position::new(5, 5));
        assert_eq!(BotPolicy::Uniform.choose_move(&board, Side::Second, &mut rng), None);
    }

    #[test]
    fn test_bot_ignores_enemy_items() {
        // Same geometry, different hidden enemy items: the same seed must yield the same move.
        let mut board_a = Board::empty();
        board_a.initialize(&mut ChaCha8Rng::seed_from_u64(10));
        let mut board_b = board_a.clone();
        board_b.reshuffle(Side::First, &mut ChaCha8Rng::seed_from_u64(11));

        let bot = BotPolicy::Uniform;
        let a = bot.choose_move(&board_a, Side::Second, &mut ChaCha8Rng::seed_from_u64(5));
        let b = bot.choose_move(&board_b, Side::Second, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(a, b);
    }
}
