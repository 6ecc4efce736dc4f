//! Snapshot building and per-viewer redaction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::board::{Cell, Position, Side, SoldierId};
use super::combat::Item;
use super::ids::MatchId;
use super::r#match::{Match, MatchResult, Phase};

/// Serializable view of a match, enough for a client to render everything.
///
/// `capture` produces the complete state; only `redacted_for` output is sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    /// Row-major cells
    pub board: Vec<Vec<CellView>>,
    pub sides: [SideView; 2],
    pub turn: Side,
    pub phase: Phase,
    pub result: Option<MatchResult>,
    /// Present only during a tie-break, indexed by side
    pub tie: Option<[TieView; 2]>,
    pub is_bot_match: bool,
    pub created_at: DateTime<Utc>,
    /// Side this snapshot was redacted for (`None`: complete or public)
    pub viewer: Option<Side>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellView {
    Empty,
    Soldier {
        id: SoldierId,
        owner: Side,
        /// Hidden (`null`) for an enemy soldier not yet revealed
        item: Option<Item>,
        revealed: bool,
    },
    /// Combat in progress, waiting on a tie-break
    Contested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideView {
    pub username: String,
    pub reshuffles_remaining: u8,
    pub ready: bool,
    pub is_bot: bool,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieView {
    pub position: Position,
    pub soldier: SoldierId,
    pub item: Option<Item>,
    pub chosen: bool,
}

impl MatchSnapshot {
    /// Complete, unredacted state of `game`
    pub fn capture(game: &Match) -> Self {
        let board = game
            .board()
            .rows()
            .map(|row| row.iter().map(CellView::from).collect())
            .collect();

        let sides = Side::BOTH.map(|side| {
            let state = game.side(side);
            SideView {
                username: state.participant.username.clone(),
                reshuffles_remaining: state.reshuffles_remaining,
                ready: state.ready,
                is_bot: state.participant.is_bot(),
                connected: !state.departed,
            }
        });

        let tie = game.tie_records().map(|records| {
            (*records).map(|record| TieView {
                position: record.position,
                soldier: record.soldier,
                item: record.item,
                chosen: record.item.is_some(),
            })
        });

        Self {
            match_id: game.id(),
            board,
            sides,
            turn: game.turn(),
            phase: game.phase(),
            result: game.result(),
            tie,
            is_bot_match: game.is_bot_match(),
            created_at: game.created_at(),
            viewer: None,
        }
    }

    /// Copy with everything `viewer` may not see removed: items of unrevealed enemy
    /// soldiers and the opponent's pending tie-break pick. `None` hides both for every side.
    pub fn redacted_for(&self, viewer: Option<Side>) -> Self {
        let mut view = self.clone();
        view.viewer = viewer;

        for cell in view.board.iter_mut().flatten() {
            if let CellView::Soldier {
                owner,
                item,
                revealed,
                ..
            } = cell
            {
                if !*revealed && Some(*owner) != viewer {
                    *item = None;
                }
            }
        }

        if let Some(tie) = view.tie.as_mut() {
            for (side, record) in Side::BOTH.into_iter().zip(tie.iter_mut()) {
                if Some(side) != viewer {
                    record.item = None;
                }
            }
        }

        view
    }
}

impl From<&Cell> for CellView {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Empty => CellView::Empty,
            Cell::Soldier(soldier) => CellView::Soldier {
                id: soldier.id,
                owner: soldier.owner,
                item: Some(soldier.item),
                revealed: soldier.revealed,
            },
            Cell::Contested => CellView::Contested,
        }
    }
}
