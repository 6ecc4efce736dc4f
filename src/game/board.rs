//! Board model - grid of soldiers, placement and movement legality

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::combat::Item;

/// Board height
pub const ROWS: usize = 6;
/// Board width
pub const COLS: usize = 7;
/// Rows each side owns at the start of a match
pub const HOME_ROWS: usize = 2;

/// The 8 Chebyshev-adjacent offsets (row, col)
pub const DIRECTIONS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// One of the two competing positions in a match. Serialized as 0 / 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];

    pub fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    /// Rows this side fills on a fresh board
    pub fn home_rows(self) -> std::ops::Range<usize> {
        match self {
            Side::First => 0..HOME_ROWS,
            Side::Second => ROWS - HOME_ROWS..ROWS,
        }
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        side.index() as u8
    }
}

impl TryFrom<u8> for Side {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::First),
            1 => Ok(Side::Second),
            other => Err(format!("invalid side index {other}")),
        }
    }
}

/// Grid coordinates. Deserialized from untrusted input, so bounds are never assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self) -> bool {
        self.row < ROWS && self.col < COLS
    }

    /// Step by a signed offset, staying on the board
    pub fn offset(&self, d_row: isize, d_col: isize) -> Option<Position> {
        let row = self.row.checked_add_signed(d_row)?;
        let col = self.col.checked_add_signed(d_col)?;
        let pos = Position::new(row, col);
        pos.in_bounds().then_some(pos)
    }

    /// True for the 8 surrounding cells, false for the cell itself
    pub fn is_adjacent(&self, other: &Position) -> bool {
        let d_row = self.row.abs_diff(other.row);
        let d_col = self.col.abs_diff(other.col);
        d_row <= 1 && d_col <= 1 && (d_row, d_col) != (0, 0)
    }

    /// Iterate every cell, row-major
    pub fn all() -> impl Iterator<Item = Position> {
        (0..ROWS).flat_map(|row| (0..COLS).map(move |col| Position::new(row, col)))
    }
}

/// Stable soldier identity, assigned once per board initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoldierId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Soldier {
    pub id: SoldierId,
    pub owner: Side,
    pub item: Item,
    pub revealed: bool,
}

/// Board cell occupant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Soldier(Soldier),
    /// Ownerless marker for a combat waiting on a tie-break
    Contested,
}

impl Cell {
    pub fn soldier(&self) -> Option<&Soldier> {
        match self {
            Cell::Soldier(soldier) => Some(soldier),
            _ => None,
        }
    }
}

/// Fixed-size grid; a soldier's position is always the cell that holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: [[Cell::Empty; COLS]; ROWS],
        }
    }

    /// Clear the grid and fill both sides' home rows with fresh, unrevealed soldiers
    pub fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        *self = Self::empty();
        let mut next_id = 0;
        for side in Side::BOTH {
            for row in side.home_rows() {
                for col in 0..COLS {
                    self.cells[row][col] = Cell::Soldier(Soldier {
                        id: SoldierId(next_id),
                        owner: side,
                        item: Item::random(rng),
                        revealed: false,
                    });
                    next_id += 1;
                }
            }
        }
    }

    /// Redraw the item of every soldier `side` owns and hide it again.
    /// Positions and ids are untouched. Returns how many soldiers changed.
    pub fn reshuffle<R: Rng + ?Sized>(&mut self, side: Side, rng: &mut R) -> usize {
        let mut count = 0;
        for cell in self.cells.iter_mut().flatten() {
            if let Cell::Soldier(soldier) = cell {
                if soldier.owner == side {
                    soldier.item = Item::random(rng);
                    soldier.revealed = false;
                    count += 1;
                }
            }
        }
        count
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(pos.row)?.get(pos.col)
    }

    pub fn soldier_at(&self, pos: Position) -> Option<&Soldier> {
        self.cell(pos)?.soldier()
    }

    /// `to` must be on the board, adjacent to `from`, and either empty or held by the enemy
    /// of whoever stands on `from`. An empty `from` has no legal destination.
    pub fn is_legal_destination(&self, from: Position, to: Position) -> bool {
        let Some(mover) = self.soldier_at(from) else {
            return false;
        };
        if !to.in_bounds() || !from.is_adjacent(&to) {
            return false;
        }
        match self.cell(to) {
            Some(Cell::Empty) => true,
            Some(Cell::Soldier(target)) => target.owner != mover.owner,
            Some(Cell::Contested) | None => false,
        }
    }

    /// Every legal (from, to) pair for `side`
    pub fn legal_moves(&self, side: Side) -> Vec<(Position, Position)> {
        let mut moves = Vec::new();
        for from in Position::all() {
            if self.soldier_at(from).map(|s| s.owner) != Some(side) {
                continue;
            }
            for (d_row, d_col) in DIRECTIONS {
                if let Some(to) = from.offset(d_row, d_col) {
                    if self.is_legal_destination(from, to) {
                        moves.push((from, to));
                    }
                }
            }
        }
        moves
    }

    /// Soldier count per side, indexed by `Side::index`. Full scan.
    pub fn count_by_side(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for soldier in self.cells.iter().flatten().filter_map(Cell::soldier) {
            counts[soldier.owner.index()] += 1;
        }
        counts
    }

    /// Take whatever occupies `pos`, leaving it empty
    pub fn vacate(&mut self, pos: Position) -> Cell {
        match self.cell_mut(pos) {
            Some(cell) => std::mem::take(cell),
            None => Cell::Empty,
        }
    }

    /// Put a soldier on `pos`, replacing any occupant
    pub fn place(&mut self, pos: Position, soldier: Soldier) {
        if let Some(cell) = self.cell_mut(pos) {
            *cell = Cell::Soldier(soldier);
        }
    }

    /// Mark `pos` as an in-progress tie combat
    pub fn mark_contested(&mut self, pos: Position) {
        if let Some(cell) = self.cell_mut(pos) {
            *cell = Cell::Contested;
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell; COLS]> {
        self.cells.iter()
    }

    fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        self.cells.get_mut(pos.row)?.get_mut(pos.col)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn soldier(id: u32, owner: Side, item: Item) -> Soldier {
        Soldier {
            id: SoldierId(id),
            owner,
            item,
            revealed: false,
        }
    }

    fn fresh_board() -> Board {
        let mut board = Board::empty();
        board.initialize(&mut ChaCha8Rng::seed_from_u64(1));
        board
    }

    #[test]
    fn test_initialize_fills_home_rows() {
        let board = fresh_board();
        assert_eq!(board.count_by_side(), [HOME_ROWS * COLS, HOME_ROWS * COLS]);

        for pos in Position::all() {
            let cell = board.cell(pos).unwrap();
            match pos.row {
                0 | 1 => assert_eq!(cell.soldier().unwrap().owner, Side::First),
                4 | 5 => assert_eq!(cell.soldier().unwrap().owner, Side::Second),
                _ => assert_eq!(*cell, Cell::Empty),
            }
            if let Some(s) = cell.soldier() {
                assert!(!s.revealed);
            }
        }

        let mut ids: Vec<u32> = Position::all()
            .filter_map(|p| board.soldier_at(p))
            .map(|s| s.id.0)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 2 * HOME_ROWS * COLS);
    }

    #[test]
    fn test_reshuffle_keeps_ids_and_positions() {
        let mut board = fresh_board();
        let before = board.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        let changed = board.reshuffle(Side::First, &mut rng);
        assert_eq!(changed, HOME_ROWS * COLS);

        for pos in Position::all() {
            match (before.soldier_at(pos), board.soldier_at(pos)) {
                (Some(a), Some(b)) => {
                    assert_eq!(a.id, b.id);
                    assert_eq!(a.owner, b.owner);
                    assert!(!b.revealed);
                    if a.owner == Side::Second {
                        assert_eq!(a.item, b.item);
                    }
                }
                (None, None) => {}
                _ => panic!("occupancy changed at {pos:?}"),
            }
        }
    }

    #[test]
    fn test_legal_destination_geometry() {
        let mut board = Board::empty();
        let from = Position::new(2, 3);
        board.place(from, soldier(0, Side::First, Item::Rock));

        let legal: Vec<Position> = DIRECTIONS
            .iter()
            .filter_map(|&(r, c)| from.offset(r, c))
            .collect();
        assert_eq!(legal.len(), 8);
        for to in legal {
            assert!(board.is_legal_destination(from, to));
        }

        assert!(!board.is_legal_destination(from, from));
        assert!(!board.is_legal_destination(from, Position::new(4, 3)));
        assert!(!board.is_legal_destination(from, Position::new(2, 5)));
        assert!(!board.is_legal_destination(from, Position::new(2, COLS)));
    }

    #[test]
    fn test_legal_destination_occupancy() {
        let mut board = Board::empty();
        let from = Position::new(0, 0);
        board.place(from, soldier(0, Side::First, Item::Rock));
        board.place(Position::new(0, 1), soldier(1, Side::First, Item::Paper));
        board.place(Position::new(1, 0), soldier(2, Side::Second, Item::Paper));
        board.mark_contested(Position::new(1, 1));

        assert!(!board.is_legal_destination(from, Position::new(0, 1)));
        assert!(board.is_legal_destination(from, Position::new(1, 0)));
        assert!(!board.is_legal_destination(from, Position::new(1, 1)));
        // Corner: nothing beyond the edge
        assert_eq!(from.offset(-1, 0), None);
        assert_eq!(from.offset(0, -1), None);
        // Empty origin
        assert!(!board.is_legal_destination(Position::new(3, 3), Position::new(3, 4)));
    }

    #[test]
    fn test_legal_moves_fresh_board() {
        let board = fresh_board();
        // Only the inner home row can move, into the empty middle rows.
        let moves = board.legal_moves(Side::First);
        assert!(moves.iter().all(|(from, to)| from.row == 1 && to.row == 2));
        // 7 columns, 3 forward moves each minus the two edge columns
        assert_eq!(moves.len(), COLS * 3 - 2);
        assert_eq!(board.legal_moves(Side::Second).len(), COLS * 3 - 2);
    }

    #[test]
    fn test_vacate_and_place() {
        let mut board = fresh_board();
        let from = Position::new(1, 2);
        let to = Position::new(2, 2);
        let taken = board.vacate(from);
        let moved = *taken.soldier().unwrap();
        board.place(to, moved);

        assert_eq!(board.cell(from), Some(&Cell::Empty));
        assert_eq!(board.soldier_at(to), Some(&moved));
        assert_eq!(board.count_by_side(), [HOME_ROWS * COLS, HOME_ROWS * COLS]);
        assert_eq!(board.vacate(Position::new(ROWS, 0)), Cell::Empty);
    }

    #[test]
    fn test_side_wire_format() {
        assert_eq!(serde_json::to_string(&Side::Second).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Side>("0").unwrap(), Side::First);
        assert!(serde_json::from_str::<Side>("2").is_err());
    }
}
