//! Match state machine - setup, movement, combat, tie-breaks, win detection and replay

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::board::{Board, Cell, Position, Side, Soldier, SoldierId};
use super::bot::BotPolicy;
use super::combat::{compare, Item, Outcome};
use super::ids::{ConnectionId, MatchId};
use super::snapshot::MatchSnapshot;

/// Reshuffles each side gets per match (reset on replay)
pub const STARTING_RESHUFFLES: u8 = 3;

/// Display name of the bot side
pub const BOT_USERNAME: &str = "Bot";

/// Who drives a side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Human(ConnectionId),
    Bot(BotPolicy),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub username: String,
    pub controller: Controller,
}

impl Participant {
    pub fn human(connection: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            controller: Controller::Human(connection),
        }
    }

    pub fn bot(policy: BotPolicy) -> Self {
        Self {
            username: BOT_USERNAME.to_string(),
            controller: Controller::Bot(policy),
        }
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        match self.controller {
            Controller::Human(connection) => Some(connection),
            Controller::Bot(_) => None,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.controller, Controller::Bot(_))
    }
}

/// Per-side match state
#[derive(Debug, Clone)]
pub struct SideState {
    pub participant: Participant,
    pub reshuffles_remaining: u8,
    pub ready: bool,
    /// The participant disconnected or exited; it no longer receives events
    pub departed: bool,
}

impl SideState {
    fn new(participant: Participant) -> Self {
        let ready = participant.is_bot();
        Self {
            participant,
            reshuffles_remaining: STARTING_RESHUFFLES,
            ready,
            departed: false,
        }
    }

    fn reset(&mut self) {
        self.reshuffles_remaining = STARTING_RESHUFFLES;
        self.ready = self.participant.is_bot();
    }
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Both sides reshuffling and readying up
    Setup,
    /// Turn-based movement
    Playing,
    /// A combat tied; both sides must pick a new item
    TieBreak,
    /// Match over, replay possible
    Finished,
}

/// How a finished match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchResult {
    Won { side: Side, by_forfeit: bool },
    /// A participant left and nobody is left to award the win to
    Abandoned,
    /// The side to move still had soldiers but no legal move
    Stalemate,
}

/// One side's soldier caught in a tied combat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieRecord {
    pub position: Position,
    pub soldier: SoldierId,
    pub item: Option<Item>,
}

/// Commands a side can issue against its match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reshuffle,
    Ready,
    Move { from: Position, to: Position },
    TieChoice { item: Item },
    Replay,
}

/// What a successful command produced, in order
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    StateChanged(Box<MatchSnapshot>),
    /// Both tie-break picks were `item` again; picks were cleared
    TieRoundRepeated {
        item: Item,
        snapshot: Box<MatchSnapshot>,
    },
}

/// The match aggregate
pub struct Match {
    id: MatchId,
    board: Board,
    sides: [SideState; 2],
    turn: Side,
    phase: Phase,
    tie: Option<[TieRecord; 2]>,
    result: Option<MatchResult>,
    rng: ChaCha8Rng,
    created_at: DateTime<Utc>,
}

impl Match {
    /// Create a match in `Setup` with a freshly randomized board
    pub fn new(id: MatchId, participants: [Participant; 2]) -> Self {
        Self::with_seed(id, participants, rand::random::<u64>())
    }

    pub fn with_seed(id: MatchId, participants: [Participant; 2], seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut board = Board::empty();
        board.initialize(&mut rng);

        let [first, second] = participants;
        Self {
            id,
            board,
            sides: [SideState::new(first), SideState::new(second)],
            turn: Side::First,
            phase: Phase::Setup,
            tie: None,
            result: None,
            rng,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side(&self, side: Side) -> &SideState {
        &self.sides[side.index()]
    }

    pub fn turn(&self) -> Side {
        self.turn
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tie_records(&self) -> Option<&[TieRecord; 2]> {
        self.tie.as_ref()
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_bot_match(&self) -> bool {
        self.sides.iter().any(|s| s.participant.is_bot())
    }

    /// The side a connection plays, if it is still part of this match
    pub fn side_of(&self, connection: ConnectionId) -> Option<Side> {
        Side::BOTH.into_iter().find(|&side| {
            let state = self.side(side);
            !state.departed && state.participant.connection() == Some(connection)
        })
    }

    /// Human participants still attached to the match
    pub fn connected_humans(&self) -> Vec<(Side, ConnectionId)> {
        Side::BOTH
            .into_iter()
            .filter(|&side| !self.side(side).departed)
            .filter_map(|side| Some((side, self.side(side).participant.connection()?)))
            .collect()
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot::capture(self)
    }

    /// Validate and apply a command, then let a bot side respond.
    /// An empty result means the command was rejected and nothing changed.
    pub fn apply(&mut self, side: Side, command: Command) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        let applied = match command {
            Command::Reshuffle => self.reshuffle(side),
            Command::Ready => self.ready(side),
            Command::Move { from, to } => self.make_move(side, from, to),
            Command::TieChoice { item } => self.choose_tie_item(side, item, &mut events),
            Command::Replay => self.replay(),
        };

        if !applied {
            debug!(
                match_id = %self.id,
                side = side.index(),
                ?command,
                phase = ?self.phase,
                "Rejected command"
            );
            return events;
        }

        // Tie choices push their own events
        if !matches!(command, Command::TieChoice { .. }) {
            self.push_state(&mut events);
        }

        self.drive_bot(&mut events);
        events
    }

    /// `side`'s participant disconnected: the other side wins by forfeit.
    /// A bot opponent cannot collect a win, so a bot match is abandoned instead.
    pub fn forfeit(&mut self, side: Side) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        self.sides[side.index()].departed = true;

        if self.phase == Phase::Finished {
            return events;
        }

        let opponent = side.opponent();
        self.result = Some(if self.side(opponent).participant.is_bot() {
            MatchResult::Abandoned
        } else {
            MatchResult::Won {
                side: opponent,
                by_forfeit: true,
            }
        });
        self.finish();
        info!(match_id = %self.id, side = side.index(), result = ?self.result, "Match forfeited");

        self.push_state(&mut events);
        events
    }

    /// `side` exits the match for good. Returns the terminal snapshot for whoever remains.
    pub fn abandon(&mut self, side: Side) -> MatchSnapshot {
        self.sides[side.index()].departed = true;
        self.result = Some(MatchResult::Abandoned);
        self.finish();
        info!(match_id = %self.id, side = side.index(), "Match abandoned");
        self.snapshot()
    }

    fn reshuffle(&mut self, side: Side) -> bool {
        if self.phase != Phase::Setup || self.side(side).reshuffles_remaining == 0 {
            return false;
        }
        self.sides[side.index()].reshuffles_remaining -= 1;
        self.board.reshuffle(side, &mut self.rng);
        true
    }

    fn ready(&mut self, side: Side) -> bool {
        if self.phase != Phase::Setup || self.side(side).ready {
            return false;
        }
        self.sides[side.index()].ready = true;

        if self.sides.iter().all(|s| s.ready) {
            self.phase = Phase::Playing;
            self.turn = Side::First;
            info!(match_id = %self.id, "Match started");
        }
        true
    }

    fn make_move(&mut self, side: Side, from: Position, to: Position) -> bool {
        if self.phase != Phase::Playing || self.turn != side {
            return false;
        }
        if self.board.soldier_at(from).map(|s| s.owner) != Some(side) {
            return false;
        }
        if !self.board.is_legal_destination(from, to) {
            return false;
        }

        // Validation is complete; from here on the move always applies.
        let Cell::Soldier(mut attacker) = self.board.vacate(from) else {
            return false;
        };

        let Some(mut defender) = self.board.soldier_at(to).copied() else {
            self.board.place(to, attacker);
            self.end_turn();
            return true;
        };

        attacker.revealed = true;
        defender.revealed = true;

        match compare(attacker.item, defender.item) {
            Outcome::Tie => self.open_tie_break(to, attacker, defender),
            Outcome::FirstWins => {
                self.board.place(to, attacker);
                self.end_turn();
            }
            Outcome::SecondWins => {
                self.board.place(to, defender);
                self.end_turn();
            }
        }
        true
    }

    fn open_tie_break(&mut self, at: Position, attacker: Soldier, defender: Soldier) {
        self.board.mark_contested(at);

        let record = |soldier: Soldier| TieRecord {
            position: at,
            soldier: soldier.id,
            item: None,
        };
        let mut records = [record(attacker), record(defender)];
        if attacker.owner == Side::Second {
            records.swap(0, 1);
        }

        self.tie = Some(records);
        self.phase = Phase::TieBreak;
        debug!(match_id = %self.id, row = at.row, col = at.col, "Tie-break opened");
    }

    fn choose_tie_item(&mut self, side: Side, item: Item, events: &mut Vec<MatchEvent>) -> bool {
        if self.phase != Phase::TieBreak {
            return false;
        }
        let Some(records) = self.tie.as_mut() else {
            return false;
        };
        let record = &mut records[side.index()];
        if record.item.is_some() {
            return false;
        }
        record.item = Some(item);

        let (Some(first), Some(second)) = (records[0].item, records[1].item) else {
            self.push_state(events);
            return true;
        };

        match compare(first, second) {
            Outcome::Tie => {
                for record in records.iter_mut() {
                    record.item = None;
                }
                debug!(match_id = %self.id, ?item, "Tie-break tied again");
                events.push(MatchEvent::TieRoundRepeated {
                    item: first,
                    snapshot: Box::new(self.snapshot()),
                });
            }
            outcome => {
                let winner = if outcome == Outcome::FirstWins {
                    Side::First
                } else {
                    Side::Second
                };
                let record = records[winner.index()];
                self.board.place(
                    record.position,
                    Soldier {
                        id: record.soldier,
                        owner: winner,
                        item: record.item.unwrap_or(item),
                        revealed: true,
                    },
                );
                self.tie = None;
                self.phase = Phase::Playing;
                self.end_turn();
                self.push_state(events);
            }
        }
        true
    }

    fn replay(&mut self) -> bool {
        if self.phase != Phase::Finished || self.sides.iter().any(|s| s.departed) {
            return false;
        }

        self.board.initialize(&mut self.rng);
        for side in self.sides.iter_mut() {
            side.reset();
        }
        self.tie = None;
        self.result = None;
        self.turn = Side::First;
        self.phase = Phase::Setup;
        info!(match_id = %self.id, "Match reset for replay");
        true
    }

    /// After a decisive move: finish if a side is wiped out or the next mover is stuck,
    /// otherwise pass the turn.
    fn end_turn(&mut self) {
        let counts = self.board.count_by_side();
        if let Some(loser) = Side::BOTH.into_iter().find(|s| counts[s.index()] == 0) {
            self.result = Some(MatchResult::Won {
                side: loser.opponent(),
                by_forfeit: false,
            });
            self.finish();
            info!(match_id = %self.id, winner = loser.opponent().index(), "Match finished");
            return;
        }

        self.turn = self.turn.opponent();

        if self.board.legal_moves(self.turn).is_empty() {
            self.result = Some(MatchResult::Stalemate);
            self.finish();
            info!(match_id = %self.id, stuck = self.turn.index(), "Match finished in stalemate");
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.tie = None;
    }

    /// Let the bot side act until it is waiting on the human
    fn drive_bot(&mut self, events: &mut Vec<MatchEvent>) {
        let Some((bot_side, policy)) = self.bot_side() else {
            return;
        };

        loop {
            match self.phase {
                Phase::Playing if self.turn == bot_side => {
                    let Some((from, to)) = policy.choose_move(&self.board, bot_side, &mut self.rng)
                    else {
                        debug!(match_id = %self.id, "Bot has no legal move");
                        break;
                    };
                    if !self.make_move(bot_side, from, to) {
                        break;
                    }
                    self.push_state(events);
                }
                Phase::TieBreak if self.pending_tie_choice(bot_side) => {
                    let item = policy.choose_tie_item(&mut self.rng);
                    if !self.choose_tie_item(bot_side, item, events) {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn bot_side(&self) -> Option<(Side, BotPolicy)> {
        Side::BOTH
            .into_iter()
            .find_map(|side| match self.side(side).participant.controller {
                Controller::Bot(policy) => Some((side, policy)),
                Controller::Human(_) => None,
            })
    }

    fn pending_tie_choice(&self, side: Side) -> bool {
        self.tie
            .as_ref()
            .is_some_and(|records| records[side.index()].item.is_none())
    }

    fn push_state(&self, events: &mut Vec<MatchEvent>) {
        events.push(MatchEvent::StateChanged(Box::new(self.snapshot())));
    }

    #[cfg(test)]
    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }
}
