//! Registry of all live matches

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::ids::{ConnectionId, MatchId};
use super::r#match::{Match, Participant};

/// A match behind its own lock. Fetch, validate, mutate and broadcast all happen
/// under one guard, and nothing awaits while it is held.
pub type SharedMatch = Arc<Mutex<Match>>;

/// Owns every live match and indexes them by human participant
pub struct MatchRegistry {
    matches: DashMap<MatchId, SharedMatch>,
    participants: DashMap<ConnectionId, MatchId>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            participants: DashMap::new(),
        }
    }

    /// Create a match in setup with a fresh board
    pub fn create(&self, participants: [Participant; 2]) -> SharedMatch {
        self.insert(Match::new(MatchId::new(), participants))
    }

    pub fn insert(&self, game: Match) -> SharedMatch {
        let id = game.id();
        for (_, connection) in game.connected_humans() {
            self.participants.insert(connection, id);
        }
        info!(match_id = %id, bot = game.is_bot_match(), "Match registered");

        let shared = Arc::new(Mutex::new(game));
        self.matches.insert(id, shared.clone());
        shared
    }

    pub fn get(&self, id: &MatchId) -> Option<SharedMatch> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn remove(&self, id: &MatchId) -> Option<SharedMatch> {
        let removed = self.matches.remove(id).map(|(_, m)| m);
        if removed.is_some() {
            self.participants.retain(|_, match_id| match_id != id);
            info!(match_id = %id, "Match removed from registry");
        }
        removed
    }

    pub fn find_by_participant(&self, connection: ConnectionId) -> Option<(MatchId, SharedMatch)> {
        let id = *self.participants.get(&connection)?;
        self.get(&id).map(|m| (id, m))
    }

    /// Forget a participant that left its match
    pub fn release(&self, connection: ConnectionId) {
        self.participants.remove(&connection);
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bot::BotPolicy;
    use crate::game::r#match::Phase;

    #[test]
    fn test_create_and_lookup() {
        let registry = MatchRegistry::new();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();

        let shared = registry.create([
            Participant::human(alice, "alice"),
            Participant::human(bob, "bob"),
        ]);
        let id = shared.lock().id();
        assert_eq!(shared.lock().phase(), Phase::Setup);

        assert_eq!(registry.active_matches(), 1);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.find_by_participant(alice).map(|(m, _)| m), Some(id));
        assert_eq!(registry.find_by_participant(bob).map(|(m, _)| m), Some(id));
        assert!(registry.find_by_participant(ConnectionId::new()).is_none());
    }

    #[test]
    fn test_bot_is_not_indexed() {
        let registry = MatchRegistry::new();
        let alice = ConnectionId::new();
        registry.create([Participant::human(alice, "alice"), Participant::bot(BotPolicy::Uniform)]);
        assert!(registry.find_by_participant(alice).is_some());
        assert_eq!(registry.participants.len(), 1);
    }

    #[test]
    fn test_remove_clears_participants() {
        let registry = MatchRegistry::new();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let id = registry
            .create([Participant::human(alice, "alice"), Participant::human(bob, "bob")])
            .lock()
            .id();

        registry.release(alice);
        assert!(registry.find_by_participant(alice).is_none());
        assert!(registry.find_by_participant(bob).is_some());

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.get(&id).is_none());
        assert!(registry.find_by_participant(bob).is_none());
        assert_eq!(registry.active_matches(), 0);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = MatchRegistry::new();
        let b = MatchRegistry::new();
        let id = a
            .create([
                Participant::human(ConnectionId::new(), "alice"),
                Participant::bot(BotPolicy::Uniform),
            ])
            .lock()
            .id();
        assert!(a.get(&id).is_some());
        assert!(b.get(&id).is_none());
    }
}
