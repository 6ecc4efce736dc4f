//! Lobby service - presence directory, challenges and bot-match requests

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::game::{BotPolicy, ConnectionId, Participant};
use crate::ws::hub::SessionHub;
use crate::ws::protocol::{LobbyEntry, ServerMsg};

/// Longest accepted username, in characters
pub const MAX_USERNAME_CHARS: usize = 24;

/// A connection that has joined the lobby
#[derive(Debug, Clone)]
pub struct LobbyUser {
    pub username: String,
    pub in_match: bool,
    pub joined_at: DateTime<Utc>,
    /// Connections whose challenge to this user is still open
    pub challenged_by: HashSet<ConnectionId>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LobbyError {
    #[error("Username must be 1 to {MAX_USERNAME_CHARS} characters")]
    InvalidUsername,
}

impl LobbyError {
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::InvalidUsername => "invalid_username",
        }
    }
}

/// Lobby directory. Pairing two users for a match checks and flips both of their
/// in-match flags under one lock.
pub struct LobbyService {
    users: Mutex<HashMap<ConnectionId, LobbyUser>>,
    hub: Arc<SessionHub>,
}

impl LobbyService {
    pub fn new(hub: Arc<SessionHub>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            hub,
        }
    }

    /// Join the lobby, or change name if already in it
    pub fn join(&self, connection: ConnectionId, username: &str) -> Result<(), LobbyError> {
        let username = username.trim();
        let chars = username.chars().count();
        if chars == 0 || chars > MAX_USERNAME_CHARS {
            return Err(LobbyError::InvalidUsername);
        }

        {
            let mut users = self.users.lock();
            match users.get_mut(&connection) {
                Some(user) => user.username = username.to_string(),
                None => {
                    users.insert(
                        connection,
                        LobbyUser {
                            username: username.to_string(),
                            in_match: false,
                            joined_at: Utc::now(),
                            challenged_by: HashSet::new(),
                        },
                    );
                }
            }
        }

        info!(connection_id = %connection, username, "User joined lobby");
        self.broadcast();
        Ok(())
    }

    /// Drop a connection from the directory, with any challenges it sent
    pub fn leave(&self, connection: ConnectionId) -> Option<LobbyUser> {
        let removed = {
            let mut users = self.users.lock();
            let removed = users.remove(&connection);
            for user in users.values_mut() {
                user.challenged_by.remove(&connection);
            }
            removed
        };

        if removed.is_some() {
            info!(connection_id = %connection, "User left lobby");
            self.broadcast();
        }
        removed
    }

    /// Send a challenge if both users are in the lobby and free
    pub fn challenge(&self, from: ConnectionId, opponent: ConnectionId) {
        let from_username = {
            let mut users = self.users.lock();
            let Some(challenger) = users.get(&from).filter(|u| !u.in_match) else {
                return;
            };
            let from_username = challenger.username.clone();
            let Some(target) = users.get_mut(&opponent).filter(|u| !u.in_match) else {
                return;
            };
            if from == opponent {
                return;
            }
            target.challenged_by.insert(from);
            from_username
        };

        debug!(from = %from, opponent = %opponent, "Challenge sent");
        self.hub.send(
            opponent,
            ServerMsg::ChallengeRequest {
                from,
                from_username,
            },
        );
    }

    /// Accept an open challenge. On success both users are marked in-match and the
    /// participants are returned with the challenger as the first side.
    pub fn accept(
        &self,
        responder: ConnectionId,
        challenger: ConnectionId,
    ) -> Option<[Participant; 2]> {
        let mut users = self.users.lock();

        let responder_user = users.get(&responder)?;
        if !responder_user.challenged_by.contains(&challenger) {
            return None;
        }
        let challenger_user = users.get(&challenger)?;
        if responder_user.in_match || challenger_user.in_match {
            return None;
        }

        let participants = [
            Participant::human(challenger, challenger_user.username.clone()),
            Participant::human(responder, responder_user.username.clone()),
        ];

        for id in [challenger, responder] {
            if let Some(user) = users.get_mut(&id) {
                user.in_match = true;
                user.challenged_by.clear();
            }
        }
        Some(participants)
    }

    /// Decline an open challenge and tell the challenger
    pub fn decline(&self, responder: ConnectionId, challenger: ConnectionId) {
        let username = {
            let mut users = self.users.lock();
            let Some(user) = users.get_mut(&responder) else {
                return;
            };
            if !user.challenged_by.remove(&challenger) {
                return;
            }
            user.username.clone()
        };

        self.hub.send(
            challenger,
            ServerMsg::ChallengeDeclined {
                reason: format!("{username} declined your challenge."),
            },
        );
    }

    /// Claim a free lobby user for a match against the bot
    pub fn claim_bot_match(&self, connection: ConnectionId) -> Option<[Participant; 2]> {
        let mut users = self.users.lock();
        let user = users.get_mut(&connection).filter(|u| !u.in_match)?;
        user.in_match = true;
        user.challenged_by.clear();
        Some([
            Participant::human(connection, user.username.clone()),
            Participant::bot(BotPolicy::default()),
        ])
    }

    /// Mark a user as back in the lobby
    pub fn release(&self, connection: ConnectionId) {
        if let Some(user) = self.users.lock().get_mut(&connection) {
            user.in_match = false;
        }
    }

    pub fn entries(&self) -> Vec<LobbyEntry> {
        let mut entries: Vec<LobbyEntry> = self
            .users
            .lock()
            .iter()
            .map(|(id, user)| LobbyEntry {
                connection_id: *id,
                username: user.username.clone(),
                in_match: user.in_match,
                joined_at: user.joined_at,
            })
            .collect();
        entries.sort_by_key(|e| e.joined_at);
        entries
    }

    /// Send the current listing to every lobby user
    pub fn broadcast(&self) {
        let users = self.entries();
        for entry in &users {
            self.hub.send(
                entry.connection_id,
                ServerMsg::LobbyData {
                    users: users.clone(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_in_match(&self, connection: ConnectionId) -> bool {
        self.users
            .lock()
            .get(&connection)
            .is_some_and(|u| u.in_match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::Controller;
    use tokio::sync::mpsc::Receiver;

    fn lobby() -> (Arc<SessionHub>, LobbyService) {
        let hub = Arc::new(SessionHub::new(16));
        (hub.clone(), LobbyService::new(hub))
    }

    fn drain(rx: &mut Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_join_validates_and_broadcasts() {
        let (hub, lobby) = lobby();
        let alice = ConnectionId::new();
        let mut rx = hub.register(alice);

        assert_eq!(lobby.join(alice, "   "), Err(LobbyError::InvalidUsername));
        assert_eq!(lobby.join(alice, &"x".repeat(25)), Err(LobbyError::InvalidUsername));
        assert_eq!(lobby.len(), 0);
        assert_eq!(LobbyError::InvalidUsername.code(), "invalid_username");

        lobby.join(alice, "  alice ").unwrap();
        let msgs = drain(&mut rx);
        let Some(ServerMsg::LobbyData { users }) = msgs.last() else {
            panic!("expected lobby data, got {msgs:?}");
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
        assert!(!users[0].in_match);

        lobby.join(alice, "alicia").unwrap();
        assert_eq!(lobby.len(), 1);
        assert_eq!(lobby.entries()[0].username, "alicia");
    }

    #[tokio::test]
    async fn test_challenge_accept_flow() {
        let (hub, lobby) = lobby();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let _alice_rx = hub.register(alice);
        let mut bob_rx = hub.register(bob);
        lobby.join(alice, "alice").unwrap();
        lobby.join(bob, "bob").unwrap();

        // Accepting a challenge that was never sent does nothing
        assert!(lobby.accept(bob, alice).is_none());

        lobby.challenge(alice, bob);
        let request = drain(&mut bob_rx)
            .into_iter()
            .find(|m| matches!(m, ServerMsg::ChallengeRequest { .. }));
        let Some(ServerMsg::ChallengeRequest {
            from,
            from_username,
        }) = request
        else {
            panic!("expected a challenge request");
        };
        assert_eq!(from, alice);
        assert_eq!(from_username, "alice");

        let [first, second] = lobby.accept(bob, alice).unwrap();
        assert_eq!(first.controller, Controller::Human(alice));
        assert_eq!(second.controller, Controller::Human(bob));
        assert_eq!(second.username, "bob");
        assert!(lobby.is_in_match(alice));
        assert!(lobby.is_in_match(bob));

        // Busy users cannot be challenged
        let carol = ConnectionId::new();
        lobby.join(carol, "carol").unwrap();
        lobby.challenge(carol, alice);
        assert!(lobby.accept(alice, carol).is_none());

        lobby.release(alice);
        assert!(!lobby.is_in_match(alice));
    }

    #[tokio::test]
    async fn test_decline_notifies_challenger() {
        let (hub, lobby) = lobby();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let mut alice_rx = hub.register(alice);
        let _bob_rx = hub.register(bob);
        lobby.join(alice, "alice").unwrap();
        lobby.join(bob, "bob").unwrap();

        lobby.challenge(alice, bob);
        drain(&mut alice_rx);
        lobby.decline(bob, alice);

        let msgs = drain(&mut alice_rx);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::ChallengeDeclined { reason } if reason == "bob declined your challenge."
        )));
        assert!(lobby.accept(bob, alice).is_none());
    }

    #[tokio::test]
    async fn test_self_challenge_and_leave() {
        let (hub, lobby) = lobby();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let _rx = hub.register(alice);
        lobby.join(alice, "alice").unwrap();
        lobby.join(bob, "bob").unwrap();

        lobby.challenge(alice, alice);
        assert!(lobby.accept(alice, alice).is_none());

        lobby.challenge(alice, bob);
        assert!(lobby.leave(alice).is_some());
        assert!(lobby.accept(bob, alice).is_none());
        assert!(lobby.leave(alice).is_none());
        assert_eq!(lobby.len(), 1);
    }

    #[tokio::test]
    async fn test_bot_match_claim() {
        let (_hub, lobby) = lobby();
        let alice = ConnectionId::new();
        assert!(lobby.claim_bot_match(alice).is_none());

        lobby.join(alice, "alice").unwrap();
        let [human, bot] = lobby.claim_bot_match(alice).unwrap();
        assert_eq!(human.controller, Controller::Human(alice));
        assert!(bot.is_bot());
        assert!(lobby.claim_bot_match(alice).is_none());
    }
}
