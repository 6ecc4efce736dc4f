//! Match service - routes participant commands to their match and fans out the results

use std::sync::Arc;
use tracing::{debug, info};

use crate::lobby::LobbyService;
use crate::ws::hub::SessionHub;
use crate::ws::protocol::ServerMsg;

use super::board::Side;
use super::ids::{ConnectionId, MatchId};
use super::r#match::{Command, Match, MatchEvent, Participant};
use super::registry::MatchRegistry;

pub struct MatchService {
    registry: Arc<MatchRegistry>,
    hub: Arc<SessionHub>,
    lobby: Arc<LobbyService>,
}

impl MatchService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        hub: Arc<SessionHub>,
        lobby: Arc<LobbyService>,
    ) -> Self {
        Self {
            registry,
            hub,
            lobby,
        }
    }

    /// Register a new match and send each human its own starting view.
    /// A participant whose connection closed before the match was registered
    /// forfeits on the spot.
    pub fn create_match(&self, participants: [Participant; 2]) -> MatchId {
        let shared = self.registry.create(participants);
        let mut game = shared.lock();
        let id = game.id();

        // The match is indexed before this check, so a disconnect racing with it
        // either left the lobby already or will find the match and forfeit it.
        for (side, connection) in game.connected_humans() {
            if !self.lobby.is_in_match(connection) {
                info!(
                    connection_id = %connection,
                    match_id = %id,
                    "Participant gone before match start"
                );
                self.registry.release(connection);
                game.forfeit(side);
            }
        }

        let snapshot = game.snapshot();
        let remaining = game.connected_humans();
        for &(side, connection) in &remaining {
            self.hub.send(
                connection,
                ServerMsg::MatchStarted {
                    snapshot: snapshot.redacted_for(Some(side)),
                },
            );
        }

        let departed = Side::BOTH.into_iter().any(|s| game.side(s).departed);
        if departed && (game.is_bot_match() || remaining.is_empty()) {
            self.registry.remove(&id);
        }
        drop(game);

        info!(match_id = %id, "Match created");
        self.lobby.broadcast();
        id
    }

    /// Apply a command from `connection`. Connections that do not play in the
    /// match are ignored, as are commands the match rejects.
    pub fn handle(&self, connection: ConnectionId, match_id: MatchId, command: Command) {
        let Some(shared) = self.registry.get(&match_id) else {
            debug!(
                connection_id = %connection,
                match_id = %match_id,
                "Command for unknown match"
            );
            return;
        };

        let mut game = shared.lock();
        let Some(side) = game.side_of(connection) else {
            debug!(
                connection_id = %connection,
                match_id = %match_id,
                "Command from non-participant"
            );
            return;
        };

        let events = game.apply(side, command);
        self.publish(&game, &events);
    }

    /// `connection` leaves its match for the lobby
    pub fn exit(&self, connection: ConnectionId, match_id: MatchId) {
        let Some(shared) = self.registry.get(&match_id) else {
            return;
        };

        {
            let mut game = shared.lock();
            let Some(side) = game.side_of(connection) else {
                return;
            };

            let snapshot = game.abandon(side);
            for (side, remaining) in game.connected_humans() {
                self.hub.send(
                    remaining,
                    ServerMsg::StateChanged {
                        snapshot: snapshot.redacted_for(Some(side)),
                    },
                );
            }

            for seat in [side, side.opponent()] {
                if let Some(human) = game.side(seat).participant.connection() {
                    self.lobby.release(human);
                }
            }
            self.registry.remove(&match_id);
        }

        info!(
            connection_id = %connection,
            match_id = %match_id,
            "Participant exited to lobby"
        );
        self.hub.send(connection, ServerMsg::ReturnedToLobby);
        self.lobby.broadcast();
    }

    /// Tear down everything a closed connection was part of
    pub fn disconnect(&self, connection: ConnectionId) {
        self.lobby.leave(connection);

        let Some((match_id, shared)) = self.registry.find_by_participant(connection) else {
            return;
        };
        self.registry.release(connection);

        let teardown = {
            let mut game = shared.lock();
            let Some(side) = game.side_of(connection) else {
                return;
            };

            let events = game.forfeit(side);
            if events.is_empty() {
                // Already finished; still tell the other side who left
                let snapshot = game.snapshot();
                self.publish(&game, &[MatchEvent::StateChanged(Box::new(snapshot))]);
            } else {
                self.publish(&game, &events);
            }

            let teardown = game.is_bot_match() || game.connected_humans().is_empty();
            if teardown {
                self.registry.remove(&match_id);
            }
            teardown
        };

        info!(
            connection_id = %connection,
            match_id = %match_id,
            removed = teardown,
            "Participant disconnected from match"
        );
        self.lobby.broadcast();
    }

    /// Send `events` to every human still in `game`, each redacted for its side
    fn publish(&self, game: &Match, events: &[MatchEvent]) {
        if events.is_empty() {
            return;
        }

        for (side, connection) in game.connected_humans() {
            for event in events {
                let msg = match event {
                    MatchEvent::StateChanged(snapshot) => ServerMsg::StateChanged {
                        snapshot: snapshot.redacted_for(Some(side)),
                    },
                    MatchEvent::TieRoundRepeated { item, snapshot } => ServerMsg::TieRoundRepeated {
                        item: *item,
                        snapshot: snapshot.redacted_for(Some(side)),
                    },
                };
                self.hub.send(connection, msg);
            }
        }
    }
}
