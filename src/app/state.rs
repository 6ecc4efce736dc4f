//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{MatchRegistry, MatchService};
use crate::lobby::LobbyService;
use crate::ws::SessionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub match_registry: Arc<MatchRegistry>,
    pub hub: Arc<SessionHub>,
    pub lobby: Arc<LobbyService>,
    pub matches: Arc<MatchService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Outbound queues, one per connection
        let hub = Arc::new(SessionHub::new(config.outbound_buffer));

        let match_registry = Arc::new(MatchRegistry::new());
        let lobby = Arc::new(LobbyService::new(hub.clone()));
        let matches = Arc::new(MatchService::new(
            match_registry.clone(),
            hub.clone(),
            lobby.clone(),
        ));

        Self {
            config,
            match_registry,
            hub,
            lobby,
            matches,
        }
    }
}
