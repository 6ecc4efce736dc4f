//! Game modules: board, combat, the match state machine, the bot and match bookkeeping

pub mod board;
pub mod bot;
pub mod combat;
pub mod ids;
pub mod r#match;
pub mod registry;
pub mod service;
pub mod snapshot;

pub use board::Position;
pub use bot::BotPolicy;
pub use combat::Item;
pub use ids::{ConnectionId, MatchId};
pub use r#match::{Command, Participant};
pub use registry::MatchRegistry;
pub use service::MatchService;
