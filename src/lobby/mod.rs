//! Lobby: who is online, challenges between users, and bot-match requests

pub mod service;

pub use service::LobbyService;
