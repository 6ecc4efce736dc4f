//! WebSocket transport

pub mod handler;
pub mod hub;
pub mod protocol;

pub use handler::ws_handler;
pub use hub::SessionHub;
