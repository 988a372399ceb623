//! Push layer: fans committed engine results out to WebSocket clients.

pub mod connection;
pub mod dispatcher;
pub mod hub;
pub mod presence;
pub mod typing;

pub use connection::handle_connection;
pub use dispatcher::{Dispatcher, Envelope};
pub use hub::Hub;
