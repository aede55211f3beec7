//! Realtime gateway: live connection registry, room membership and routing.

pub mod connection;
pub mod events;
pub mod identity;
pub mod membership;
pub mod registry;
pub mod router;
pub mod server;
