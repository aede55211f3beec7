use ulid::Ulid;

/// Prefixes for the ids handed out by the realtime server.
pub mod prefix {
    /// Live WebSocket connection.
    pub const CONNECTION: &str = "conn";
    /// In-memory chat room.
    pub const ROOM: &str = "room";
}

/// `<prefix>_<ulid>`. ULIDs sort by creation time.
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{prefix}_{}", Ulid::new())
}

/// Types whose ids are generated with a fixed prefix.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}
