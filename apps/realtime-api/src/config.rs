/// Realtime API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Frames buffered per connection before new frames are dropped.
    pub outbound_queue_capacity: usize,
    /// Text placed before the comment body in comment notifications.
    pub notification_prefix: String,
}

const DEFAULT_PORT: u16 = 4010;
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;
const DEFAULT_NOTIFICATION_PREFIX: &str = "New comment on your post: ";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            notification_prefix: DEFAULT_NOTIFICATION_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Every variable is
    /// optional; unset or unparsable values use the defaults.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT").unwrap_or(DEFAULT_PORT),
            outbound_queue_capacity: parsed_var("OUTBOUND_QUEUE_CAPACITY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY),
            notification_prefix: std::env::var("NOTIFICATION_PREFIX")
                .unwrap_or_else(|_| DEFAULT_NOTIFICATION_PREFIX.to_string()),
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.port, 4010);
        assert!(config.outbound_queue_capacity > 0);
        assert!(!config.notification_prefix.is_empty());
    }

    #[test]
    fn parsed_var_ignores_garbage() {
        assert_eq!(parsed_var::<u16>("REALTIME_API_TEST_UNSET_VAR"), None);
    }
}
