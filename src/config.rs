//! Client configuration

use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// The server's own default when a request omits the timezone
const DEFAULT_TIMEZONE: &str = "Europe/Istanbul";

/// Settings for the transport and session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `X-API-Key` when set
    pub api_key: Option<String>,
    pub timezone: String,
    /// Applies to non-streaming calls only
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Pause before the notification feed reconnects
    pub reconnect_delay: Duration,
    /// Capacity of the observer broadcast channel
    pub update_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            update_buffer: 256,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; bad values keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(fallback, Duration::from_secs)
        };

        Self {
            base_url: lookup("ASSISTANT_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .map_or(defaults.base_url, |v| v.trim().trim_end_matches('/').to_string()),
            api_key: lookup("ASSISTANT_API_KEY").filter(|v| !v.is_empty()),
            timezone: lookup("ASSISTANT_TIMEZONE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.timezone),
            request_timeout: secs("ASSISTANT_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            connect_timeout: secs("ASSISTANT_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            reconnect_delay: secs("ASSISTANT_RECONNECT_SECS", defaults.reconnect_delay),
            update_buffer: lookup("ASSISTANT_UPDATE_BUFFER")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.update_buffer),
        }
    }
}
