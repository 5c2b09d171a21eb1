// Configuration constants for the server

use std::time::Duration;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub alignment_dir: String,
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8088,
            rate_limit_per_minute: 600,
            request_timeout_secs: 30,
            cors_allowed_origins: None,
            alignment_dir: "logs".to_string(),
            event_buffer: highlight_core::DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        // Character-level producers emit many small events per utterance, so
        // the default is far higher than a typical request API would use.
        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let alignment_dir = std::env::var("ALIGNMENT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.alignment_dir);

        let event_buffer = std::env::var("EVENT_BUFFER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.event_buffer);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            alignment_dir,
            event_buffer,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
