use std::env;
use tracing::warn;

/// Organization-level fallback timezone. Individual doctors usually carry
/// their own IANA zone in calendar config; this is used when they don't.
pub const FALLBACK_TIMEZONE: &str = "America/Lima";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub doctoc_base_url: String,
    pub doctoc_api_token: String,
    pub default_timezone: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            doctoc_base_url: env::var("DOCTOC_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DOCTOC_BASE_URL not set, using empty value");
                    String::new()
                }),
            doctoc_api_token: env::var("DOCTOC_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("DOCTOC_API_TOKEN not set, using empty value");
                    String::new()
                }),
            default_timezone: env::var("DEFAULT_TIMEZONE")
                .unwrap_or_else(|_| {
                    warn!("DEFAULT_TIMEZONE not set, using {}", FALLBACK_TIMEZONE);
                    FALLBACK_TIMEZONE.to_string()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.doctoc_base_url.is_empty()
    }
}
