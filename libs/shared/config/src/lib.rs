use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What cancelling an appointment does to its soft-delete flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Cancel goes through the store's soft delete: `is_active = false`, `status = cancelled`.
    #[default]
    Deactivate,
    /// Row stays active with `status = cancelled`, so it keeps showing up in listings.
    Retain,
}

impl FromStr for CancellationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deactivate" => Ok(CancellationPolicy::Deactivate),
            "retain" => Ok(CancellationPolicy::Retain),
            other => Err(format!("unknown cancellation policy '{}'", other)),
        }
    }
}

impl fmt::Display for CancellationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationPolicy::Deactivate => write!(f, "deactivate"),
            CancellationPolicy::Retain => write!(f, "retain"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub bind_addr: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub cancellation_policy: CancellationPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            bind_addr: "0.0.0.0:3000".to_string(),
            default_page_size: 100,
            max_page_size: 100,
            cancellation_policy: CancellationPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| defaults.bind_addr.clone()),
            default_page_size: parse_var("APPOINTMENT_DEFAULT_PAGE_SIZE", defaults.default_page_size),
            max_page_size: parse_var("APPOINTMENT_MAX_PAGE_SIZE", defaults.max_page_size),
            cancellation_policy: parse_var("APPOINTMENT_CANCELLATION_POLICY", defaults.cancellation_policy),
        };

        if !config.is_configured() {
            warn!("Supabase not configured - appointments will be kept in memory");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
