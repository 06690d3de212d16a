//! Origin and environment constants.

/// Origin used when nothing else is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Origin the guide is served from.
pub const ORIGIN_ENV: &str = "GRIMOIRE_ORIGIN";

/// API base URL override.
pub const API_URL_ENV: &str = "GRIMOIRE_API_URL";

pub const TIMEOUT_ENV: &str = "GRIMOIRE_API_TIMEOUT_MS";
pub const MAX_RETRIES_ENV: &str = "GRIMOIRE_API_MAX_RETRIES";
pub const CACHE_TTL_ENV: &str = "GRIMOIRE_API_CACHE_TTL_MS";

/// The origin the default client is bound to.
pub fn current_origin() -> String {
    std::env::var(ORIGIN_ENV)
        .ok()
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
}
