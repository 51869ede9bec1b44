//! Credential hygiene shared by the backend adapters.
//!
//! Keys never appear whole in logs, and upstream error bodies are scrubbed
//! before they can reach a log line or an error chain.

/// Keys at or below this length are hidden entirely.
const FULL_MASK_MAX_LEN: usize = 8;

/// Characters left visible on each side of a longer key.
const MASK_EDGE: usize = 4;

/// Substrings that mark an error body as credential-bearing.
const CREDENTIAL_MARKERS: &[&str] = &[
    "api_key",
    "api-key",
    "apikey",
    "authorization",
    "bearer",
    "token",
    "secret",
    "password",
    "credential",
    "key=",
];

/// Upstream bodies longer than this are never passed through.
const MAX_PASSTHROUGH_LEN: usize = 200;

/// Masks a key down to its first and last four characters.
///
/// Anything eight characters or shorter becomes `****` outright, since
/// showing edges of a short key would leave little hidden.
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= FULL_MASK_MAX_LEN {
        return "****".to_string();
    }
    let head = &key[..MASK_EDGE];
    let tail = &key[key.len() - MASK_EDGE..];
    format!("{head}...{tail}")
}

/// Scrubs an upstream error body before it is logged or surfaced.
///
/// Recognizable authentication and rate limit failures map to fixed
/// messages. Bodies that mention credentials, and bodies too long to eyeball,
/// are replaced wholesale. Everything else passes through unchanged.
#[must_use]
pub fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("unauthorized") || lower.contains("authentication") {
        return "Provider authentication failed. Verify the configured API key.".to_string();
    }
    if lower.contains("rate limit") || lower.contains("quota") {
        return "Provider rate limit hit. Back off and retry.".to_string();
    }
    if CREDENTIAL_MARKERS.iter().any(|marker| lower.contains(marker))
        || error.len() >= MAX_PASSTHROUGH_LEN
    {
        return "The provider returned an error. Try again shortly.".to_string();
    }

    error.to_string()
}

/// Rejects keys that cannot possibly be valid.
///
/// Returns the reason when the key is empty or implausibly short, `None`
/// when it looks usable.
#[must_use]
pub fn validate_api_key(key: &str, provider_name: &str) -> Option<String> {
    if key.is_empty() {
        return Some(format!("{provider_name} API key is required"));
    }
    if key.len() <= FULL_MASK_MAX_LEN {
        return Some(format!("{provider_name} API key is too short to be valid"));
    }
    None
}
