// Fetch errors: the taxonomy the monitor loop branches on.
//
// Transient and rate-limit failures cost one poll cycle. Auth failures and
// missing or forbidden communities stop the affected loop.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, server error, or an unparseable response.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("rate limited, budget resets in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Credentials rejected. Retrying will not help.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The community is private, banned, or does not exist.
    #[error("r/{community} unavailable (HTTP {status})")]
    Unavailable { community: String, status: u16 },
}

impl FetchError {
    /// Whether the loop that hit this error should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Auth(_) | FetchError::Unavailable { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}
