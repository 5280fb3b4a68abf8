// Reddit OAuth client: script-app password grant plus listing fetches.
//
// Tokens come from the password grant on www.reddit.com and are cached until
// shortly before they expire. Listings are read from oauth.reddit.com with
// the bearer token. A single client (and its request budget) is shared by
// every community loop.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::listing::{Listing, ListingResponse, ListingSort};
use super::rate_limit::{self, RequestBudget};
use super::traits::ListingSource;
use crate::config::{ApiSettings, Credentials};

/// Default OAuth API endpoint for authenticated reads.
pub const DEFAULT_API_URL: &str = "https://oauth.reddit.com";

/// Default token endpoint for the password grant.
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Reddit caps listing pages at 100 entries.
pub const MAX_PAGE_SIZE: usize = 100;

/// Refresh the token this long before Reddit says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Authenticated Reddit client.
pub struct RedditClient {
    client: reqwest::Client,
    api_url: String,
    auth_url: String,
    credentials: Credentials,
    budget: RequestBudget,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(credentials: Credentials, api: &ApiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(api.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api.api_url.trim_end_matches('/').to_string(),
            auth_url: api.auth_url.clone(),
            credentials,
            budget: RequestBudget::new(api.requests_per_minute, 60, api.min_request_delay_ms),
            token: Mutex::new(None),
        })
    }

    /// Obtain a token up front so bad credentials fail at startup rather
    /// than on the first poll.
    pub async fn authenticate(&self) -> Result<(), FetchError> {
        self.bearer().await.map(|_| ())
    }

    /// Return a valid bearer token, requesting a new one if needed.
    async fn bearer(&self) -> Result<String, FetchError> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if Instant::now() < current.expires_at {
                return Ok(current.value.clone());
            }
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn request_token(&self) -> Result<AccessToken, FetchError> {
        debug!(username = %self.credentials.username, "Requesting OAuth token");

        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Auth(format!(
                    "token endpoint returned {status}; check REDDIT_CLIENT_ID/REDDIT_CLIENT_SECRET"
                )));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::RateLimited {
                    retry_after: rate_limit::DEFAULT_RESET,
                });
            }
            s if !s.is_success() => {
                return Err(FetchError::Transient(format!(
                    "token endpoint returned {status}"
                )));
            }
            _ => {}
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("Failed to parse token response: {e}")))?;

        // Reddit answers a bad username/password with 200 + {"error": ...}
        if let Some(error) = body.error {
            return Err(FetchError::Auth(format!(
                "token request rejected: {error}; check REDDIT_USERNAME/REDDIT_PASSWORD"
            )));
        }
        let value = body
            .access_token
            .ok_or_else(|| FetchError::Transient("token response had no access_token".into()))?;

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        info!(expires_in_secs = lifetime.as_secs(), "Obtained Reddit OAuth token");

        Ok(AccessToken {
            value,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }

    /// Fetch one listing page, retrying once with a fresh token on 401.
    async fn get_page(
        &self,
        community: &str,
        sort: ListingSort,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingResponse, FetchError> {
        let url = format!("{}/r/{}/{}", self.api_url, community, sort.as_path());
        let limit = limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![("limit", limit.as_str()), ("raw_json", "1")];
        if let Some(after) = after {
            params.push(("after", after));
        }

        for attempt in 0..2 {
            self.budget
                .acquire()
                .await
                .map_err(|retry_after| FetchError::RateLimited { retry_after })?;
            let token = self.bearer().await?;

            debug!(community = community, sort = %sort, attempt, "Listing GET request");

            let response = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(&params)
                .send()
                .await?;

            let (remaining, reset) = rate_limit::parse_headers(response.headers());
            self.budget.observe(remaining, reset);

            let status = response.status();
            if status.is_success() {
                return response.json::<ListingResponse>().await.map_err(|e| {
                    FetchError::Transient(format!("Failed to parse r/{community} listing: {e}"))
                });
            }

            match status {
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    debug!(community = community, "Token rejected, refreshing");
                    self.invalidate_token().await;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(FetchError::Auth(format!(
                        "r/{community} listing rejected a freshly issued token"
                    )));
                }
                StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                    return Err(FetchError::Unavailable {
                        community: community.to_string(),
                        status: status.as_u16(),
                    });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = reset.unwrap_or(rate_limit::DEFAULT_RESET);
                    self.budget.pause_for(retry_after);
                    return Err(FetchError::RateLimited { retry_after });
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(FetchError::Transient(format!(
                        "r/{community} returned {status}: {}",
                        crate::output::truncate_chars(&body, 200)
                    )));
                }
            }
        }

        Err(FetchError::Auth(format!(
            "r/{community} listing rejected every token"
        )))
    }
}

#[async_trait]
impl ListingSource for RedditClient {
    async fn fetch_listing(
        &self,
        community: &str,
        sort: ListingSort,
        limit: usize,
    ) -> Result<Listing, FetchError> {
        let mut listing = Listing::default();
        let mut after: Option<String> = None;
        let mut malformed = 0usize;

        while listing.posts.len() < limit {
            let page_size = (limit - listing.posts.len()).min(MAX_PAGE_SIZE);
            let page = match self
                .get_page(community, sort, page_size, after.as_deref())
                .await
            {
                Ok(page) => page,
                // Keep what earlier pages returned; the rest waits for the next tick.
                Err(FetchError::RateLimited { .. }) if !listing.posts.is_empty() => {
                    listing.rate_limited = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            let received = page.data.children.len();
            for child in page.data.children {
                match child.data.into_post() {
                    Some(post) => listing.posts.push(post),
                    None => malformed += 1,
                }
            }

            after = page.data.after;
            if after.is_none() || received == 0 {
                break;
            }
        }

        listing.posts.truncate(limit);

        if malformed > 0 {
            warn!(
                community = community,
                malformed, "Dropped malformed listing entries"
            );
        }
        debug!(
            community = community,
            sort = %sort,
            posts = listing.posts.len(),
            rate_limited = listing.rate_limited,
            "Fetched listing"
        );

        Ok(listing)
    }
}

// -- Serde types for the token endpoint --

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}
