use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::momentum::evaluator::{MomentumPolicy, ThresholdMode};
use crate::reddit::client::{DEFAULT_API_URL, DEFAULT_AUTH_URL};
use crate::reddit::listing::ListingSort;
use crate::reddit::rate_limit::DEFAULT_REQUESTS_PER_MINUTE;

/// Settings file looked up in the working directory when RADAR_CONFIG is unset.
pub const DEFAULT_CONFIG_FILE: &str = "radar.json";

/// Where alerts are appended as JSON lines unless RADAR_ALERT_LOG says otherwise.
pub const DEFAULT_ALERT_LOG: &str = "logs/rising_posts.jsonl";

/// One monitored community and its momentum thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Subreddit name without the `r/` prefix.
    pub name: String,
    /// Label used in alerts; defaults to `r/{name}`.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Upvotes/minute since creation needed to start tracking.
    pub initial_threshold: f64,
    /// Moving-average upvotes/minute needed to fire an alert.
    pub followup_threshold: f64,
    /// Posts younger than this are never promoted.
    #[serde(default = "default_min_age")]
    pub min_age_minutes: f64,
    #[serde(default)]
    pub listing: ListingSort,
    #[serde(default)]
    pub mode: ThresholdMode,
}

fn default_poll_interval() -> u64 {
    20
}

fn default_min_age() -> f64 {
    2.0
}

impl CommunityConfig {
    pub fn display_name(&self) -> String {
        self.display_name
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("r/{}", self.name))
    }

    /// The evaluator policy for this community.
    pub fn policy(&self, tracking: &TrackingConfig) -> MomentumPolicy {
        MomentumPolicy {
            initial_threshold: self.initial_threshold,
            followup_threshold: self.followup_threshold,
            min_age_minutes: self.min_age_minutes,
            moving_average_window: tracking.moving_average_window,
            mode: self.mode,
        }
    }
}

/// Process-wide tracking limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Upper bound on each community's tracking table.
    pub max_tracked_posts: usize,
    /// Records and posts older than this are dropped.
    pub max_post_age_minutes: u64,
    /// Inter-snapshot intervals averaged for the follow-up check.
    pub moving_average_window: usize,
    /// Snapshot ring-buffer capacity per post.
    pub max_snapshots: usize,
    /// Posts requested per listing fetch.
    pub listing_limit: usize,
    /// Posts already above this score are skipped as already hot.
    pub max_listing_score: Option<i64>,
    /// Post ids never evaluated (e.g. long-lived stickies).
    pub skip_post_ids: Vec<String>,
    /// Settling delay before each loop's first poll.
    pub startup_delay_seconds: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_tracked_posts: 100,
            max_post_age_minutes: 24 * 60,
            moving_average_window: 3,
            max_snapshots: 10,
            listing_limit: 25,
            max_listing_score: None,
            skip_post_ids: Vec::new(),
            startup_delay_seconds: 0,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub api_url: String,
    pub auth_url: String,
    pub request_timeout_seconds: u64,
    pub requests_per_minute: u32,
    pub min_request_delay_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            request_timeout_seconds: 30,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            min_request_delay_ms: 1000,
        }
    }
}

/// Contents of the JSON settings file. Every section is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_communities")]
    pub communities: Vec<CommunityConfig>,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub api: ApiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            communities: default_communities(),
            tracking: TrackingConfig::default(),
            api: ApiSettings::default(),
        }
    }
}

/// Built-in communities used when no settings file is present.
pub fn default_communities() -> Vec<CommunityConfig> {
    vec![
        CommunityConfig {
            name: "news".to_string(),
            display_name: Some("r/news".to_string()),
            poll_interval_seconds: 20,
            initial_threshold: 10.0,
            followup_threshold: 15.0,
            min_age_minutes: 2.0,
            listing: ListingSort::New,
            mode: ThresholdMode::TwoStage,
        },
        CommunityConfig {
            name: "cringe".to_string(),
            display_name: Some("r/cringe".to_string()),
            poll_interval_seconds: 20,
            initial_threshold: 5.0,
            followup_threshold: 10.0,
            min_age_minutes: 2.0,
            listing: ListingSort::New,
            mode: ThresholdMode::TwoStage,
        },
    ]
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid radar settings JSON")
    }

    /// Reject settings the monitor can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.communities.is_empty() {
            anyhow::bail!("No communities configured");
        }

        let mut seen = HashSet::new();
        for c in &self.communities {
            if c.name.trim().is_empty() {
                anyhow::bail!("Community with an empty name");
            }
            if !seen.insert(c.name.to_lowercase()) {
                anyhow::bail!("Community r/{} configured twice", c.name);
            }
            for (label, value) in [
                ("initial_threshold", c.initial_threshold),
                ("followup_threshold", c.followup_threshold),
                ("min_age_minutes", c.min_age_minutes),
            ] {
                if !value.is_finite() || value < 0.0 {
                    anyhow::bail!("r/{}: {label} must be a non-negative number", c.name);
                }
            }
            if c.poll_interval_seconds == 0 {
                anyhow::bail!("r/{}: poll_interval_seconds must be at least 1", c.name);
            }
        }

        let t = &self.tracking;
        if t.max_tracked_posts == 0 {
            anyhow::bail!("tracking.max_tracked_posts must be at least 1");
        }
        if t.moving_average_window == 0 {
            anyhow::bail!("tracking.moving_average_window must be at least 1");
        }
        if t.max_snapshots < 2 {
            anyhow::bail!("tracking.max_snapshots must be at least 2");
        }
        if t.listing_limit == 0 {
            anyhow::bail!("tracking.listing_limit must be at least 1");
        }
        if i64::try_from(t.max_post_age_minutes).is_err() {
            anyhow::bail!("tracking.max_post_age_minutes is out of range");
        }
        if self.api.requests_per_minute == 0 {
            anyhow::bail!("api.requests_per_minute must be at least 1");
        }

        Ok(())
    }
}

/// Reddit script-app credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

// Secrets stay out of debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            client_id: env::var("REDDIT_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("REDDIT_CLIENT_SECRET").unwrap_or_default(),
            username: env::var("REDDIT_USERNAME").unwrap_or_default(),
            password: env::var("REDDIT_PASSWORD").unwrap_or_default(),
            user_agent: env::var("REDDIT_USER_AGENT").unwrap_or_default(),
        }
    }

    /// Names of the environment variables that are still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("REDDIT_CLIENT_ID", &self.client_id),
            ("REDDIT_CLIENT_SECRET", &self.client_secret),
            ("REDDIT_USERNAME", &self.username),
            ("REDDIT_PASSWORD", &self.password),
            ("REDDIT_USER_AGENT", &self.user_agent),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Central configuration: settings file plus environment.
///
/// Secrets only ever come from env vars. The .env file is loaded
/// automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub communities: Vec<CommunityConfig>,
    pub tracking: TrackingConfig,
    pub api: ApiSettings,
    pub credentials: Credentials,
    pub alert_log_path: PathBuf,
    /// Settings file the configuration was read from, if any.
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Load settings and credentials.
    ///
    /// An explicit RADAR_CONFIG must exist. Without it, `radar.json` in the
    /// working directory is used when present, otherwise built-in defaults.
    pub fn load() -> Result<Self> {
        let (settings, settings_path) = match env::var("RADAR_CONFIG") {
            Ok(path) => {
                let path = PathBuf::from(path);
                (read_settings(&path)?, Some(path))
            }
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                (read_settings(&path)?, Some(path))
            }
            Err(_) => (Settings::default(), None),
        };

        let mut config = Self::from_settings(settings, Credentials::from_env());
        config.settings_path = settings_path;

        if let Ok(path) = env::var("RADAR_ALERT_LOG") {
            config.alert_log_path = PathBuf::from(path);
        }
        if let Ok(url) = env::var("REDDIT_API_URL") {
            config.api.api_url = url;
        }
        if let Ok(url) = env::var("REDDIT_AUTH_URL") {
            config.api.auth_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_settings(settings: Settings, credentials: Credentials) -> Self {
        Self {
            communities: settings.communities,
            tracking: settings.tracking,
            api: settings.api,
            credentials,
            alert_log_path: PathBuf::from(DEFAULT_ALERT_LOG),
            settings_path: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        Settings {
            communities: self.communities.clone(),
            tracking: self.tracking.clone(),
            api: self.api.clone(),
        }
        .validate()
    }

    /// Check that all Reddit credentials are configured.
    /// Call this before any operation that talks to the API.
    pub fn require_credentials(&self) -> Result<()> {
        let missing = self.credentials.missing();
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing Reddit API credentials: {}. Add them to your .env file.",
                missing.join(", ")
            );
        }
        Ok(())
    }

    pub fn community(&self, name: &str) -> Option<&CommunityConfig> {
        let name = name.trim_start_matches("r/");
        self.communities
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a CLI community filter; an empty filter selects everything.
    pub fn select_communities(&self, names: &[String]) -> Result<Vec<CommunityConfig>> {
        if names.is_empty() {
            return Ok(self.communities.clone());
        }
        names
            .iter()
            .map(|name| {
                self.community(name)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Community {name} is not configured"))
            })
            .collect()
    }
}

fn read_settings(path: &Path) -> Result<Settings> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    Settings::from_json(&json).with_context(|| format!("In {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = Settings::from_json(
            r#"{
                "communities": [
                    {"name": "news", "initial_threshold": 10, "followup_threshold": 15}
                ],
                "tracking": {"max_tracked_posts": 50}
            }"#,
        )
        .unwrap();
        let news = &settings.communities[0];
        assert_eq!(news.poll_interval_seconds, 20);
        assert_eq!(news.min_age_minutes, 2.0);
        assert_eq!(news.listing, ListingSort::New);
        assert_eq!(news.mode, ThresholdMode::TwoStage);
        assert_eq!(news.display_name(), "r/news");
        assert_eq!(settings.tracking.max_tracked_posts, 50);
        assert_eq!(settings.tracking.moving_average_window, 3);
        assert_eq!(settings.api.requests_per_minute, 100);
    }

    #[test]
    fn test_empty_json_uses_builtin_communities() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings.communities.len(), 2);
        assert_eq!(settings.communities[1].name, "cringe");
    }

    #[test]
    fn test_listing_and_mode_parse() {
        let settings = Settings::from_json(
            r#"{"communities": [{"name": "pics", "initial_threshold": 0,
                "followup_threshold": 20, "listing": "rising", "mode": "single"}]}"#,
        )
        .unwrap();
        assert_eq!(settings.communities[0].listing, ListingSort::Rising);
        assert_eq!(settings.communities[0].mode, ThresholdMode::Single);
    }

    #[test]
    fn test_duplicate_community_rejected() {
        let mut settings = Settings::default();
        settings.communities[1].name = "News".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_small_snapshot_capacity_rejected() {
        let mut settings = Settings::default();
        settings.tracking.max_snapshots = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut settings = Settings::default();
        settings.communities[0].followup_threshold = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_listed() {
        let credentials = Credentials {
            client_id: "id".into(),
            user_agent: "radar/0.1".into(),
            ..Credentials::default()
        };
        assert_eq!(
            credentials.missing(),
            vec!["REDDIT_CLIENT_SECRET", "REDDIT_USERNAME", "REDDIT_PASSWORD"]
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let credentials = Credentials {
            password: "hunter2".into(),
            client_secret: "s3cret".into(),
            ..Credentials::default()
        };
        let shown = format!("{credentials:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn test_select_communities() {
        let config = Config::from_settings(Settings::default(), Credentials::default());
        assert_eq!(config.select_communities(&[]).unwrap().len(), 2);
        let picked = config.select_communities(&["r/NEWS".to_string()]).unwrap();
        assert_eq!(picked[0].name, "news");
        assert!(config.select_communities(&["pics".to_string()]).is_err());
    }
}
