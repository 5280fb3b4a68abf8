// Request budget for Reddit API calls.
//
// Reddit allows OAuth clients roughly 100 requests per minute and reports
// the remaining allowance in `x-ratelimit-remaining` / `x-ratelimit-reset`
// headers. The budget combines a local sliding window with those headers.
//
// When the budget is spent, `acquire()` does not wait for it to refill: it
// hands back how long until it does, and the caller gives up on the current
// poll cycle. Only the short minimum spacing between requests is slept.
//
// One budget is shared by every community loop through the shared client,
// so all state sits behind mutexes and callers only need `&self`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

/// Reddit's documented OAuth allowance.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

/// Fallback pause when the server signals exhaustion without a reset time.
pub const DEFAULT_RESET: Duration = Duration::from_secs(60);

/// Sliding-window request budget, optionally paused by the server.
pub struct RequestBudget {
    /// Timestamps of recent requests within the current window.
    requests: Mutex<VecDeque<Instant>>,
    /// Maximum number of requests allowed per window.
    max_requests: u32,
    /// Duration of the sliding window.
    window: Duration,
    /// Minimum spacing between consecutive requests.
    min_delay: Duration,
    /// Timestamp of the last request (for enforcing min_delay).
    last_request: Mutex<Option<Instant>>,
    /// Set when the server reports zero requests remaining.
    paused_until: Mutex<Option<Instant>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RequestBudget {
    /// - `max_requests_per_window`: how many requests are allowed in the window
    /// - `window_seconds`: the sliding window duration in seconds
    /// - `min_delay_ms`: minimum milliseconds between consecutive requests
    pub fn new(max_requests_per_window: u32, window_seconds: u64, min_delay_ms: u64) -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            max_requests: max_requests_per_window,
            window: Duration::from_secs(window_seconds),
            min_delay: Duration::from_millis(min_delay_ms),
            last_request: Mutex::new(None),
            paused_until: Mutex::new(None),
        }
    }

    /// Reserve one request.
    ///
    /// Returns `Err(retry_after)` without reserving anything when either the
    /// server pause or the local window is in effect.
    pub async fn acquire(&self) -> Result<(), Duration> {
        if let Some(wait) = self.server_pause_remaining() {
            return Err(wait);
        }

        // Compute the spacing wait under the lock, sleep without it.
        let spacing_wait = {
            let last = lock(&self.last_request);
            (*last)
                .and_then(|t| self.min_delay.checked_sub(t.elapsed()))
                .filter(|wait| !wait.is_zero())
        };
        if let Some(wait) = spacing_wait {
            tokio::time::sleep(wait).await;
        }

        let now = Instant::now();
        let mut requests = lock(&self.requests);

        while let Some(&oldest) = requests.front() {
            if now.duration_since(oldest) > self.window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if (requests.len() as u32) < self.max_requests {
            requests.push_back(now);
            *lock(&self.last_request) = Some(now);
            return Ok(());
        }

        let retry_after = requests
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window);
        debug!(
            retry_after_ms = retry_after.as_millis() as u64,
            "Local request window full"
        );
        Err(retry_after)
    }

    /// Feed in the rate-limit headers from a response.
    ///
    /// `remaining` below one pauses the budget for `reset` (or
    /// [`DEFAULT_RESET`] if the server didn't say).
    pub fn observe(&self, remaining: Option<f64>, reset: Option<Duration>) {
        let Some(remaining) = remaining else {
            return;
        };
        let mut paused = lock(&self.paused_until);
        if remaining < 1.0 {
            let reset = reset.unwrap_or(DEFAULT_RESET);
            debug!(reset_secs = reset.as_secs(), "Server request budget exhausted");
            *paused = Some(Instant::now() + reset);
        } else {
            *paused = None;
        }
    }

    /// Pause the budget after an explicit 429.
    pub fn pause_for(&self, reset: Duration) {
        *lock(&self.paused_until) = Some(Instant::now() + reset);
    }

    fn server_pause_remaining(&self) -> Option<Duration> {
        let mut paused = lock(&self.paused_until);
        let until = (*paused)?;
        let now = Instant::now();
        if now >= until {
            *paused = None;
            None
        } else {
            Some(until - now)
        }
    }
}

/// Parse Reddit's rate-limit headers: `(remaining, reset)`.
pub fn parse_headers(headers: &reqwest::header::HeaderMap) -> (Option<f64>, Option<Duration>) {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    let remaining = read("x-ratelimit-remaining");
    // Reddit resets every ten minutes at most; clamp so a bogus header cannot
    // overflow the Duration conversion.
    let reset = read("x-ratelimit-reset").map(|s| Duration::from_secs_f64(s.min(3600.0)));
    (remaining, reset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    // ── RequestBudget::new ──────────────────────────────────────────

    #[test]
    fn test_new_creates_empty_budget() {
        let budget = RequestBudget::new(100, 60, 50);
        assert_eq!(budget.max_requests, 100);
        assert_eq!(budget.window, Duration::from_secs(60));
        assert_eq!(budget.min_delay, Duration::from_millis(50));
        assert!(budget.requests.lock().unwrap().is_empty());
        assert!(budget.paused_until.lock().unwrap().is_none());
    }

    // ── acquire: window ────────────────────────────────────────────

    #[tokio::test]
    async fn test_acquire_allows_requests_under_limit() {
        let budget = RequestBudget::new(10, 60, 0);
        for _ in 0..10 {
            assert!(budget.acquire().await.is_ok());
        }
        assert_eq!(budget.requests.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_acquire_refuses_instead_of_waiting_when_window_full() {
        let budget = RequestBudget::new(2, 60, 0);
        budget.acquire().await.unwrap();
        budget.acquire().await.unwrap();

        let start = Instant::now();
        let retry_after = budget.acquire().await.unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(retry_after > Duration::from_secs(55), "got {retry_after:?}");
        // The refused request was not recorded
        assert_eq!(budget.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_window_expiry_frees_room() {
        let budget = RequestBudget::new(1, 0, 0);
        budget.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(budget.acquire().await.is_ok());
    }

    // ── acquire: min_delay ─────────────────────────────────────────

    #[tokio::test]
    async fn test_acquire_min_delay_enforced() {
        let budget = RequestBudget::new(1000, 60, 50);
        let start = Instant::now();
        budget.acquire().await.unwrap();
        budget.acquire().await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(45),
            "Expected at least ~50ms spacing, got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let budget = RequestBudget::new(100, 60, 500);
        let start = Instant::now();
        budget.acquire().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    // ── server headers ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_exhausted_server_budget_pauses() {
        let budget = RequestBudget::new(100, 60, 0);
        budget.observe(Some(0.0), Some(Duration::from_secs(42)));
        let retry_after = budget.acquire().await.unwrap_err();
        assert!(retry_after <= Duration::from_secs(42));
        assert!(retry_after > Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_remaining_budget_clears_pause() {
        let budget = RequestBudget::new(100, 60, 0);
        budget.observe(Some(0.0), Some(Duration::from_secs(42)));
        budget.observe(Some(57.0), Some(Duration::from_secs(10)));
        assert!(budget.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_pause_expires() {
        let budget = RequestBudget::new(100, 60, 0);
        budget.pause_for(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(budget.acquire().await.is_ok());
    }

    #[test]
    fn test_missing_headers_leave_budget_alone() {
        let budget = RequestBudget::new(100, 60, 0);
        budget.observe(None, Some(Duration::from_secs(5)));
        assert!(budget.paused_until.lock().unwrap().is_none());
    }

    #[test]
    fn test_parse_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("598.0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("123"));
        let (remaining, reset) = parse_headers(&headers);
        assert_eq!(remaining, Some(598.0));
        assert_eq!(reset, Some(Duration::from_secs(123)));
    }

    #[test]
    fn test_parse_headers_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("lots"));
        assert_eq!(parse_headers(&headers), (None, None));
    }
}
