// Listing source trait: the seam between the monitor loop and the API.
//
// The production implementation is `RedditClient`; tests drive the monitor
// with scripted in-memory sources.

use async_trait::async_trait;

use super::error::FetchError;
use super::listing::{Listing, ListingSort};

#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch up to `limit` posts from a community's listing.
    ///
    /// A rate limit hit after some posts were received is reported through
    /// `Listing::rate_limited` rather than as an error, so the posts already
    /// in hand can still be processed.
    async fn fetch_listing(
        &self,
        community: &str,
        sort: ListingSort,
        limit: usize,
    ) -> Result<Listing, FetchError>;
}
