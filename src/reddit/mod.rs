// Reddit API client: OAuth authentication, listing fetches, request budget.
//
// The monitor only sees the `ListingSource` trait; everything Reddit-specific
// (endpoints, JSON shapes, rate-limit headers) stays inside this module.

pub mod client;
pub mod error;
pub mod listing;
pub mod rate_limit;
pub mod traits;
