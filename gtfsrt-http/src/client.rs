//! Shared HTTP client construction

use std::time::Duration;

const USER_AGENT: &str = concat!("gtfsrt-archiver/", env!("CARGO_PKG_VERSION"));

/// Build the shared client used by every feed pipeline.
///
/// One connection pool serves all feeds; per-request timeouts come from each
/// feed's spec rather than the client. Redirects are followed (limit 10).
pub fn build_client(max_connections: usize) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(max_connections.div_ceil(2))
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}
