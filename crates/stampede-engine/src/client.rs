//! Shared HTTP client construction.

use std::time::Duration;

use stampede_core::error::{Result, StampedeError};
use stampede_core::plan::HttpSettings;

/// Build the client every virtual user shares.
///
/// Redirects are disabled: the target classifies both 200 and 302 as
/// acceptable, and following a redirect would turn one configured request
/// into two and skew the aggregates.
pub fn build_client(http: &HttpSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(http.request_timeout_secs))
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .user_agent(http.user_agent.clone())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| StampedeError::ClientBuild(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_build() {
        assert!(build_client(&HttpSettings::default()).is_ok());
    }
}
