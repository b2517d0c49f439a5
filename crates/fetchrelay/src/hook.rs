//! Optional HTTP notification after every completed cycle.

use std::time::Duration;

use tracing::{info, warn};

use crate::sanitize::redact_url;

const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain GET against a user supplied URL, typically a dead-man's-switch
/// style health check.
#[derive(Debug, Clone)]
pub struct SuccessHook {
    client: reqwest::Client,
    url: String,
}

impl SuccessHook {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(HOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Calls the hook. Failures are logged and otherwise ignored; returns
    /// whether the endpoint answered with a success status.
    pub async fn notify(&self) -> bool {
        let target = redact_url(&self.url);
        info!(url = %target, "Calling success hook");

        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    url = %target,
                    status = response.status().as_u16(),
                    "Success hook answered"
                );
                true
            }
            Ok(response) => {
                warn!(
                    url = %target,
                    status = response.status().as_u16(),
                    "Success hook returned an error status"
                );
                false
            }
            Err(e) => {
                // reqwest errors embed the full URL, which may carry a token.
                warn!(url = %target, error = %e.without_url(), "Success hook failed");
                false
            }
        }
    }
}
