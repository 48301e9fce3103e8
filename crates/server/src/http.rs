//! Shared HTTP client setup and transient retry.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

pub(crate) const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_SECS: u64 = 1;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// Which transport failures a request may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retry {
    /// Reads: connect failures and timeouts.
    Transient,
    /// Writes: only failures where the request never reached the server.
    /// A timed-out write may already have been applied.
    ConnectOnly,
}

impl Retry {
    fn allows(self, connect: bool, timeout: bool) -> bool {
        match self {
            Retry::Transient => connect || timeout,
            Retry::ConnectOnly => connect,
        }
    }
}

/// Send a request, retrying the failures `retry` allows with backoff.
pub(crate) async fn send_with_retry<F, Fut>(
    service: &'static str,
    retry: Retry,
    make_request: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        match make_request().await {
            Ok(resp) => return Ok(resp),
            Err(err) if attempt < MAX_RETRIES && is_retryable(&err, retry) => {
                let delay = INITIAL_BACKOFF_SECS * 2u64.pow(attempt);
                attempt += 1;
                debug!(
                    service,
                    attempt,
                    max = MAX_RETRIES,
                    delay_secs = delay,
                    error = %err,
                    "Retrying API request"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Check if an error is retryable under `retry`.
fn is_retryable(err: &reqwest::Error, retry: Retry) -> bool {
    let timeout = err.is_timeout() || {
        let err_string = format!("{err:?}");
        err_string.contains("os error 110") || err_string.contains("Connection timed out")
    };
    retry.allows(err.is_connect(), timeout)
}
