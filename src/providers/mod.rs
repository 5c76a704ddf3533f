//! External data providers. Each provider is a thin HTTP client with an
//! individual timeout; everything returns the shared [`ProviderError`]
//! taxonomy so the dispatcher can map failures onto the canned
//! user-visible texts uniformly.

pub mod aprsfi;
pub mod cwop;
pub mod dapnet;
pub mod fortune;
pub mod geocode;
pub mod mail;
pub mod metar;
pub mod osm;
pub mod sonde;
pub mod wx;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transient upstream failure (timeout, connect error, 5xx, quota).
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The requested target does not resolve to a location.
    #[error("location not found")]
    NotFound,

    /// The query worked but matched nothing.
    #[error("no match")]
    Empty,

    /// Feature switched off by a configuration sentinel.
    #[error("feature disabled")]
    Disabled,

    /// Invariant violation on our side.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Unavailable(e.to_string())
    }
}

/// Build the HTTP client shared by all providers. Some upstreams
/// (Nominatim in particular) require an identifying agent string.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(format!(
            "{}/{} (+amateur radio APRS bot)",
            crate::AGENT_NAME,
            crate::AGENT_VERSION
        ))
        .build()
        .expect("client configuration is static")
}

/// Run the operation, retrying exactly once on a transient failure.
/// Non-transient errors (not found, empty, disabled) pass through.
pub async fn retry_once<T, F, Fut>(op: F) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    match op().await {
        Err(ProviderError::Unavailable(first)) => {
            warn!("Provider call failed ({}), retrying once", first);
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_once_retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<u32> = retry_once(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::Unavailable("first".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_once_gives_up_after_second_failure() {
        let result: ProviderResult<u32> =
            retry_once(|| async { Err(ProviderError::Unavailable("down".into())) }).await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn retry_once_passes_semantic_errors_through() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<u32> = retry_once(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::NotFound) }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
