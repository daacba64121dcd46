//! Bulk liveness check of dataset locators.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;

use super::{request_error, HttpFetcher};
use crate::error::{FetchError, FetchResult};
use crate::resource::ResourceUrl;

/// Outcome of probing one locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Liveness {
    Live,
    /// The server answered with a non-success status.
    Gone { status: u16 },
    /// Not a dataset bundle url.
    Invalid { reason: String },
    /// No answer (connection failure, timeout).
    Unreachable { reason: String },
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        matches!(self, Liveness::Live)
    }
}

/// Something that can tell whether a bundle url still resolves.
pub trait Probe: Send + Sync {
    /// Returns the HTTP status of the resource.
    fn probe(&self, url: &ResourceUrl) -> impl Future<Output = FetchResult<u16>> + Send;
}

impl Probe for HttpFetcher {
    async fn probe(&self, url: &ResourceUrl) -> FetchResult<u16> {
        let response = self
            .client()
            .head(&url.locator)
            .send()
            .await
            .map_err(|e| request_error(&url.locator, e))?;
        Ok(response.status().as_u16())
    }
}

async fn classify<P: Probe>(probe: &P, locator: String) -> (String, Liveness) {
    let url = match ResourceUrl::parse(&locator) {
        Ok(url) => url,
        Err(e) => return (locator, Liveness::Invalid { reason: e.to_string() }),
    };

    let liveness = match probe.probe(&url).await {
        Ok(status) if (200..300).contains(&status) => Liveness::Live,
        Ok(status) => Liveness::Gone { status },
        Err(FetchError::Status { status, .. }) => Liveness::Gone { status },
        Err(e) => Liveness::Unreachable { reason: e.to_string() },
    };
    (locator, liveness)
}

/// Probe every locator with at most `workers` requests in flight.
///
/// Results are keyed by locator as given; duplicates collapse to one entry.
pub async fn check_liveness<P, I>(probe: &P, locators: I, workers: usize) -> HashMap<String, Liveness>
where
    P: Probe,
    I: IntoIterator,
    I::Item: Into<String>,
{
    stream::iter(locators.into_iter().map(Into::into))
        .map(|locator| classify(probe, locator))
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers by product id; tracks the peak number of concurrent probes.
    #[derive(Default)]
    struct FakeProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Probe for FakeProbe {
        async fn probe(&self, url: &ResourceUrl) -> FetchResult<u16> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match url.product_id.as_str() {
                "404" => Ok(404),
                "500" => Err(FetchError::Timeout(url.locator.clone())),
                _ => Ok(200),
            }
        }
    }

    #[tokio::test]
    async fn test_classifies_each_locator() {
        let probe = FakeProbe::default();
        let results = check_liveness(
            &probe,
            [
                "https://host/csv/23100274-eng.zip",
                "https://host/csv/404-eng.zip",
                "https://host/csv/500.zip",
                "https://host/csv/readme.txt.bak",
            ],
            4,
        )
        .await;

        assert_eq!(results.len(), 4);
        assert!(results["https://host/csv/23100274-eng.zip"].is_live());
        assert_eq!(results["https://host/csv/404-eng.zip"], Liveness::Gone { status: 404 });
        assert!(matches!(results["https://host/csv/500.zip"], Liveness::Unreachable { .. }));
        assert!(matches!(results["https://host/csv/readme.txt.bak"], Liveness::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_worker_bound() {
        let probe = FakeProbe::default();
        let locators: Vec<String> = (1..=12).map(|i| format!("https://host/csv/{}.zip", i)).collect();
        let results = check_liveness(&probe, locators, 3).await;

        assert_eq!(results.len(), 12);
        assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_value(Liveness::Gone { status: 410 }).unwrap();
        assert_eq!(json["state"], "gone");
        assert_eq!(json["status"], 410);
        assert_eq!(serde_json::to_value(Liveness::Live).unwrap()["state"], "live");
    }
}
