//! Endpoint resolution: the per-service endpoint set and the registry watch
//! that keeps it current.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

/// How long the watch task sleeps after a failed registry round-trip.
const WATCH_BACKOFF: Duration = Duration::from_secs(3);

/// Pause before re-polling when the registry answers a watch without a
/// change. A long-polling registry blocks instead; this only guards against
/// ones that return early.
const UNCHANGED_POLL_DELAY: Duration = Duration::from_millis(500);

/// The live endpoint set for one service name.
///
/// Replaced wholesale by the watch task; read on every call. The cursor
/// round-robins so every live endpoint receives traffic.
#[derive(Debug)]
pub struct EndpointSet {
    endpoints: RwLock<Vec<String>>,
    cursor: AtomicUsize,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints: RwLock::new(endpoints),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Swap in a new endpoint set. Takes effect on subsequent picks.
    pub fn replace(&self, endpoints: Vec<String>) {
        *self.endpoints.write() = endpoints;
    }

    /// Pick the next endpoint round-robin. `None` when the set is empty.
    pub fn next(&self) -> Option<String> {
        let endpoints = self.endpoints.read();
        if endpoints.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Some(endpoints[i].clone())
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no registry endpoints configured")]
    NoEndpoints,
    #[error("registry unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
}

/// One service record as the registry serves it. The index is a change
/// counter used to resume the watch.
#[derive(Debug, Deserialize)]
struct ServiceRecord {
    index: u64,
    endpoints: Vec<String>,
}

/// Client for the key/value service registry.
///
/// Supports a one-shot fetch and a blocking (long-poll) watch keyed by the
/// last seen index: `GET {base}/v1/services/{name}?wait_index={index}`
/// returns when the endpoint set changes or the registry's own poll window
/// elapses unchanged.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
}

impl RegistryClient {
    pub fn new(endpoints: Vec<String>, http: reqwest::Client) -> Self {
        Self { http, endpoints }
    }

    /// Fetch the current endpoint set for `service`.
    pub async fn fetch(&self, service: &str) -> Result<(u64, Vec<String>), RegistryError> {
        self.get(service, None).await
    }

    /// Block until the endpoint set for `service` moves past `index`, or the
    /// registry answers unchanged after its poll window.
    pub async fn watch(&self, service: &str, index: u64) -> Result<(u64, Vec<String>), RegistryError> {
        self.get(service, Some(index)).await
    }

    /// Tries each registry endpoint in order; the first reachable one wins.
    async fn get(
        &self,
        service: &str,
        wait_index: Option<u64>,
    ) -> Result<(u64, Vec<String>), RegistryError> {
        let mut last_err = None;
        for base in &self.endpoints {
            let mut url = format!("{}/v1/services/{}", base.trim_end_matches('/'), service);
            if let Some(index) = wait_index {
                url.push_str(&format!("?wait_index={index}"));
            }
            let result = async {
                let response = self.http.get(&url).send().await?.error_for_status()?;
                response.json::<ServiceRecord>().await
            }
            .await;
            match result {
                Ok(record) => return Ok((record.index, record.endpoints)),
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) => Err(RegistryError::Unreachable(err)),
            None => Err(RegistryError::NoEndpoints),
        }
    }
}

/// Keep `set` synchronised with the registry's view of `service`.
pub fn spawn_watch(
    registry: RegistryClient,
    service: String,
    set: Arc<EndpointSet>,
    mut index: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match registry.watch(&service, index).await {
                Ok((next_index, endpoints)) => {
                    if next_index == index {
                        tokio::time::sleep(UNCHANGED_POLL_DELAY).await;
                        continue;
                    }
                    tracing::debug!(
                        service = %service,
                        count = endpoints.len(),
                        "endpoint set updated"
                    );
                    set.replace(endpoints);
                    index = next_index;
                }
                Err(err) => {
                    tracing::warn!(service = %service, error = %err, "registry watch failed");
                    tokio::time::sleep(WATCH_BACKOFF).await;
                }
            }
        }
    })
}
