//! The service-client pool: one logical RPC client per backend service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resolver::{spawn_watch, EndpointSet, RegistryClient, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The service has no resolvable endpoints, or was never registered
    /// with the pool.
    #[error("{service} service unavailable")]
    Unavailable { service: String },

    #[error("{operation} call to {service} timed out")]
    DeadlineExceeded { service: String, operation: String },

    #[error("transport error calling {service}: {source}")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered, but with a business-level failure.
    #[error("{message}")]
    Business { status_code: i32, message: String },

    #[error("failed to decode {service} reply: {source}")]
    Decode {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The nested reply envelope every backend operation answers with. A
/// non-zero `status_code` is a business failure, distinct from transport
/// errors.
#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    status_code: i32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<Value>,
}

/// A logical callable endpoint for one backend service.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    service: String,
    http: reqwest::Client,
    endpoints: Arc<EndpointSet>,
}

impl ServiceClient {
    pub fn new(
        service: impl Into<String>,
        http: reqwest::Client,
        endpoints: Arc<EndpointSet>,
    ) -> Self {
        Self {
            service: service.into(),
            http,
            endpoints,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Issue one named operation with a per-call deadline.
    ///
    /// The request posts as JSON to `/rpc/{operation}` on the next endpoint
    /// in round-robin order; the decoded `data` of a successful reply is
    /// returned.
    pub async fn call<Req, Resp>(
        &self,
        operation: &str,
        request: &Req,
        deadline: Duration,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let endpoint = self.endpoints.next().ok_or_else(|| RpcError::Unavailable {
            service: self.service.clone(),
        })?;
        let url = format!("http://{endpoint}/rpc/{operation}");

        let response = self
            .http
            .post(&url)
            .timeout(deadline)
            .json(request)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    RpcError::DeadlineExceeded {
                        service: self.service.clone(),
                        operation: operation.to_string(),
                    }
                } else {
                    RpcError::Transport {
                        service: self.service.clone(),
                        source,
                    }
                }
            })?;

        let body = response.bytes().await.map_err(|source| RpcError::Transport {
            service: self.service.clone(),
            source,
        })?;
        let reply: ReplyEnvelope =
            serde_json::from_slice(&body).map_err(|source| RpcError::Decode {
                service: self.service.clone(),
                source,
            })?;

        if reply.status_code != 0 {
            return Err(RpcError::Business {
                status_code: reply.status_code,
                message: reply.msg,
            });
        }

        serde_json::from_value(reply.data.unwrap_or(Value::Null)).map_err(|source| {
            RpcError::Decode {
                service: self.service.clone(),
                source,
            }
        })
    }
}

/// One client per backend service name, constructed once at startup.
/// Cloning is cheap; all clones share the clients and the watch tasks.
#[derive(Clone)]
pub struct ClientPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    clients: HashMap<String, ServiceClient>,
    watchers: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}

impl ClientPool {
    /// Resolve every service through the registry and keep each endpoint set
    /// live with one watch task.
    ///
    /// Fails when the registry itself is unreachable. A service that resolves
    /// to an empty endpoint set is not fatal here; it surfaces per call as
    /// `RpcError::Unavailable`.
    pub async fn connect(
        registry_endpoints: Vec<String>,
        services: &[&str],
    ) -> Result<Self, RpcError> {
        let http = reqwest::Client::new();
        let registry = RegistryClient::new(registry_endpoints, http.clone());

        let mut clients = HashMap::new();
        let mut watchers = Vec::new();
        for &service in services {
            let (index, endpoints) = registry.fetch(service).await?;
            tracing::info!(service, count = endpoints.len(), "resolved service endpoints");
            let set = Arc::new(EndpointSet::new(endpoints));
            watchers.push(spawn_watch(
                registry.clone(),
                service.to_string(),
                set.clone(),
                index,
            ));
            clients.insert(
                service.to_string(),
                ServiceClient::new(service, http.clone(), set),
            );
        }

        Ok(Self {
            inner: Arc::new(PoolInner { clients, watchers }),
        })
    }

    /// Build a pool over fixed endpoint sets, with no registry behind it.
    /// Used by tests and static single-node deployments.
    pub fn with_static(endpoints: HashMap<String, Vec<String>>) -> Self {
        let http = reqwest::Client::new();
        let clients = endpoints
            .into_iter()
            .map(|(service, eps)| {
                let client =
                    ServiceClient::new(service.clone(), http.clone(), Arc::new(EndpointSet::new(eps)));
                (service, client)
            })
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                clients,
                watchers: Vec::new(),
            }),
        }
    }

    /// Look up the client for `service`.
    pub fn client(&self, service: &str) -> Result<&ServiceClient, RpcError> {
        self.inner
            .clients
            .get(service)
            .ok_or_else(|| RpcError::Unavailable {
                service: service.to_string(),
            })
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.inner.clients.keys().map(String::as_str)
    }
}
