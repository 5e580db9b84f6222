use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Base URLs of the service registry (comma-separated in the environment).
    pub registry_endpoints: Vec<String>,
    /// Per-call deadline for backend RPCs.
    pub rpc_timeout: Duration,
    /// How long graceful shutdown waits for the hub to drain.
    pub shutdown_timeout: Duration,
    /// Capacity of each connection's outbound frame queue.
    pub send_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 8080),
            registry_endpoints: required_var("REGISTRY_ENDPOINTS")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rpc_timeout: Duration::from_millis(env_or("RPC_TIMEOUT_MS", 5_000)),
            shutdown_timeout: Duration::from_millis(env_or("SHUTDOWN_TIMEOUT_MS", 5_000)),
            send_queue_capacity: env_or("SEND_QUEUE_CAPACITY", 64),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
