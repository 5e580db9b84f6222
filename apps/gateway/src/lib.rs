pub mod config;
pub mod error;
pub mod hub;
pub mod middleware;
pub mod pagination;
pub mod response;
pub mod routes;

use std::sync::Arc;

use clipstream_rpc::ClientPool;

use config::Config;
use hub::Hub;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub clients: ClientPool,
    pub hub: Hub,
}
