//! Backend RPC fabric for the clipstream fleet.
//!
//! One logical client per backend service name, with the live endpoint set
//! for each name kept in sync with the service registry. Callers issue named
//! operations and never see discovery, endpoint selection, or transport.

pub mod pool;
pub mod resolver;

pub use pool::{ClientPool, RpcError, ServiceClient};
pub use resolver::{EndpointSet, RegistryClient, RegistryError};
