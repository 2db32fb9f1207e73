//! The registry: a hierarchical small-value store with a grpc surface,
//! doubling as a transparent reverse proxy for controller RPCs.

pub mod paths;
pub mod proxy;
pub mod service;
pub mod store;
