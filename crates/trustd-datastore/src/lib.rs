//! # trustd-datastore
//!
//! Authoritative persistence layer for the trustd identity-issuing system.
//!
//! This crate is responsible for:
//! - CRUD and listing over trust bundles, registered entries, attested
//!   nodes, selectors, DNS names, join tokens, and federated trust domains
//! - The node re-attestation and CA authority rotation protocols
//! - The append-only event log replicas poll for cache invalidation
//! - The persisted schema version gate
//!
//! Every mutating operation runs as one storage batch that also carries its
//! event-log row, so an event is durable exactly when its mutation is.

#![warn(clippy::all)]

pub mod errors;
pub mod service;
pub mod traits;
pub mod types;

pub use errors::{DataStoreError, Result};
pub use service::DataStoreService;
pub use traits::DataStore;
pub use types::*;
