//! # trustd-storage
//!
//! Storage abstraction layer for the trustd datastore.
//!
//! This crate provides the transactional key-value interface the datastore
//! core is programmed against, plus two implementations: RocksDB for
//! deployments and an in-memory backend for tests and development.

#![warn(clippy::all)]

pub mod column_families;
pub mod errors;
pub mod memory;
pub mod rocksdb_impl;
pub mod traits;

pub use column_families::*;
pub use errors::{Result, StorageError};
pub use memory::MemoryStorage;
pub use rocksdb_impl::RocksDbStorage;
pub use traits::{Batch, BatchExt, Storage};
