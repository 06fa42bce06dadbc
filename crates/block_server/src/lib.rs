//! Content-addressed block storage service.
//!
//! Bytes arrive as a gRPC stream, are segmented into blocks by a delimiter
//! policy, and are persisted to an object store under keys derived from
//! their SHA-256 hash. Reads go through a byte-capacity read-through cache.

pub mod cache;
pub mod config;
pub mod local_store;
pub mod segment;
pub mod service;
pub mod tracing;

pub use cache::BlockCache;
pub use config::Config;
pub use service::BlockServer;
