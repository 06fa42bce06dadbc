//! Object storage capability layer for the river block tier.
//!
//! The [`ObjectClient`] trait is the capability set block storage needs from
//! a blob store: existence checks, ranged readers, writes, deletion, and a
//! per-vendor classification of errors as retryable / not-found. Backends
//! exist for Amazon S3, Google Cloud Storage, Azure Blob, and a local
//! filesystem mode used when no object-store tier is configured.
//!
//! Vendor credentials are loaded once per process from fixed secret files;
//! see [`secrets`]. There is no rotation.

mod client;
mod error;

pub mod backends;
pub mod registry;
pub mod retry;
pub mod secrets;

pub use backends::azure::MicrosoftClient;
pub use backends::gcs::GoogleClient;
pub use backends::local::LocalClient;
pub use backends::s3::AmazonClient;
pub use client::{read_all, ByteStream, ObjectClient};
pub use error::{ObjectError, ObjectResult};
pub use retry::{retry_notify, RetryConfig};
