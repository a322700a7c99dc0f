//! Remote API gateway: transport seam, board client, payload translation.
//!
//! - `transport` - the `Transport` trait, `HttpTransport` (ureq), wire types
//! - `client` - `BoardClient` with retry/backoff and idempotent deletes
//! - `items` - pure translation of nodes/edges into wire payloads

pub mod client;
pub mod items;
pub mod transport;

pub use client::{BULK_BATCH_SIZE, BoardClient, RetryPolicy};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, RemoteError, Transport};
