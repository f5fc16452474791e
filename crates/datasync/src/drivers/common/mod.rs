//! Utilities shared across database drivers.
//!
//! - [`tls`]: rustls setup for PostgreSQL connections

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
