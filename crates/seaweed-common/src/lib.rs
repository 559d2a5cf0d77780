//! Common types for the Seaweed operator: CRDs, errors, labels and utilities

#![deny(missing_docs)]

pub mod backoff;
pub mod crd;
pub mod error;
pub mod labels;
pub mod telemetry;

pub use error::{Error, StoreError};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager / reporting component name used for every write
pub const FIELD_MANAGER: &str = "seaweed-operator";

/// HTTP port served by each master replica
pub const MASTER_HTTP_PORT: i32 = 9333;

/// gRPC port served by each master replica (HTTP port + 10000)
pub const MASTER_GRPC_PORT: i32 = 19333;
