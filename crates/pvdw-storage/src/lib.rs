//! Warehouse connection, statement registry and staging transports for PVDW.

mod sql;

pub mod registry;
pub mod staging;
pub mod warehouse;

pub use registry::{DispatchError, StatementRegistry};
pub use staging::{
    CopyFormat, LoadReport, LoadedFile, LocalCopyTransport, ObjectStoreCredentials,
    S3CopyTransport, StagingLoader, StagingTransport,
};
pub use warehouse::{bulk_insert, LoadError, Warehouse, WarehouseConfig, INSERT_CHUNK_ROWS};

pub const CRATE_NAME: &str = "pvdw-storage";
