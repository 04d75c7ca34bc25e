//! Infrastructure layer: record storage and the client service that drives it.

pub mod client_service;
pub mod record_store;

pub use client_service::{ClientService, ClientSummary, ServiceError};
pub use record_store::{InMemoryRecordStore, PostgresRecordStore, RecordStore, StoreError, StoreSession};
