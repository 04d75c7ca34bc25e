//! Client/contact record storage boundary.
//!
//! Reads go straight to the store and see a consistent snapshot. Writes go
//! through a [`StoreSession`]: nothing a session does is visible to anyone
//! else until `commit`, and dropping a session discards its writes.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use r#trait::{RecordStore, StoreError, StoreSession};
