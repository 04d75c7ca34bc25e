use std::sync::Arc;

use thiserror::Error;

use clientbook_clients::{Client, ClientUpdate, NewClient, NewContact};
use clientbook_core::{ClientId, ContactId, DomainError, ExpectedVersion, Versioned};

/// Record store operation error.
///
/// These are **storage errors** (missing rows, referential integrity,
/// concurrency, backend failures) as opposed to payload validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("referential integrity violation: {0}")]
    Referential(String),

    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Referential(msg) => StoreError::Referential(msg),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::InvalidId(msg) => StoreError::Backend(msg),
        }
    }
}

/// Durable keyed storage for clients and their contacts.
///
/// ## Read Semantics
///
/// - `get_client` / `list_clients` always return clients with their contacts attached
/// - reads never wait for an open session and never observe a partially applied one
/// - `list_clients` returns clients in insertion (id) order
///
/// ## Write Semantics
///
/// All writes go through a session obtained from `begin()`. A session is a
/// unit of work: `commit()` publishes every write atomically or fails with
/// `StoreError::Conflict` when another session changed a client this session
/// touched. Dropping a session without committing releases it and discards
/// its writes.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a write session.
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError>;

    /// Load one client with its contacts.
    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError>;

    /// Load every client with its contacts.
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;
}

/// A scoped write session against a [`RecordStore`].
#[async_trait::async_trait]
pub trait StoreSession: Send {
    /// Persist a new client and return its freshly assigned id.
    async fn insert_client(&mut self, client: NewClient) -> Result<ClientId, StoreError>;

    /// Persist a new contact. Fails with `Referential` unless `client_id` is a live client.
    async fn insert_contact(&mut self, contact: NewContact) -> Result<ContactId, StoreError>;

    /// Read a client (as seen by this session) together with its row version.
    async fn get_client(&mut self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError>;

    /// Overwrite the mutable scalar fields of an existing client.
    async fn replace_client(
        &mut self,
        update: ClientUpdate,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Remove every contact owned by a client; returns how many were removed.
    async fn delete_contacts_by_client(&mut self, id: ClientId) -> Result<u64, StoreError>;

    /// Remove a client. Its contacts must already be gone.
    async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Publish every write made through this session.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        (**self).begin().await
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        (**self).get_client(id).await
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        (**self).list_clients().await
    }
}
