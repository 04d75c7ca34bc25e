use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use clientbook_clients::{Client, ClientUpdate, Contact, NewClient, NewContact};
use clientbook_core::{ClientId, ContactId, DomainError, Entity, ExpectedVersion, RowVersion, Versioned};

use super::r#trait::{RecordStore, StoreError, StoreSession};

#[derive(Debug, Clone)]
struct ClientRow {
    /// Scalar fields only; `contacts` is always empty here.
    client: Client,
    version: RowVersion,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    clients: BTreeMap<ClientId, ClientRow>,
    contacts: BTreeMap<ContactId, Contact>,
}

#[derive(Debug, Clone)]
enum Op {
    InsertClient(Client),
    InsertContact(Contact),
    ReplaceClient(ClientUpdate),
    DeleteContactsByClient(ClientId),
    DeleteClient(ClientId),
}

impl Tables {
    fn version_of(&self, id: ClientId) -> Option<RowVersion> {
        self.clients.get(&id).map(|row| row.version)
    }

    fn contacts_of(&self, id: ClientId) -> Vec<Contact> {
        self.contacts
            .values()
            .filter(|c| c.client_id == id)
            .cloned()
            .collect()
    }

    fn assemble(&self, row: &ClientRow) -> Client {
        let mut client = row.client.clone();
        client.contacts = self.contacts_of(client.id);
        client
    }

    fn all_clients(&self) -> Vec<Client> {
        let mut by_client: BTreeMap<ClientId, Vec<Contact>> = BTreeMap::new();
        for contact in self.contacts.values() {
            by_client
                .entry(contact.client_id)
                .or_default()
                .push(contact.clone());
        }

        self.clients
            .values()
            .map(|row| {
                let mut client = row.client.clone();
                client.contacts = by_client.remove(&client.id).unwrap_or_default();
                client
            })
            .collect()
    }

    /// Apply an already-checked operation. Used for both the session working
    /// copy and the commit replay, so both views evolve identically.
    fn apply(&mut self, op: &Op) {
        match op {
            Op::InsertClient(client) => {
                self.clients.insert(
                    client.id(),
                    ClientRow {
                        client: client.clone(),
                        version: RowVersion::INITIAL,
                    },
                );
            }
            Op::InsertContact(contact) => {
                self.contacts.insert(contact.id(), contact.clone());
            }
            Op::ReplaceClient(update) => {
                if let Some(row) = self.clients.get_mut(&update.id) {
                    row.client.apply_update(update);
                }
            }
            Op::DeleteContactsByClient(id) => {
                self.contacts.retain(|_, c| c.client_id != *id);
            }
            Op::DeleteClient(id) => {
                self.clients.remove(id);
            }
        }
    }
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    next_client_id: AtomicI64,
    next_contact_id: AtomicI64,
}

impl Shared {
    fn snapshot(&self) -> Result<Tables, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tables.clone())
    }
}

/// In-memory record store.
///
/// Intended for tests/dev. Not optimized for performance: every session works
/// on a private copy of the tables.
#[derive(Debug, Clone)]
pub struct InMemoryRecordStore {
    shared: Arc<Shared>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                next_client_id: AtomicI64::new(1),
                next_contact_id: AtomicI64::new(1),
            }),
        }
    }

    /// Number of stored contacts across all clients.
    pub fn contact_count(&self) -> Result<usize, StoreError> {
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tables.contacts.len())
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(InMemorySession {
            working: self.shared.snapshot()?,
            shared: self.shared.clone(),
            log: Vec::new(),
            base_versions: BTreeMap::new(),
            created: BTreeSet::new(),
        }))
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tables.clients.get(&id).map(|row| tables.assemble(row)))
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tables.all_clients())
    }
}

/// Unit of work over a private snapshot.
///
/// Records the version each pre-existing client had when this session first
/// touched it; `commit` refuses to publish if any of those rows moved since.
struct InMemorySession {
    shared: Arc<Shared>,
    working: Tables,
    log: Vec<Op>,
    base_versions: BTreeMap<ClientId, Option<RowVersion>>,
    created: BTreeSet<ClientId>,
}

impl InMemorySession {
    fn touch(&mut self, id: ClientId) {
        if self.created.contains(&id) {
            return;
        }
        let version = self.working.version_of(id);
        self.base_versions.entry(id).or_insert(version);
    }

    fn record(&mut self, op: Op) {
        self.working.apply(&op);
        self.log.push(op);
    }

    fn require_client(&self, id: ClientId, expected: ExpectedVersion) -> Result<(), StoreError> {
        let version = self.working.version_of(id).ok_or(StoreError::NotFound)?;
        expected.check(version)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreSession for InMemorySession {
    async fn insert_client(&mut self, client: NewClient) -> Result<ClientId, StoreError> {
        let id = ClientId::new(self.shared.next_client_id.fetch_add(1, Ordering::SeqCst));
        self.created.insert(id);
        self.record(Op::InsertClient(client.into_client(id)));
        Ok(id)
    }

    async fn insert_contact(&mut self, contact: NewContact) -> Result<ContactId, StoreError> {
        let client_id = contact.client_id;
        self.touch(client_id);
        if self.working.version_of(client_id).is_none() {
            return Err(DomainError::referential(format!(
                "contact references unknown client {client_id}"
            ))
            .into());
        }

        let id = ContactId::new(self.shared.next_contact_id.fetch_add(1, Ordering::SeqCst));
        self.record(Op::InsertContact(contact.into_contact(id)));
        Ok(id)
    }

    async fn get_client(&mut self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError> {
        self.touch(id);
        Ok(self
            .working
            .clients
            .get(&id)
            .map(|row| Versioned::new(self.working.assemble(row), row.version)))
    }

    async fn replace_client(
        &mut self,
        update: ClientUpdate,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.touch(update.id);
        self.require_client(update.id, expected)?;
        self.record(Op::ReplaceClient(update));
        Ok(())
    }

    async fn delete_contacts_by_client(&mut self, id: ClientId) -> Result<u64, StoreError> {
        self.touch(id);
        let removed = self.working.contacts_of(id).len() as u64;
        if removed > 0 {
            self.record(Op::DeleteContactsByClient(id));
        }
        Ok(removed)
    }

    async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> Result<(), StoreError> {
        self.touch(id);
        self.require_client(id, expected)?;
        let remaining = self.working.contacts_of(id).len();
        if remaining > 0 {
            return Err(DomainError::referential(format!(
                "client {id} still owns {remaining} contact(s)"
            ))
            .into());
        }
        self.record(Op::DeleteClient(id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut live = self
            .shared
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        for (id, base) in &self.base_versions {
            let current = live.version_of(*id);
            if current != *base {
                return Err(StoreError::Conflict(format!(
                    "client {id} changed concurrently (expected {base:?}, found {current:?})"
                )));
            }
        }

        for op in &self.log {
            live.apply(op);
        }

        // Every pre-existing client this session wrote through moves to a new version.
        let written: BTreeSet<ClientId> = self
            .log
            .iter()
            .filter_map(|op| match op {
                Op::InsertContact(c) => Some(c.client_id),
                Op::ReplaceClient(u) => Some(u.id),
                Op::DeleteContactsByClient(id) => Some(*id),
                Op::InsertClient(_) | Op::DeleteClient(_) => None,
            })
            .filter(|id| !self.created.contains(id))
            .collect();
        for id in written {
            if let Some(row) = live.clients.get_mut(&id) {
                row.version = row.version.next();
            }
        }

        Ok(())
    }
}
