//! Client use cases (application-level orchestration).
//!
//! Every write is a single store session:
//!
//! ```text
//! draft
//!   ↓
//! 1. Validate (pure, before any session is opened)
//!   ↓
//! 2. Open session
//!   ↓
//! 3. Write client row, then contacts (explicit cascade, no ON DELETE CASCADE)
//!   ↓
//! 4. Commit (dropping the session on any earlier error discards everything)
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use clientbook_clients::{Client, ClientDraft, ValidationFailure, validate};
use clientbook_core::ClientId;

use crate::record_store::{RecordStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The payload broke a validation rule; nothing was written.
    #[error("{0}")]
    Validation(ValidationFailure),

    #[error("client not found")]
    NotFound,

    /// Path id and payload id disagree (an absent payload id disagrees too).
    #[error("path id {path} does not match payload id {body:?}")]
    IdentifierMismatch { path: ClientId, body: Option<ClientId> },

    #[error("referential integrity violation: {0}")]
    Referential(String),

    /// Lost an optimistic concurrency race; safe to retry from a fresh read.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Store(String),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Referential(msg) => ServiceError::Referential(msg),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Backend(msg) => ServiceError::Store(msg),
        }
    }
}

impl From<ValidationFailure> for ServiceError {
    fn from(value: ValidationFailure) -> Self {
        ServiceError::Validation(value)
    }
}

/// Aggregate figures for the confidential report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub total_clients: usize,
    pub total_contacts: usize,
    pub new_clients_last_30_days: usize,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Create/read/update/delete for clients and their contacts.
pub struct ClientService<S> {
    store: S,
    clock: Clock,
}

impl<S: Clone> Clone for ClientService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S> fmt::Debug for ClientService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientService").finish_non_exhaustive()
    }
}

impl<S: RecordStore> ClientService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used to stamp `created_at`.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, draft), fields(client_id), err(Display))]
    pub async fn create_client(&self, draft: ClientDraft) -> Result<Client, ServiceError> {
        validate(&draft)?;

        let mut session = self.store.begin().await?;
        let id = session.insert_client(draft.to_new_client(self.now())).await?;
        for contact in draft.new_contacts(id) {
            session.insert_contact(contact).await?;
        }
        let created = session
            .get_client(id)
            .await?
            .ok_or(ServiceError::NotFound)?
            .into_inner();
        session.commit().await?;

        tracing::Span::current().record("client_id", id.get());
        tracing::info!(contacts = created.contacts.len(), "client created");
        Ok(created)
    }

    #[instrument(skip(self), fields(client_id = %id), err(Display))]
    pub async fn get_client(&self, id: ClientId) -> Result<Client, ServiceError> {
        self.store.get_client(id).await?.ok_or(ServiceError::NotFound)
    }

    #[instrument(skip(self), err(Display))]
    pub async fn list_clients(&self) -> Result<Vec<Client>, ServiceError> {
        Ok(self.store.list_clients().await?)
    }

    /// Overwrite a client's fields and replace its contacts with the submitted set.
    ///
    /// Contacts are replaced wholesale: omitting `contacts` removes them all.
    #[instrument(skip(self, draft), fields(client_id = %id), err(Display))]
    pub async fn update_client(&self, id: ClientId, draft: ClientDraft) -> Result<(), ServiceError> {
        if draft.id != Some(id) {
            return Err(ServiceError::IdentifierMismatch {
                path: id,
                body: draft.id,
            });
        }
        validate(&draft)?;

        let mut session = self.store.begin().await?;
        let current = session.get_client(id).await?.ok_or(ServiceError::NotFound)?;

        session
            .replace_client(draft.to_update(id), current.expected())
            .await
            .inspect_err(|e| warn_on_conflict(e, id))?;
        let removed = session.delete_contacts_by_client(id).await?;
        let contacts = draft.new_contacts(id);
        let inserted = contacts.len();
        for contact in contacts {
            session.insert_contact(contact).await?;
        }
        session.commit().await.inspect_err(|e| warn_on_conflict(e, id))?;

        tracing::info!(removed, inserted, "client updated");
        Ok(())
    }

    /// Delete a client together with all of its contacts.
    #[instrument(skip(self), fields(client_id = %id), err(Display))]
    pub async fn delete_client(&self, id: ClientId) -> Result<(), ServiceError> {
        let mut session = self.store.begin().await?;
        let current = session.get_client(id).await?.ok_or(ServiceError::NotFound)?;

        let removed = session.delete_contacts_by_client(id).await?;
        session
            .delete_client(id, current.expected())
            .await
            .inspect_err(|e| warn_on_conflict(e, id))?;
        session.commit().await.inspect_err(|e| warn_on_conflict(e, id))?;

        tracing::info!(removed_contacts = removed, "client deleted");
        Ok(())
    }

    /// Totals as of `now`; "new" means created within the 30 days before `now`.
    #[instrument(skip(self), err(Display))]
    pub async fn summary(&self, now: DateTime<Utc>) -> Result<ClientSummary, ServiceError> {
        let clients = self.store.list_clients().await?;
        let since = now - Duration::days(30);

        Ok(ClientSummary {
            total_clients: clients.len(),
            total_contacts: clients.iter().map(|c| c.contacts.len()).sum(),
            new_clients_last_30_days: clients
                .iter()
                .filter(|c| c.created_at > since && c.created_at <= now)
                .count(),
        })
    }

    /// Current time according to this service's clock (also the report's `now`).
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn warn_on_conflict(err: &StoreError, id: ClientId) {
    if let StoreError::Conflict(msg) = err {
        tracing::warn!(client_id = %id, reason = %msg, "concurrent write rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clientbook_clients::{ClientUpdate, ContactDraft, NewClient, NewContact, ValidationRule};
    use clientbook_core::{ContactId, ExpectedVersion, Versioned};

    use crate::record_store::{InMemoryRecordStore, StoreSession};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn service() -> ClientService<InMemoryRecordStore> {
        ClientService::new(InMemoryRecordStore::new()).with_clock(t0)
    }

    fn contact(name: &str) -> ContactDraft {
        ContactDraft {
            name: name.to_string(),
            phone: Some("1234-5678".to_string()),
            email: Some(format!("{}@acme.com", name.to_lowercase())),
            ..Default::default()
        }
    }

    fn acme(contacts: Vec<ContactDraft>) -> ClientDraft {
        ClientDraft {
            name: "Acme".to_string(),
            tax_id: "NIT1".to_string(),
            primary_phone: "5555-5555".to_string(),
            email: "a@acme.com".to_string(),
            contacts: Some(contacts),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_stamps_creation_time() {
        let svc = service();
        let created = svc.create_client(acme(vec![contact("Jane")])).await.unwrap();

        assert_eq!(created.id, ClientId::new(1));
        assert_eq!(created.created_at, t0());
        assert_eq!(created.contacts.len(), 1);
        assert_eq!(created.contacts[0].client_id, created.id);
        assert_eq!(created.contacts[0].name, "Jane");

        let fetched = svc.get_client(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn ids_increase_across_creates() {
        let svc = service();
        let a = svc.create_client(acme(vec![])).await.unwrap();
        let b = svc.create_client(acme(vec![])).await.unwrap();
        assert!(b.id > a.id);

        let listed: Vec<_> = svc.list_clients().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(listed, [a.id, b.id]);
    }

    #[tokio::test]
    async fn absent_contacts_create_an_empty_list() {
        let svc = service();
        let mut draft = acme(vec![]);
        draft.contacts = None;
        let created = svc.create_client(draft).await.unwrap();
        assert!(created.contacts.is_empty());
    }

    #[tokio::test]
    async fn invalid_create_leaves_store_unchanged() {
        let svc = service();
        let mut draft = acme(vec![contact("Jane")]);
        draft.name = String::new();

        let err = svc.create_client(draft).await.unwrap_err();
        match err {
            ServiceError::Validation(f) => {
                assert_eq!(f.rule, ValidationRule::MissingRequiredField);
                assert_eq!(f.field, "name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(svc.list_clients().await.unwrap().is_empty());
        assert_eq!(svc.store().contact_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn update_replaces_fields_and_contacts_wholesale() {
        let svc = service();
        let created = svc
            .create_client(acme(vec![contact("Jane"), contact("John")]))
            .await
            .unwrap();

        let mut draft = acme(vec![contact("Zoe")]);
        draft.id = Some(created.id);
        draft.name = "Acme Holdings".to_string();
        draft.country = "GT".to_string();
        svc.update_client(created.id, draft).await.unwrap();

        let fetched = svc.get_client(created.id).await.unwrap();
        assert_eq!(fetched.name, "Acme Holdings");
        assert_eq!(fetched.country, "GT");
        assert_eq!(fetched.created_at, created.created_at);
        let names: Vec<_> = fetched.contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Zoe"]);
        assert_eq!(svc.store().contact_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn updated_values_read_back_exactly_as_submitted() {
        let svc = service();
        let created = svc
            .create_client(ClientDraft {
                address: "Zona 10".to_string(),
                country: "GT".to_string(),
                ..acme(vec![contact("Jane")])
            })
            .await
            .unwrap();

        let submitted = ClientDraft {
            id: Some(created.id),
            name: "  Acme Holdings ".to_string(),
            address: String::new(),
            country: String::new(),
            contacts: Some(vec![ContactDraft {
                name: "Zoe".to_string(),
                role: Some(String::new()),
                phone: None,
                email: Some("zoe@acme.com".to_string()),
                ..Default::default()
            }]),
            ..acme(vec![])
        };
        svc.update_client(created.id, submitted.clone()).await.unwrap();

        let fetched = svc.get_client(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, submitted.name);
        assert_eq!(fetched.address, submitted.address);
        assert_eq!(fetched.country, submitted.country);
        assert_eq!(fetched.tax_id, submitted.tax_id);
        assert_eq!(fetched.primary_phone, submitted.primary_phone);
        assert_eq!(fetched.email, submitted.email);

        let sent = submitted.contacts.unwrap_or_default();
        assert_eq!(fetched.contacts.len(), sent.len());
        for (got, want) in fetched.contacts.iter().zip(&sent) {
            assert_eq!(got.name, want.name);
            assert_eq!(got.role, want.role);
            assert_eq!(got.phone, want.phone);
            assert_eq!(got.email, want.email);
        }
    }

    #[tokio::test]
    async fn update_without_contacts_field_removes_all_contacts() {
        let svc = service();
        let created = svc.create_client(acme(vec![contact("Jane")])).await.unwrap();

        let mut draft = acme(vec![]);
        draft.id = Some(created.id);
        draft.contacts = None;
        svc.update_client(created.id, draft).await.unwrap();

        assert!(svc.get_client(created.id).await.unwrap().contacts.is_empty());
    }

    #[tokio::test]
    async fn update_with_mismatched_or_missing_id_is_rejected() {
        let svc = service();
        let created = svc.create_client(acme(vec![])).await.unwrap();

        let mut draft = acme(vec![]);
        draft.id = Some(ClientId::new(42));
        assert_eq!(
            svc.update_client(created.id, draft.clone()).await,
            Err(ServiceError::IdentifierMismatch {
                path: created.id,
                body: Some(ClientId::new(42)),
            })
        );

        draft.id = None;
        assert!(matches!(
            svc.update_client(created.id, draft).await,
            Err(ServiceError::IdentifierMismatch { body: None, .. })
        ));
    }

    #[tokio::test]
    async fn invalid_update_keeps_previous_state() {
        let svc = service();
        let created = svc.create_client(acme(vec![contact("Jane")])).await.unwrap();

        let mut draft = acme(vec![contact("Zoe"), ContactDraft::default()]);
        draft.id = Some(created.id);
        let err = svc.update_client(created.id, draft).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref f) if f.contact_position == Some(2)));

        assert_eq!(svc.get_client(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_client_report_not_found() {
        let svc = service();
        let id = ClientId::new(7);
        let mut draft = acme(vec![]);
        draft.id = Some(id);

        assert_eq!(svc.update_client(id, draft).await, Err(ServiceError::NotFound));
        assert_eq!(svc.delete_client(id).await, Err(ServiceError::NotFound));
        assert_eq!(svc.get_client(id).await, Err(ServiceError::NotFound));
    }

    #[tokio::test]
    async fn delete_removes_client_and_its_contacts_only() {
        let svc = service();
        let doomed = svc.create_client(acme(vec![contact("Jane")])).await.unwrap();
        let kept = svc.create_client(acme(vec![contact("Zoe")])).await.unwrap();

        svc.delete_client(doomed.id).await.unwrap();

        assert_eq!(svc.get_client(doomed.id).await, Err(ServiceError::NotFound));
        assert_eq!(svc.get_client(kept.id).await.unwrap().contacts.len(), 1);
        assert_eq!(svc.store().contact_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn summary_counts_recent_clients() {
        let store = InMemoryRecordStore::new();
        let old = ClientService::new(store.clone()).with_clock(|| t0() - Duration::days(45));
        old.create_client(acme(vec![contact("Jane")])).await.unwrap();

        let svc = ClientService::new(store).with_clock(t0);
        svc.create_client(acme(vec![contact("Zoe"), contact("Ann")]))
            .await
            .unwrap();

        let summary = svc.summary(t0()).await.unwrap();
        assert_eq!(
            summary,
            ClientSummary {
                total_clients: 2,
                total_contacts: 3,
                new_clients_last_30_days: 1,
            }
        );
    }

    #[test]
    fn now_follows_the_injected_clock() {
        assert_eq!(service().now(), t0());

        let later = service().with_clock(|| t0() + Duration::days(1));
        assert_eq!(later.now(), t0() + Duration::days(1));
    }

    /// Store whose sessions lose every race: right before a session commits,
    /// a rival session renames the last client it read and commits first.
    #[derive(Clone, Default)]
    struct RacingStore {
        inner: InMemoryRecordStore,
    }

    #[async_trait::async_trait]
    impl RecordStore for RacingStore {
        async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
            Ok(Box::new(RacingSession {
                inner: self.inner.begin().await?,
                rival: self.inner.clone(),
                target: None,
            }))
        }

        async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
            self.inner.get_client(id).await
        }

        async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
            self.inner.list_clients().await
        }
    }

    struct RacingSession {
        inner: Box<dyn StoreSession>,
        rival: InMemoryRecordStore,
        target: Option<ClientId>,
    }

    #[async_trait::async_trait]
    impl StoreSession for RacingSession {
        async fn insert_client(&mut self, client: NewClient) -> Result<ClientId, StoreError> {
            self.inner.insert_client(client).await
        }

        async fn insert_contact(&mut self, contact: NewContact) -> Result<ContactId, StoreError> {
            self.inner.insert_contact(contact).await
        }

        async fn get_client(&mut self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError> {
            self.target = Some(id);
            self.inner.get_client(id).await
        }

        async fn replace_client(
            &mut self,
            update: ClientUpdate,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.inner.replace_client(update, expected).await
        }

        async fn delete_contacts_by_client(&mut self, id: ClientId) -> Result<u64, StoreError> {
            self.inner.delete_contacts_by_client(id).await
        }

        async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> Result<(), StoreError> {
            self.inner.delete_client(id, expected).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if let Some(id) = self.target {
                let mut rival = self.rival.begin().await?;
                if let Some(current) = rival.get_client(id).await? {
                    let client = current.into_inner();
                    rival
                        .replace_client(
                            ClientUpdate {
                                id,
                                name: "Rival".to_string(),
                                address: client.address,
                                country: client.country,
                                tax_id: client.tax_id,
                                primary_phone: client.primary_phone,
                                email: client.email,
                            },
                            ExpectedVersion::Any,
                        )
                        .await?;
                }
                rival.commit().await?;
            }
            self.inner.commit().await
        }
    }

    async fn seeded_racing_service() -> (ClientService<RacingStore>, ClientId) {
        let store = RacingStore::default();
        let seeded = ClientService::new(store.inner.clone())
            .with_clock(t0)
            .create_client(acme(vec![contact("Jane")]))
            .await
            .unwrap();
        (ClientService::new(store).with_clock(t0), seeded.id)
    }

    #[tokio::test]
    async fn losing_update_reports_conflict_and_keeps_the_winner() {
        let (svc, id) = seeded_racing_service().await;

        let mut draft = acme(vec![contact("Zoe")]);
        draft.id = Some(id);
        draft.name = "Loser".to_string();
        let err = svc.update_client(id, draft).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");

        let stored = svc.get_client(id).await.unwrap();
        assert_eq!(stored.name, "Rival");
        let names: Vec<_> = stored.contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Jane"]);
    }

    #[tokio::test]
    async fn losing_delete_reports_conflict_and_keeps_the_client() {
        let (svc, id) = seeded_racing_service().await;

        let err = svc.delete_client(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");

        let stored = svc.get_client(id).await.unwrap();
        assert_eq!(stored.name, "Rival");
        assert_eq!(stored.contacts.len(), 1);
        assert_eq!(svc.store().inner.contact_count().unwrap(), 1);
    }

    #[test]
    fn store_errors_map_to_service_errors() {
        assert_eq!(ServiceError::from(StoreError::NotFound), ServiceError::NotFound);
        assert_eq!(
            ServiceError::from(StoreError::Conflict("x".into())),
            ServiceError::Conflict("x".into())
        );
        assert_eq!(
            ServiceError::from(StoreError::Backend("down".into())),
            ServiceError::Store("down".into())
        );
    }
}
