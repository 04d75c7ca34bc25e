//! Postgres-backed record store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (foreign key violation) | `23503` | `Referential` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! ## Row Versions
//!
//! The first write a session makes through an existing client runs
//! `UPDATE clients SET version = version + 1 WHERE id = $1 AND version = $2`.
//! That statement both checks the caller's expectation and takes the row lock,
//! so a concurrent session touching the same client blocks until this one ends
//! and then sees a version it did not expect.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use clientbook_clients::{Client, ClientUpdate, Contact, NewClient, NewContact};
use clientbook_core::{ClientId, ContactId, ExpectedVersion, RowVersion, Versioned};

use super::r#trait::{RecordStore, StoreError, StoreSession};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    id            BIGSERIAL PRIMARY KEY,
    name          TEXT NOT NULL,
    address       TEXT NOT NULL DEFAULT '',
    country       TEXT NOT NULL DEFAULT '',
    tax_id        TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    primary_phone TEXT NOT NULL,
    email         TEXT NOT NULL,
    version       BIGINT NOT NULL DEFAULT 1 CHECK (version > 0)
);

CREATE TABLE IF NOT EXISTS contacts (
    id        BIGSERIAL PRIMARY KEY,
    client_id BIGINT NOT NULL REFERENCES clients (id),
    name      TEXT NOT NULL,
    role      TEXT NULL,
    phone     TEXT NULL,
    email     TEXT NULL
);

CREATE INDEX IF NOT EXISTS contacts_client_id_idx ON contacts (client_id);
"#;

const SELECT_CLIENT: &str = r#"
    SELECT id, name, address, country, tax_id, created_at, primary_phone, email, version
    FROM clients
"#;

const SELECT_CONTACT: &str = r#"
    SELECT id, client_id, name, role, phone, email
    FROM contacts
"#;

/// Record store persisted in PostgreSQL.
///
/// `PgPool` is internally reference counted, so cloning the store is cheap
/// and every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool against `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `clients` and `contacts` tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Consistent read-only snapshot for the outside-of-session reads.
    async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_snapshot", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin_snapshot", e))?;
        Ok(tx)
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_session", e))?;
        Ok(Box::new(PostgresSession {
            tx,
            base_versions: HashMap::new(),
        }))
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        let mut tx = self.begin_snapshot().await?;
        let found = load_client(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("get_client", e))?;
        Ok(found.map(Versioned::into_inner))
    }

    #[instrument(skip(self), fields(client_count), err)]
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let mut tx = self.begin_snapshot().await?;

        let client_rows = sqlx::query(&format!("{SELECT_CLIENT} ORDER BY id ASC"))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("list_clients", e))?;
        let contact_rows = sqlx::query(&format!("{SELECT_CONTACT} ORDER BY id ASC"))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("list_contacts", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("list_clients", e))?;

        let mut by_client: HashMap<ClientId, Vec<Contact>> = HashMap::new();
        for row in &contact_rows {
            let contact: Contact = ContactRow::from_row(row)
                .map_err(|e| map_sqlx_error("decode_contact", e))?
                .into();
            by_client.entry(contact.client_id).or_default().push(contact);
        }

        let mut clients = Vec::with_capacity(client_rows.len());
        for row in &client_rows {
            let mut client = ClientRow::from_row(row)
                .map_err(|e| map_sqlx_error("decode_client", e))?
                .into_client();
            client.contacts = by_client.remove(&client.id).unwrap_or_default();
            clients.push(client);
        }

        tracing::Span::current().record("client_count", clients.len());
        Ok(clients)
    }
}

/// Write session backed by one database transaction.
///
/// Dropping the session drops the transaction, which rolls it back.
struct PostgresSession {
    tx: Transaction<'static, Postgres>,
    /// Version each client had before this session first wrote through it.
    base_versions: HashMap<ClientId, RowVersion>,
}

impl PostgresSession {
    /// Lock and bump a client row on first write, checking `expected` against
    /// the version the row had before this session touched it.
    async fn touch(&mut self, id: ClientId, expected: ExpectedVersion) -> Result<(), StoreError> {
        if let Some(base) = self.base_versions.get(&id) {
            expected.check(*base)?;
            return Ok(());
        }

        let expected_raw = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v.get() as i64),
        };

        let bumped: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE clients
            SET version = version + 1
            WHERE id = $1 AND ($2::BIGINT IS NULL OR version = $2)
            RETURNING version
            "#,
        )
        .bind(id.get())
        .bind(expected_raw)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("touch_client", e))?;

        match bumped {
            Some(v) => {
                self.base_versions.insert(id, RowVersion::new((v - 1) as u64));
                Ok(())
            }
            None => {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM clients WHERE id = $1")
                        .bind(id.get())
                        .fetch_optional(&mut *self.tx)
                        .await
                        .map_err(|e| map_sqlx_error("touch_client", e))?;
                match current {
                    None => Err(StoreError::NotFound),
                    Some(actual) => Err(StoreError::Conflict(format!(
                        "client {id} is at version {actual}, expected {expected:?}"
                    ))),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl StoreSession for PostgresSession {
    #[instrument(skip(self, client), err)]
    async fn insert_client(&mut self, client: NewClient) -> Result<ClientId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO clients (name, address, country, tax_id, created_at, primary_phone, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&client.name)
        .bind(&client.address)
        .bind(&client.country)
        .bind(&client.tax_id)
        .bind(client.created_at)
        .bind(&client.primary_phone)
        .bind(&client.email)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_client", e))?;

        let id = ClientId::new(id);
        // Created here: nobody else can see it yet, no bump needed.
        self.base_versions.insert(id, RowVersion::INITIAL);
        Ok(id)
    }

    #[instrument(skip(self, contact), fields(client_id = %contact.client_id), err)]
    async fn insert_contact(&mut self, contact: NewContact) -> Result<ContactId, StoreError> {
        match self.touch(contact.client_id, ExpectedVersion::Any).await {
            Err(StoreError::NotFound) => {
                return Err(StoreError::Referential(format!(
                    "contact references unknown client {}",
                    contact.client_id
                )));
            }
            other => other?,
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO contacts (client_id, name, role, phone, email)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(contact.client_id.get())
        .bind(&contact.name)
        .bind(&contact.role)
        .bind(&contact.phone)
        .bind(&contact.email)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_contact", e))?;

        Ok(ContactId::new(id))
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn get_client(&mut self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError> {
        let found = load_client(&mut self.tx, id).await?;
        // Report the pre-session version so it can be handed back as an expectation.
        Ok(found.map(|v| match self.base_versions.get(&id) {
            Some(base) => Versioned::new(v.value, *base),
            None => v,
        }))
    }

    #[instrument(skip(self, update), fields(client_id = %update.id), err)]
    async fn replace_client(
        &mut self,
        update: ClientUpdate,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.touch(update.id, expected).await?;

        sqlx::query(
            r#"
            UPDATE clients
            SET name = $2, address = $3, country = $4, tax_id = $5, primary_phone = $6, email = $7
            WHERE id = $1
            "#,
        )
        .bind(update.id.get())
        .bind(&update.name)
        .bind(&update.address)
        .bind(&update.country)
        .bind(&update.tax_id)
        .bind(&update.primary_phone)
        .bind(&update.email)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("replace_client", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn delete_contacts_by_client(&mut self, id: ClientId) -> Result<u64, StoreError> {
        match self.touch(id, ExpectedVersion::Any).await {
            // No client, hence no contacts.
            Err(StoreError::NotFound) => return Ok(0),
            other => other?,
        }

        let result = sqlx::query("DELETE FROM contacts WHERE client_id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_contacts_by_client", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> Result<(), StoreError> {
        self.touch(id, expected).await?;

        // Checked up front so the refusal leaves the transaction usable.
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE client_id = $1")
            .bind(id.get())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_client", e))?;
        if remaining > 0 {
            return Err(StoreError::Referential(format!(
                "client {id} still owns {remaining} contact(s)"
            )));
        }

        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_client", e))?;

        self.base_versions.remove(&id);
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

async fn load_client(
    tx: &mut Transaction<'static, Postgres>,
    id: ClientId,
) -> Result<Option<Versioned<Client>>, StoreError> {
    let row = sqlx::query(&format!("{SELECT_CLIENT} WHERE id = $1"))
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_client", e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let client_row = ClientRow::from_row(&row).map_err(|e| map_sqlx_error("decode_client", e))?;
    let version = RowVersion::new(client_row.version as u64);
    let mut client = client_row.into_client();

    let contact_rows = sqlx::query(&format!("{SELECT_CONTACT} WHERE client_id = $1 ORDER BY id ASC"))
        .bind(id.get())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_contacts", e))?;
    for row in &contact_rows {
        let contact = ContactRow::from_row(row).map_err(|e| map_sqlx_error("decode_contact", e))?;
        client.contacts.push(contact.into());
    }

    Ok(Some(Versioned::new(client, version)))
}

#[derive(Debug)]
struct ClientRow {
    id: i64,
    name: String,
    address: String,
    country: String,
    tax_id: String,
    created_at: DateTime<Utc>,
    primary_phone: String,
    email: String,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ClientRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ClientRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            country: row.try_get("country")?,
            tax_id: row.try_get("tax_id")?,
            created_at: row.try_get("created_at")?,
            primary_phone: row.try_get("primary_phone")?,
            email: row.try_get("email")?,
            version: row.try_get("version")?,
        })
    }
}

impl ClientRow {
    fn into_client(self) -> Client {
        Client {
            id: ClientId::new(self.id),
            name: self.name,
            address: self.address,
            country: self.country,
            tax_id: self.tax_id,
            created_at: self.created_at,
            primary_phone: self.primary_phone,
            email: self.email,
            contacts: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct ContactRow {
    id: i64,
    client_id: i64,
    name: String,
    role: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for ContactRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ContactRow {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            name: row.try_get("name")?,
            role: row.try_get("role")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
        })
    }
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: ContactId::new(row.id),
            client_id: ClientId::new(row.client_id),
            name: row.name,
            role: row.role,
            phone: row.phone,
            email: row.email,
        }
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23503") => StoreError::Referential(msg),
                Some("23505") | Some("40001") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
