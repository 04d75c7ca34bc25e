use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clientbook_core::{ClientId, ContactId, Entity};

/// Aggregate root: a customer company together with its contacts.
///
/// `contacts` is always populated when a client is read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// Free text; may be empty.
    pub address: String,
    /// Free text; may be empty.
    pub country: String,
    /// Business identifier (tax / NIT number).
    pub tax_id: String,
    pub created_at: DateTime<Utc>,
    pub primary_phone: String,
    pub email: String,
    pub contacts: Vec<Contact>,
}

/// A person owned by exactly one client.
///
/// Only the owning client's id is kept, so a contact never serializes its
/// parent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub client_id: ClientId,
    pub name: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> ClientId {
        self.id
    }
}

impl Entity for Contact {
    type Id = ContactId;

    fn id(&self) -> ContactId {
        self.id
    }
}

impl Client {
    /// Overwrite every mutable scalar field. `id`, `created_at` and contacts are untouched.
    pub fn apply_update(&mut self, update: &ClientUpdate) {
        self.name = update.name.clone();
        self.address = update.address.clone();
        self.country = update.country.clone();
        self.tax_id = update.tax_id.clone();
        self.primary_phone = update.primary_phone.clone();
        self.email = update.email.clone();
    }
}

/// Insert request for the record store (id is assigned by the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub name: String,
    pub address: String,
    pub country: String,
    pub tax_id: String,
    pub created_at: DateTime<Utc>,
    pub primary_phone: String,
    pub email: String,
}

impl NewClient {
    pub fn into_client(self, id: ClientId) -> Client {
        Client {
            id,
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

/// Insert request for a contact (id is assigned by the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub client_id: ClientId,
    pub name: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl NewContact {
    pub fn into_contact(self, id: ContactId) -> Contact {
        Contact {
            id,
            client_id: self.client_id,
            name: self.name,
            role: self.role,
            phone: self.phone,
            email: self.email,
        }
    }
}

/// Replacement of a client's mutable scalar fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUpdate {
    pub id: ClientId,
    pub name: String,
    pub address: String,
    pub country: String,
    pub tax_id: String,
    pub primary_phone: String,
    pub email: String,
}

/// Client payload as submitted by a caller (create or update).
///
/// Missing string fields deserialize as empty so that they are reported by
/// validation rather than rejected by the transport. Values are stored exactly
/// as submitted. `created_at` is never accepted from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientDraft {
    pub id: Option<ClientId>,
    pub name: String,
    pub address: String,
    pub country: String,
    pub tax_id: String,
    pub primary_phone: String,
    pub email: String,
    /// `None` when the field was absent; treated exactly like an empty list.
    #[serde(alias = "contactos")]
    pub contacts: Option<Vec<ContactDraft>>,
}

/// Contact payload nested in a [`ClientDraft`]. Any `id`/`clientId` sent by the
/// caller is ignored: contacts are always re-inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactDraft {
    pub id: Option<ContactId>,
    pub name: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl ClientDraft {
    pub fn contacts(&self) -> &[ContactDraft] {
        self.contacts.as_deref().unwrap_or(&[])
    }

    pub fn to_new_client(&self, created_at: DateTime<Utc>) -> NewClient {
        NewClient {
            name: self.name.clone(),
            address: self.address.clone(),
            country: self.country.clone(),
            tax_id: self.tax_id.clone(),
            created_at,
            primary_phone: self.primary_phone.clone(),
            email: self.email.clone(),
        }
    }

    pub fn to_update(&self, id: ClientId) -> ClientUpdate {
        ClientUpdate {
            id,
            name: self.name.clone(),
            address: self.address.clone(),
            country: self.country.clone(),
            tax_id: self.tax_id.clone(),
            primary_phone: self.primary_phone.clone(),
            email: self.email.clone(),
        }
    }

    pub fn new_contacts(&self, client_id: ClientId) -> Vec<NewContact> {
        self.contacts()
            .iter()
            .map(|c| c.to_new_contact(client_id))
            .collect()
    }
}

impl ContactDraft {
    pub fn to_new_contact(&self, client_id: ClientId) -> NewContact {
        NewContact {
            client_id,
            name: self.name.clone(),
            role: self.role.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft_json() -> serde_json::Value {
        serde_json::json!({
            "name": "Acme",
            "taxId": "NIT1",
            "primaryPhone": "5555-5555",
            "email": "a@acme.com",
            "createdAt": "1999-01-01T00:00:00Z",
            "contactos": [{ "name": "Jane", "phone": "1234-5678", "email": "jane@acme.com" }]
        })
    }

    #[test]
    fn draft_accepts_spanish_contacts_alias_and_ignores_created_at() {
        let draft: ClientDraft = serde_json::from_value(draft_json()).unwrap();
        assert_eq!(draft.name, "Acme");
        assert_eq!(draft.contacts().len(), 1);
        assert_eq!(draft.contacts()[0].name, "Jane");
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let draft: ClientDraft = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(draft.name.is_empty());
        assert!(draft.contacts.is_none());
        assert!(draft.contacts().is_empty());
    }

    #[test]
    fn values_are_kept_exactly_as_submitted() {
        let draft: ClientDraft = serde_json::from_value(serde_json::json!({
            "name": "Acme",
            "address": "",
            "country": "",
            "taxId": "NIT1",
            "primaryPhone": "5555-5555",
            "email": "a@acme.com",
            "contacts": [{ "name": "Jane", "role": "", "phone": null }]
        }))
        .unwrap();

        let created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let client = draft.to_new_client(created_at).into_client(ClientId::new(1));
        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json["address"], "");
        assert_eq!(json["country"], "");

        let contact = draft.contacts()[0].to_new_contact(ClientId::new(1));
        assert_eq!(contact.role.as_deref(), Some(""));
        assert_eq!(contact.phone, None);
        assert_eq!(contact.client_id, ClientId::new(1));
    }

    #[test]
    fn client_serializes_contacts_under_english_name() {
        let draft: ClientDraft = serde_json::from_value(draft_json()).unwrap();
        let client = draft
            .to_new_client(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
            .into_client(ClientId::new(1));
        let json = serde_json::to_value(&client).unwrap();
        assert!(json.get("contacts").is_some());
        assert!(json.get("contactos").is_none());
    }

    #[test]
    fn contact_never_serializes_its_owner() {
        let contact = Contact {
            id: ContactId::new(1),
            client_id: ClientId::new(9),
            name: "Jane".to_string(),
            role: None,
            phone: None,
            email: None,
        };
        let json = serde_json::to_value(&contact).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 6);
        assert!(json.get("client").is_none());
        assert_eq!(json["clientId"], 9);
    }

    #[test]
    fn apply_update_keeps_identity_and_creation_time() {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let draft: ClientDraft = serde_json::from_value(draft_json()).unwrap();
        let mut client = draft.to_new_client(created_at).into_client(ClientId::new(1));

        let mut changed = draft.clone();
        changed.name = "Acme Holdings".to_string();
        changed.country = "GT".to_string();
        client.apply_update(&changed.to_update(ClientId::new(1)));

        assert_eq!(client.id, ClientId::new(1));
        assert_eq!(client.created_at, created_at);
        assert_eq!(client.name, "Acme Holdings");
        assert_eq!(client.country, "GT");
    }
}
