use serde::{Deserialize, Serialize};

/// Identity asserted by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub email: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }

    /// The fixed identity granted to every issued token.
    ///
    /// There is no credential check in front of issuance: this is a
    /// demonstration login, not a production authentication flow.
    pub fn demo() -> Self {
        Self::new("demo-user", "demo@clientbook.local")
    }
}
