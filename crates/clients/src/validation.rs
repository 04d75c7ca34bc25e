//! Shape/format checks for client payloads.
//!
//! Rules run in a fixed order and stop at the first failure, so a caller can
//! surface exactly one message at a time:
//!
//! 1. client `name` and `taxId` are present (non-empty)
//! 2. `primaryPhone` is a phone number
//! 3. `email` is an email address
//! 4. each contact, in order: `name` present, then `phone` and `email` when given
//!
//! Values are checked exactly as submitted; surrounding whitespace is not
//! stripped, so a padded phone or email is malformed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::client::{ClientDraft, ContactDraft};

/// Exactly 8 digits, optionally split 4-4 by a single hyphen.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-?[0-9]{4}$").expect("phone pattern compiles"));

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Which rule rejected the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    MissingRequiredField,
    InvalidPhoneFormat,
    InvalidEmailFormat,
}

/// First failed rule, with the offending field and, for contact-level
/// failures, the 1-based position of the contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub rule: ValidationRule,
    pub field: &'static str,
    pub contact_position: Option<usize>,
}

impl ValidationFailure {
    fn client(rule: ValidationRule, field: &'static str) -> Self {
        Self {
            rule,
            field,
            contact_position: None,
        }
    }

    fn contact(rule: ValidationRule, field: &'static str, position: usize) -> Self {
        Self {
            rule,
            field,
            contact_position: Some(position),
        }
    }
}

impl core::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(pos) = self.contact_position {
            write!(f, "contact #{pos}: ")?;
        }
        match self.rule {
            ValidationRule::MissingRequiredField => write!(f, "{} is required", self.field),
            ValidationRule::InvalidPhoneFormat => {
                write!(f, "{} must be 8 digits (e.g. 5555-5555)", self.field)
            }
            ValidationRule::InvalidEmailFormat => {
                write!(f, "{} is not a valid email address", self.field)
            }
        }
    }
}

impl std::error::Error for ValidationFailure {}

pub fn is_valid_phone(value: &str) -> bool {
    PHONE_RE.is_match(value)
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Validate a client draft. Pure; never touches storage.
pub fn validate(draft: &ClientDraft) -> Result<(), ValidationFailure> {
    use ValidationRule::*;

    if draft.name.is_empty() {
        return Err(ValidationFailure::client(MissingRequiredField, "name"));
    }
    if draft.tax_id.is_empty() {
        return Err(ValidationFailure::client(MissingRequiredField, "taxId"));
    }
    if !is_valid_phone(&draft.primary_phone) {
        return Err(ValidationFailure::client(InvalidPhoneFormat, "primaryPhone"));
    }
    if !is_valid_email(&draft.email) {
        return Err(ValidationFailure::client(InvalidEmailFormat, "email"));
    }

    for (idx, contact) in draft.contacts().iter().enumerate() {
        validate_contact(contact, idx + 1)?;
    }

    Ok(())
}

fn validate_contact(contact: &ContactDraft, position: usize) -> Result<(), ValidationFailure> {
    use ValidationRule::*;

    if contact.name.is_empty() {
        return Err(ValidationFailure::contact(MissingRequiredField, "name", position));
    }
    // Optional on contacts: empty is fine, anything else must be well-formed.
    if let Some(phone) = present(&contact.phone) {
        if !is_valid_phone(phone) {
            return Err(ValidationFailure::contact(InvalidPhoneFormat, "phone", position));
        }
    }
    if let Some(email) = present(&contact.email) {
        if !is_valid_email(email) {
            return Err(ValidationFailure::contact(InvalidEmailFormat, "email", position));
        }
    }
    Ok(())
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn valid_draft() -> ClientDraft {
        ClientDraft {
            name: "Acme".to_string(),
            tax_id: "NIT1".to_string(),
            primary_phone: "5555-5555".to_string(),
            email: "a@acme.com".to_string(),
            contacts: Some(vec![]),
            ..Default::default()
        }
    }

    fn contact(name: &str, phone: Option<&str>, email: Option<&str>) -> ContactDraft {
        ContactDraft {
            name: name.to_string(),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn phone_format_examples() {
        assert!(is_valid_phone("5555-5555"));
        assert!(is_valid_phone("55555555"));
        assert!(!is_valid_phone("555-5555"));
        assert!(!is_valid_phone("abcd1234"));
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("5555--5555"));
        assert!(!is_valid_phone("55-555555"));
    }

    #[test]
    fn email_format_examples() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a.com"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a b@c.com"));
    }

    #[test]
    fn valid_draft_passes() {
        assert_eq!(validate(&valid_draft()), Ok(()));
    }

    #[test]
    fn empty_name_is_missing_required_field() {
        let mut draft = valid_draft();
        draft.name = String::new();
        draft.tax_id = "X".to_string();
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::MissingRequiredField);
        assert_eq!(err.field, "name");
        assert_eq!(err.contact_position, None);
    }

    #[test]
    fn empty_tax_id_is_missing_required_field() {
        let mut draft = valid_draft();
        draft.tax_id = String::new();
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::MissingRequiredField);
        assert_eq!(err.field, "taxId");
    }

    #[test]
    fn whitespace_only_name_counts_as_present() {
        let mut draft = valid_draft();
        draft.name = "   ".to_string();
        assert_eq!(validate(&draft), Ok(()));
    }

    #[test]
    fn padded_phone_and_email_are_malformed() {
        let mut draft = valid_draft();
        draft.primary_phone = " 5555-5555 ".to_string();
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::InvalidPhoneFormat);
        assert_eq!(err.field, "primaryPhone");

        let mut draft = valid_draft();
        draft.email = "  a@acme.com\t".to_string();
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::InvalidEmailFormat);
        assert_eq!(err.field, "email");

        let mut draft = valid_draft();
        draft.contacts = Some(vec![contact("Jane", Some("1234-5678 "), None)]);
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::InvalidPhoneFormat);
        assert_eq!(err.contact_position, Some(1));
    }

    #[test]
    fn rules_short_circuit_in_order() {
        // Phone and email are both bad; only the phone is reported.
        let mut draft = valid_draft();
        draft.primary_phone = "123".to_string();
        draft.email = "nope".to_string();
        assert_eq!(
            validate(&draft).unwrap_err().rule,
            ValidationRule::InvalidPhoneFormat
        );

        draft.primary_phone = "1234-5678".to_string();
        assert_eq!(
            validate(&draft).unwrap_err().rule,
            ValidationRule::InvalidEmailFormat
        );
    }

    #[test]
    fn contact_failures_carry_one_based_position() {
        let mut draft = valid_draft();
        draft.contacts = Some(vec![
            contact("Jane", Some("1234-5678"), None),
            contact("", None, None),
        ]);
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::MissingRequiredField);
        assert_eq!(err.contact_position, Some(2));
        assert_eq!(err.to_string(), "contact #2: name is required");
    }

    #[test]
    fn contact_phone_and_email_are_optional_but_must_be_well_formed() {
        let mut draft = valid_draft();
        draft.contacts = Some(vec![contact("Jane", Some(""), Some(""))]);
        assert_eq!(validate(&draft), Ok(()));

        draft.contacts = Some(vec![contact("Jane", Some("12-34"), None)]);
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::InvalidPhoneFormat);
        assert_eq!(err.field, "phone");
        assert_eq!(err.contact_position, Some(1));

        draft.contacts = Some(vec![contact("Jane", None, Some("jane@acme"))]);
        let err = validate(&draft).unwrap_err();
        assert_eq!(err.rule, ValidationRule::InvalidEmailFormat);
        assert_eq!(err.contact_position, Some(1));
    }

    #[test]
    fn absent_contacts_are_valid() {
        let mut draft = valid_draft();
        draft.contacts = None;
        assert_eq!(validate(&draft), Ok(()));
    }

    proptest! {
        #[test]
        fn any_eight_digits_are_a_phone(digits in "[0-9]{8}", hyphen in any::<bool>()) {
            let phone = if hyphen {
                format!("{}-{}", &digits[..4], &digits[4..])
            } else {
                digits.clone()
            };
            prop_assert!(is_valid_phone(&phone));
        }

        #[test]
        fn wrong_digit_counts_are_not_a_phone(digits in "[0-9]{1,7}|[0-9]{9,12}") {
            prop_assert!(!is_valid_phone(&digits));
        }

        #[test]
        fn simple_addresses_are_emails(
            local in "[a-z0-9._]{1,12}",
            domain in "[a-z0-9]{1,12}",
            tld in "[a-z]{2,4}",
        ) {
            let email = format!("{local}@{domain}.{tld}");
            prop_assert!(is_valid_email(&email));
        }
    }
}
