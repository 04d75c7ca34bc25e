//! Clients domain module (client companies and their contacts).
//!
//! This crate contains the record shapes and the validation rules for client
//! payloads, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod client;
pub mod validation;

pub use client::{Client, ClientDraft, ClientUpdate, Contact, ContactDraft, NewClient, NewContact};
pub use validation::{ValidationFailure, ValidationRule, is_valid_email, is_valid_phone, validate};
