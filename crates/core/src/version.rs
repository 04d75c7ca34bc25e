//! Row versions for optimistic concurrency control.

use crate::error::{DomainError, DomainResult};

/// Monotonically increasing version of a stored client row.
///
/// Starts at 1 on insert and is bumped by every committed write that touches
/// the client or any of its contacts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowVersion(u64);

impl RowVersion {
    pub const INITIAL: RowVersion = RowVersion(1);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Optimistic concurrency expectation for a row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the row to be at an exact version.
    Exact(RowVersion),
}

impl ExpectedVersion {
    pub fn matches(self, actual: RowVersion) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: RowVersion) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

/// A value read together with the row version it was observed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: RowVersion,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: RowVersion) -> Self {
        Self { value, version }
    }

    pub fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
