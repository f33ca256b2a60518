//! Account persistence.
//!
//! The store owns two things nobody else may decide: which email already has an
//! account, and which id a new account gets. Both implementations run the same
//! check-then-insert sequence, and both keep a guard at the write itself (the
//! `accounts_email_key` unique index, or the mutex in the memory store) so two
//! concurrent registrations of one email can never both succeed.

mod memory;
mod postgres;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// A registered account. Never mutated after creation.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub email: String,
    #[serde(skip)]
    pub secret_hash: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::DuplicateEmail
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Returns `true` when `err` is a database unique-violation (SQLSTATE `23505`).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create an account for `email`.
    ///
    /// Exactly one row is written on success and none on any error. Retrying is
    /// left to the caller.
    async fn register(&self, email: &str, secret_hash: &str) -> Result<Account, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_maps_to_duplicate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(matches!(StoreError::from(err), StoreError::DuplicateEmail));
    }

    #[test]
    fn other_database_errors_map_to_unavailable() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("08006"),
        }));
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));

        let err = sqlx::Error::Database(Box::new(TestDbError { code: None }));
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn connection_errors_map_to_unavailable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn account_serialization_omits_hash() -> Result<(), serde_json::Error> {
        let account = Account {
            id: 7,
            email: "a@b.com".to_string(),
            secret_hash: "$argon2id$secret".to_string(),
        };
        let json = serde_json::to_value(&account)?;
        assert_eq!(json, serde_json::json!({"id": 7, "email": "a@b.com"}));
        Ok(())
    }
}
