use super::{Account, AccountStore, StoreError};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use tracing::{debug, info_span, instrument, Instrument};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// PostgreSQL-backed store. The pool is created by the caller and injected here.
#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `accounts` table and its unique email index if missing.
    ///
    /// # Errors
    /// Returns `StoreError::Unavailable` if the statements cannot be executed.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let query = "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1) AS exists";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.get("exists"))
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    #[instrument(skip(self, secret_hash))]
    async fn register(&self, email: &str, secret_hash: &str) -> Result<Account, StoreError> {
        // Fast path for the common duplicate; the unique index below is what decides.
        if self.email_exists(email).await? {
            debug!("email already registered");
            return Err(StoreError::DuplicateEmail);
        }

        let query = "INSERT INTO accounts (email, secret_hash) VALUES ($1, $2) RETURNING id";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(secret_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(Account {
            id: row.get("id"),
            email: email.to_string(),
            secret_hash: secret_hash.to_string(),
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = "SELECT id, email, secret_hash FROM accounts WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            email: row.get("email"),
            secret_hash: row.get("secret_hash"),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
