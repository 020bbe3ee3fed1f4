//! Persistence gateway.
//!
//! Reads go straight through [`Store`]; anything that mutates state runs on a
//! [`WriteTx`] handle obtained from [`Store::begin`]. Handles are consumed by
//! `commit`/`rollback`, and an abandoned handle is rolled back when dropped.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use crate::auth::repo_types::{NewUser, User};
use crate::error::ServiceError;
use crate::expenses::repo_types::{Expense, NewExpense};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database unavailable: {0}")]
    Connection(String),
    #[error("duplicate value violates unique constraint {0}")]
    UniqueViolation(String),
    #[error("referenced row does not exist ({0})")]
    ForeignKeyViolation(String),
    #[error("row not found")]
    RowNotFound,
    #[error(transparent)]
    Query(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => DbError::RowNotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::Connection(e.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::UniqueViolation(db.constraint().unwrap_or("unique").to_string())
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                DbError::ForeignKeyViolation(db.constraint().unwrap_or("foreign key").to_string())
            }
            other => DbError::Query(other),
        }
    }
}

/// Read-only access plus the entry point for write transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a read-write unit of work.
    async fn begin(&self) -> Result<Box<dyn WriteTx>, DbError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, DbError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;
    async fn user_exists(&self, id: i64) -> Result<bool, DbError>;

    async fn list_expenses(&self, user_id: i64) -> Result<Vec<Expense>, DbError>;
    async fn find_expense(&self, user_id: i64, id: i64) -> Result<Option<Expense>, DbError>;
}

/// A transaction handle. Every lookup made through it is bound to the
/// transaction (and locks the row where the backend supports it).
#[async_trait]
pub trait WriteTx: Send {
    async fn insert_user(&mut self, user: NewUser) -> Result<User, DbError>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, DbError>;
    async fn find_user_by_token(&mut self, token: &str) -> Result<Option<User>, DbError>;
    async fn mark_verified(&mut self, user_id: i64) -> Result<User, DbError>;
    async fn set_verification_token(&mut self, user_id: i64, token: &str)
        -> Result<(), DbError>;

    async fn insert_expense(&mut self, expense: NewExpense) -> Result<Expense, DbError>;
    /// Inserts all rows as one batch, returns the number of rows written.
    async fn insert_expenses(&mut self, rows: &[NewExpense]) -> Result<u64, DbError>;
    async fn find_expense(&mut self, user_id: i64, id: i64) -> Result<Option<Expense>, DbError>;
    async fn save_expense(&mut self, expense: &Expense) -> Result<Expense, DbError>;
    async fn delete_expense(&mut self, user_id: i64, id: i64) -> Result<(), DbError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// Runs `work` inside one transaction: commit on `Ok`, rollback on `Err`.
///
/// `work` must only capture owned values; the future it returns borrows the
/// handle and nothing else.
pub async fn with_transaction<T, F>(store: &dyn Store, work: F) -> Result<T, ServiceError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut Box<dyn WriteTx>) -> BoxFuture<'t, Result<T, ServiceError>>
        + Send,
{
    let mut tx = store.begin().await?;
    match work(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback failed");
            }
            Err(err)
        }
    }
}
