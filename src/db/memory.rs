//! Process-local store selected with `DATABASE_URL=memory://`.
//!
//! A write transaction holds the table lock for its whole lifetime and works on
//! a staged copy, so transactions are serialisable and a dropped handle leaves
//! the tables untouched.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{DbError, Store, WriteTx};
use crate::auth::repo_types::{NewUser, User};
use crate::expenses::repo_types::{Expense, NewExpense};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    expenses: BTreeMap<i64, Expense>,
    next_user_id: i64,
    next_expense_id: i64,
}

impl Tables {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn expense_of(&self, user_id: i64, id: i64) -> Option<&Expense> {
        self.expenses.get(&id).filter(|e| e.user_id == user_id)
    }

    fn push_expense(&mut self, row: &NewExpense) -> Result<Expense, DbError> {
        if !self.users.contains_key(&row.user_id) {
            return Err(DbError::ForeignKeyViolation("expense_tbl_user_id_fkey".into()));
        }
        self.next_expense_id += 1;
        let now = OffsetDateTime::now_utc();
        let expense = Expense {
            id: self.next_expense_id,
            user_id: row.user_id,
            description: row.description.clone(),
            amount: row.amount,
            category: row.category.clone(),
            created_at: now,
            updated_at: now,
        };
        self.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    open_txs: Arc<AtomicUsize>,
    begun: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write transactions currently holding the tables.
    #[cfg(test)]
    pub fn open_transactions(&self) -> usize {
        self.open_txs.load(Ordering::SeqCst)
    }

    /// Total `begin` calls since the store was created, failed ones included.
    #[cfg(test)]
    pub fn transactions_begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    #[cfg(test)]
    pub async fn expense_count(&self) -> usize {
        self.tables.lock().await.expenses.len()
    }

    /// Makes every following call fail as if the database were unreachable.
    #[cfg(test)]
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Connection("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn WriteTx>, DbError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        self.open_txs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            open_txs: self.open_txs.clone(),
        }))
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        self.check_available()?;
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.check_available()?;
        Ok(self.tables.lock().await.user_by_email(email).cloned())
    }

    async fn user_exists(&self, id: i64) -> Result<bool, DbError> {
        self.check_available()?;
        Ok(self.tables.lock().await.users.contains_key(&id))
    }

    async fn list_expenses(&self, user_id: i64) -> Result<Vec<Expense>, DbError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut rows: Vec<Expense> = tables
            .expenses
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn find_expense(&self, user_id: i64, id: i64) -> Result<Option<Expense>, DbError> {
        self.check_available()?;
        Ok(self.tables.lock().await.expense_of(user_id, id).cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    open_txs: Arc<AtomicUsize>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.open_txs.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WriteTx for MemoryTx {
    async fn insert_user(&mut self, user: NewUser) -> Result<User, DbError> {
        if self.staged.user_by_email(&user.email).is_some() {
            return Err(DbError::UniqueViolation("users_email_key".into()));
        }
        self.staged.next_user_id += 1;
        let row = User {
            id: self.staged.next_user_id,
            username: user.username,
            email: user.email,
            password: user.password_hash,
            verification_token: Some(user.verification_token),
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.staged.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, DbError> {
        Ok(self.staged.user_by_email(email).cloned())
    }

    async fn find_user_by_token(&mut self, token: &str) -> Result<Option<User>, DbError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn mark_verified(&mut self, user_id: i64) -> Result<User, DbError> {
        let user = self
            .staged
            .users
            .get_mut(&user_id)
            .ok_or(DbError::RowNotFound)?;
        user.is_verified = true;
        user.verification_token = None;
        Ok(user.clone())
    }

    async fn set_verification_token(&mut self, user_id: i64, token: &str) -> Result<(), DbError> {
        let user = self
            .staged
            .users
            .get_mut(&user_id)
            .ok_or(DbError::RowNotFound)?;
        user.verification_token = Some(token.to_string());
        Ok(())
    }

    async fn insert_expense(&mut self, expense: NewExpense) -> Result<Expense, DbError> {
        self.staged.push_expense(&expense)
    }

    async fn insert_expenses(&mut self, rows: &[NewExpense]) -> Result<u64, DbError> {
        for row in rows {
            self.staged.push_expense(row)?;
        }
        Ok(rows.len() as u64)
    }

    async fn find_expense(&mut self, user_id: i64, id: i64) -> Result<Option<Expense>, DbError> {
        Ok(self.staged.expense_of(user_id, id).cloned())
    }

    async fn save_expense(&mut self, expense: &Expense) -> Result<Expense, DbError> {
        let row = self
            .staged
            .expenses
            .get_mut(&expense.id)
            .filter(|e| e.user_id == expense.user_id)
            .ok_or(DbError::RowNotFound)?;
        row.description = expense.description.clone();
        row.amount = expense.amount;
        row.category = expense.category.clone();
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn delete_expense(&mut self, user_id: i64, id: i64) -> Result<(), DbError> {
        if self.staged.expense_of(user_id, id).is_none() {
            return Err(DbError::RowNotFound);
        }
        self.staged.expenses.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let mut tx = self;
        let staged = std::mem::take(&mut tx.staged);
        *tx.guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        Ok(())
    }
}
