use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;

use super::{DbError, Store, WriteTx};
use crate::auth::repo_types::{NewUser, User};
use crate::config::AppConfig;
use crate::expenses::repo_types::{Expense, NewExpense};

const USER_COLUMNS: &str =
    "id, username, email, password, verification_token, is_verified, created_at";
const EXPENSE_COLUMNS: &str =
    "id, user_id, description, amount, category, created_at, updated_at";

// Four binds per row, PostgreSQL caps a statement at 65535.
const INSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn WriteTx>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_exists(&self, id: i64) -> Result<bool, DbError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_expenses(&self, user_id: i64) -> Result<Vec<Expense>, DbError> {
        let rows = sqlx::query_as::<_, Expense>(&format!(
            r#"
            SELECT {EXPENSE_COLUMNS}
            FROM expense_tbl
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_expense(&self, user_id: i64, id: i64) -> Result<Option<Expense>, DbError> {
        let row = sqlx::query_as::<_, Expense>(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense_tbl WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WriteTx for PgTx {
    async fn insert_user(&mut self, user: NewUser) -> Result<User, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, verification_token, is_verified)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.verification_token)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 FOR UPDATE"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn find_user_by_token(&mut self, token: &str) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE verification_token = $1 FOR UPDATE"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn mark_verified(&mut self, user_id: i64) -> Result<User, DbError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_verified = TRUE, verification_token = NULL
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn set_verification_token(&mut self, user_id: i64, token: &str) -> Result<(), DbError> {
        let res = sqlx::query("UPDATE users SET verification_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&mut *self.tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::RowNotFound);
        }
        Ok(())
    }

    async fn insert_expense(&mut self, expense: NewExpense) -> Result<Expense, DbError> {
        let row = sqlx::query_as::<_, Expense>(&format!(
            r#"
            INSERT INTO expense_tbl (user_id, description, amount, category)
            VALUES ($1, $2, $3, $4)
            RETURNING {EXPENSE_COLUMNS}
            "#
        ))
        .bind(expense.user_id)
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(&expense.category)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn insert_expenses(&mut self, rows: &[NewExpense]) -> Result<u64, DbError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO expense_tbl (user_id, description, amount, category) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.user_id)
                    .push_bind(row.description.clone())
                    .push_bind(row.amount)
                    .push_bind(row.category.clone());
            });
            let res = qb.build().execute(&mut *self.tx).await?;
            written += res.rows_affected();
        }
        debug!(rows = written, "batch insert");
        Ok(written)
    }

    async fn find_expense(&mut self, user_id: i64, id: i64) -> Result<Option<Expense>, DbError> {
        let row = sqlx::query_as::<_, Expense>(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense_tbl WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn save_expense(&mut self, expense: &Expense) -> Result<Expense, DbError> {
        let row = sqlx::query_as::<_, Expense>(&format!(
            r#"
            UPDATE expense_tbl
            SET description = $3, amount = $4, category = $5, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING {EXPENSE_COLUMNS}
            "#
        ))
        .bind(expense.id)
        .bind(expense.user_id)
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(&expense.category)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn delete_expense(&mut self, user_id: i64, id: i64) -> Result<(), DbError> {
        let res = sqlx::query("DELETE FROM expense_tbl WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::RowNotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
