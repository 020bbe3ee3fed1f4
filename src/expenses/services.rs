use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, instrument};

use crate::{
    db::{with_transaction, Store},
    envelope::Envelope,
    error::ServiceError,
    expenses::{
        dto::ImportSummary,
        import::{parse_expenses, parse_file, ImportError},
        repo_types::{Expense, ExpenseChanges, NewExpense},
    },
    state::AppState,
};

const NOT_FOUND: &str = "Expenses not found";

/// Expense CRUD and CSV import for one user's records.
#[derive(Clone)]
pub struct ExpenseService {
    store: Arc<dyn Store>,
    import_max_bytes: usize,
}

impl FromRef<AppState> for ExpenseService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.config.import_max_bytes)
    }
}

impl ExpenseService {
    pub fn new(store: Arc<dyn Store>, import_max_bytes: usize) -> Self {
        Self {
            store,
            import_max_bytes,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_all(&self, user_id: i64) -> Envelope<Vec<Expense>> {
        match self.store.list_expenses(user_id).await {
            Ok(rows) => Envelope::ok("Expenses fetched successfully", rows),
            Err(e) => ServiceError::from(e).into_envelope("Failed to fetch Expenses"),
        }
    }

    #[instrument(skip(self, expense), fields(user_id = expense.user_id))]
    pub async fn create_expenses(&self, expense: NewExpense) -> Envelope<Expense> {
        let created = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { Ok::<_, ServiceError>(tx.insert_expense(expense).await?) })
        })
        .await;

        match created {
            Ok(expense) => {
                info!(expense_id = expense.id, "expense created");
                Envelope::ok("Expenses added successfully", expense)
            }
            Err(e) => e.into_envelope("Failed to add expenses"),
        }
    }

    /// Read-only; never opens a write transaction.
    #[instrument(skip(self))]
    pub async fn get_expenses_by_id(&self, user_id: i64, id: i64) -> Envelope<Expense> {
        match self.store.find_expense(user_id, id).await {
            Ok(Some(expense)) => Envelope::ok("Expenses fetched successfully", expense),
            Ok(None) => ServiceError::NotFound(NOT_FOUND).into_envelope(""),
            Err(e) => ServiceError::from(e).into_envelope("Failed to fetch expenses by id"),
        }
    }

    #[instrument(skip(self, changes))]
    pub async fn update_expenses(
        &self,
        user_id: i64,
        id: i64,
        changes: ExpenseChanges,
    ) -> Envelope<Expense> {
        let updated = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut expense = tx
                    .find_expense(user_id, id)
                    .await?
                    .ok_or(ServiceError::NotFound(NOT_FOUND))?;
                expense.merge(changes);
                Ok::<_, ServiceError>(tx.save_expense(&expense).await?)
            })
        })
        .await;

        match updated {
            Ok(expense) => {
                info!(expense_id = expense.id, "expense updated");
                Envelope::ok("Expenses updated successfully", expense)
            }
            Err(e) => e.into_envelope("Failed to update expenses"),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_expenses(&self, user_id: i64, id: i64) -> Envelope<()> {
        let deleted = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                tx.find_expense(user_id, id)
                    .await?
                    .ok_or(ServiceError::NotFound(NOT_FOUND))?;
                Ok::<_, ServiceError>(tx.delete_expense(user_id, id).await?)
            })
        })
        .await;

        match deleted {
            Ok(()) => {
                info!(expense_id = id, "expense deleted");
                Envelope::done("Expenses removed successfully")
            }
            Err(e) => e.into_envelope("Failed to remove expenses"),
        }
    }

    /// Imports a CSV file from disk.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn import_csv_file(&self, user_id: i64, path: PathBuf) -> Envelope<ImportSummary> {
        let parsed = parse_file(path, user_id).await;
        self.finish_import(parsed).await
    }

    /// Imports a CSV document received as a request body.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn import_csv(&self, user_id: i64, body: &[u8]) -> Envelope<ImportSummary> {
        let parsed = if body.len() > self.import_max_bytes {
            Err(ImportError::TooLarge(self.import_max_bytes))
        } else {
            parse_expenses(body, user_id)
        };
        self.finish_import(parsed).await
    }

    async fn finish_import(
        &self,
        parsed: Result<Vec<NewExpense>, ImportError>,
    ) -> Envelope<ImportSummary> {
        match self.insert_batch(parsed).await {
            Ok(imported) => {
                info!(imported, "csv import finished");
                Envelope::ok("Expenses imported successfully", ImportSummary { imported })
            }
            Err(e) => e.into_envelope("Failed to import expenses"),
        }
    }

    /// All rows or none: the batch is written only once the whole document
    /// parsed, inside a single transaction.
    async fn insert_batch(
        &self,
        parsed: Result<Vec<NewExpense>, ImportError>,
    ) -> Result<u64, ServiceError> {
        let rows = parsed?;
        if rows.is_empty() {
            return Ok(0);
        }
        with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { Ok::<_, ServiceError>(tx.insert_expenses(&rows).await?) })
        })
        .await
    }
}
