use axum::{
    extract::{
        rejection::{BytesRejection, JsonRejection, PathRejection},
        DefaultBodyLimit, Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use crate::{
    auth::jwt::AuthUser,
    envelope::{ApiRejection, Envelope},
    error::ServiceError,
    expenses::{
        dto::{ExpenseRequest, ImportSummary},
        repo_types::Expense,
        services::ExpenseService,
        validators::{validate_create, validate_update},
    },
    state::AppState,
};

pub fn expense_routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route(
            "/expenses/:id",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}

pub fn import_routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/expenses/import", post(import_expenses))
        .layer(DefaultBodyLimit::max(max_bytes))
}

#[instrument(skip(expenses))]
pub async fn list_expenses(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
) -> Envelope<Vec<Expense>> {
    expenses.get_all(user_id).await
}

#[instrument(skip(state, expenses, body))]
pub async fn create_expense(
    State(state): State<AppState>,
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<ExpenseRequest>, JsonRejection>,
) -> Result<Envelope<Expense>, ApiRejection> {
    let Json(req) = body?;
    match validate_create(state.store.as_ref(), user_id, &req).await {
        Ok(checked) => Ok(expenses.create_expenses(checked?).await),
        Err(e) => Ok(ServiceError::from(e).into_envelope("Failed to add expenses")),
    }
}

#[instrument(skip(expenses))]
pub async fn get_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Envelope<Expense>, ApiRejection> {
    let Path(id) = id?;
    Ok(expenses.get_expenses_by_id(user_id, id).await)
}

#[instrument(skip(expenses, body))]
pub async fn update_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<ExpenseRequest>, JsonRejection>,
) -> Result<Envelope<Expense>, ApiRejection> {
    let Path(id) = id?;
    let Json(req) = body?;
    let changes = validate_update(&req)?;
    Ok(expenses.update_expenses(user_id, id, changes).await)
}

#[instrument(skip(expenses))]
pub async fn delete_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Envelope<()>, ApiRejection> {
    let Path(id) = id?;
    Ok(expenses.delete_expenses(user_id, id).await)
}

/// Body is the CSV document itself (`Content-Type: text/csv`).
#[instrument(skip(expenses, body))]
pub async fn import_expenses(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    body: Result<Bytes, BytesRejection>,
) -> Result<Envelope<ImportSummary>, ApiRejection> {
    let body = body?;
    Ok(expenses.import_csv(user_id, &body).await)
}
