use serde_json::Value;

use crate::db::{DbError, Store};
use crate::expenses::dto::ExpenseRequest;
use crate::expenses::repo_types::{ExpenseChanges, NewExpense};
use crate::validation::{number_field, string_field, ValidationErrors};

pub const DESCRIPTION_MAX: usize = 255;
pub const CATEGORY_MAX: usize = 255;

fn description(errors: &mut ValidationErrors, value: Option<&str>) -> Option<String> {
    string_field(errors, "description", value, 1, DESCRIPTION_MAX)
}

fn category(errors: &mut ValidationErrors, value: Option<&str>) -> Option<String> {
    string_field(errors, "category", value, 1, CATEGORY_MAX)
}

/// Field rules shared by the JSON body and CSV rows.
pub fn expense_fields(
    errors: &mut ValidationErrors,
    user_id: i64,
    raw_description: Option<&str>,
    raw_amount: Option<&Value>,
    raw_category: Option<&str>,
) -> Option<NewExpense> {
    let description = description(errors, raw_description);
    let amount = number_field(errors, "amount", raw_amount);
    let category = category(errors, raw_category);
    Some(NewExpense {
        user_id,
        description: description?,
        amount: amount?,
        category: category?,
    })
}

/// Full schema for a new expense, including the check that the owning user
/// exists. The outer `Err` is a failed lookup, not a validation failure.
pub async fn validate_create(
    store: &dyn Store,
    user_id: i64,
    req: &ExpenseRequest,
) -> Result<Result<NewExpense, ValidationErrors>, DbError> {
    let mut errors = ValidationErrors::new();
    let expense = expense_fields(
        &mut errors,
        user_id,
        req.description.as_deref(),
        req.amount.as_ref(),
        req.category.as_deref(),
    );

    if !store.user_exists(user_id).await? {
        errors.add("user_id", "exists", "The selected user_id is invalid");
    }

    Ok(match expense {
        Some(expense) => errors.finish(expense),
        None => Err(errors),
    })
}

/// Partial schema: every field optional, at least one present.
pub fn validate_update(req: &ExpenseRequest) -> Result<ExpenseChanges, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let changes = ExpenseChanges {
        description: req
            .description
            .as_deref()
            .and_then(|d| description(&mut errors, Some(d))),
        amount: match &req.amount {
            None | Some(Value::Null) => None,
            Some(v) => number_field(&mut errors, "amount", Some(v)),
        },
        category: req
            .category
            .as_deref()
            .and_then(|c| category(&mut errors, Some(c))),
    };
    if errors.is_empty() && changes.is_empty() {
        errors.add(
            "body",
            "required",
            "Provide at least one of description, amount, category",
        );
    }
    errors.finish(changes)
}
