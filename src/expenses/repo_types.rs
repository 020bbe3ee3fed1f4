use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Row of `expense_tbl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub category: String,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseChanges {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
}

impl ExpenseChanges {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.amount.is_none() && self.category.is_none()
    }
}

impl Expense {
    pub fn merge(&mut self, changes: ExpenseChanges) {
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(amount) = changes.amount {
            self.amount = amount;
        }
        if let Some(category) = changes.category {
            self.category = category;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_overwrites_present_fields() {
        let now = OffsetDateTime::now_utc();
        let mut expense = Expense {
            id: 1,
            user_id: 7,
            description: "coffee".into(),
            amount: 4.5,
            category: "food".into(),
            created_at: now,
            updated_at: now,
        };
        expense.merge(ExpenseChanges {
            amount: Some(5.0),
            ..Default::default()
        });
        assert_eq!(expense.description, "coffee");
        assert_eq!(expense.amount, 5.0);
        assert_eq!(expense.category, "food");
        assert!(ExpenseChanges::default().is_empty());
    }
}
