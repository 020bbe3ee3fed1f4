use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /expenses` and `PUT /expenses/:id`. `amount` stays raw so
/// numeric strings can be accepted and bad values reported per field.
#[derive(Debug, Default, Deserialize)]
pub struct ExpenseRequest {
    pub description: Option<String>,
    pub amount: Option<Value>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: u64,
}
