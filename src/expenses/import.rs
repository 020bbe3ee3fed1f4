//! CSV parsing for bulk expense import.
//!
//! The header row names the columns; `description`, `amount` and `category`
//! are required, anything else is ignored. Parsing stops at the first bad
//! row and nothing parsed so far is kept.

use std::io::Read;
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use serde_json::Value;

use crate::expenses::repo_types::NewExpense;
use crate::expenses::validators::expense_fields;
use crate::validation::ValidationErrors;

const REQUIRED_COLUMNS: [&str; 3] = ["description", "amount", "category"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot read csv: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed csv at line {line}: {message}")]
    Parse { line: u64, message: String },
    #[error("invalid row at line {line}: {message}")]
    InvalidRow { line: u64, message: String },
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("csv body exceeds {0} bytes")]
    TooLarge(usize),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    description: Option<String>,
    amount: Option<String>,
    category: Option<String>,
}

fn csv_error(e: csv::Error) -> ImportError {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(io) => ImportError::Io(io),
        _ => ImportError::Parse { line, message },
    }
}

/// Reads every row of `reader` in file order.
pub fn parse_expenses<R: Read>(reader: R, user_id: i64) -> Result<Vec<NewExpense>, ImportError> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers: StringRecord = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_ascii_lowercase())
        .collect();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(ImportError::MissingColumn(column));
        }
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: CsvRow = record
            .deserialize(Some(&headers))
            .map_err(|e| ImportError::Parse {
                line,
                message: e.to_string(),
            })?;

        let mut errors = ValidationErrors::new();
        let amount = row.amount.map(Value::String);
        let expense = expense_fields(
            &mut errors,
            user_id,
            row.description.as_deref(),
            amount.as_ref(),
            row.category.as_deref(),
        );
        match expense {
            Some(expense) if errors.is_empty() => rows.push(expense),
            _ => {
                let message = errors
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ImportError::InvalidRow { line, message });
            }
        }
    }
    Ok(rows)
}

/// Parses a CSV file on the blocking pool.
pub async fn parse_file(path: PathBuf, user_id: i64) -> Result<Vec<NewExpense>, ImportError> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        parse_expenses(std::io::BufReader::new(file), user_id)
    })
    .await
    .map_err(|e| ImportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_in_file_order_with_any_column_order() {
        let csv = "category,amount,description,note\n\
                   food,4.5,coffee,morning\n\
                   transport, 12 ,\"bus, return\",\n";
        let rows = parse_expenses(csv.as_bytes(), 3).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "coffee");
        assert_eq!(rows[0].amount, 4.5);
        assert_eq!(rows[0].category, "food");
        assert_eq!(rows[1].description, "bus, return");
        assert_eq!(rows[1].amount, 12.0);
        assert!(rows.iter().all(|r| r.user_id == 3));
    }

    #[test]
    fn header_only_yields_no_rows() {
        let rows = parse_expenses("description,amount,category\n".as_bytes(), 1).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn missing_column_is_reported() {
        let err = parse_expenses("description,amount\ncoffee,1\n".as_bytes(), 1).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("category")));
    }

    #[test]
    fn malformed_row_after_good_rows_fails_with_its_line() {
        let csv = "description,amount,category\n\
                   coffee,4.5,food\n\
                   bus,2,transport\n\
                   lunch,11,food\n\
                   broken,row\n";
        let err = parse_expenses(csv.as_bytes(), 1).unwrap_err();
        match err {
            ImportError::Parse { line, .. } => assert_eq!(line, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err_text(csv).contains("line 5"));
    }

    #[test]
    fn non_numeric_amount_is_an_invalid_row() {
        let csv = "description,amount,category\ncoffee,4.5,food\ntea,lots,food\n";
        match parse_expenses(csv.as_bytes(), 1).unwrap_err() {
            ImportError::InvalidRow { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("amount"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn parse_file_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("expense-import-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, "description,amount,category\ncoffee,4.5,food\n").unwrap();
        let rows = parse_file(path.clone(), 9).await.unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(rows.len(), 1);

        let err = parse_file(path, 9).await.unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }

    fn err_text(csv: &str) -> String {
        parse_expenses(csv.as_bytes(), 1).unwrap_err().to_string()
    }
}
