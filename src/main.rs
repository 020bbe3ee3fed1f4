use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod app;
mod auth;
mod config;
mod db;
mod envelope;
mod error;
mod expenses;
mod mail;
mod state;
mod validation;

use crate::expenses::services::ExpenseService;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "expense-api", version, about = "Expense tracking HTTP service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Import a CSV file of expenses for one user, all rows or none
    Import(ImportArgs),
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Owner of the imported expenses
    #[arg(long = "user-id")]
    user_id: i64,

    /// CSV file with `description`, `amount` and `category` columns
    #[arg(long = "file", value_name = "PATH")]
    file: PathBuf,
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "expense_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn import(state: &AppState, args: ImportArgs) -> anyhow::Result<()> {
    let service = ExpenseService::new(state.store.clone(), state.config.import_max_bytes);
    let envelope = service.import_csv_file(args.user_id, args.file).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if !envelope.success {
        anyhow::bail!(envelope.message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let state = AppState::init().await?;
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => app::serve(app::build_app(state)).await,
        Commands::Import(args) => import(&state, args).await,
    }
}
