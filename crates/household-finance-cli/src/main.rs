mod commands;
mod context;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::debt::DebtCommand;
use commands::loan::LoanCommand;
use commands::net::NetCommand;
use commands::person::PersonCommand;
use context::AppContext;

/// Shared-household finance ledger
#[derive(Parser)]
#[command(
    name = "hhf",
    version,
    about = "Shared-household finance ledger",
    long_about = "Track household loans and variable-expense debts with decimal \
                  precision: amortization schedules, penalty accrual, payment \
                  waterfalls, per-person balances and a debt-settlement plan."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Path of the JSON store ("-" for an ephemeral in-memory store)
    #[arg(long, default_value = "household-finance.json", global = true)]
    db: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Loans: schedules, disbursements, payments
    #[command(subcommand)]
    Loan(LoanCommand),
    /// Variable-expense debts between people
    #[command(subcommand)]
    Debt(DebtCommand),
    /// Net balances and the settlement plan
    #[command(subcommand)]
    Net(NetCommand),
    /// Person directory
    #[command(subcommand)]
    Person(PersonCommand),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Version => {
            println!("hhf {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        ref command => AppContext::open(&cli.db).and_then(|ctx| match command {
            Commands::Loan(cmd) => commands::loan::run(cmd, &ctx),
            Commands::Debt(cmd) => commands::debt::run(cmd, &ctx),
            Commands::Net(cmd) => commands::net::run(cmd, &ctx),
            Commands::Person(cmd) => commands::person::run(cmd, &ctx),
            Commands::Version => unreachable!(),
        }),
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
