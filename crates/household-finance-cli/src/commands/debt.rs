use clap::{Args, Subcommand};
use rust_decimal::Decimal;
use serde_json::Value;

use household_finance_core::netting::service::{DebtFilter, DebtSpec};

use crate::context::AppContext;
use crate::input;

#[derive(Subcommand)]
pub enum DebtCommand {
    /// Record a debt: debtor owes creditor
    Add(AddArgs),
    /// Record a partial payment against a debt
    Pay(PayArgs),
    /// List debts with derived balances
    List(FilterArgs),
    /// Delete a debt and its payments
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct AddArgs {
    /// Path to a JSON/YAML debt spec ("-" for stdin; overrides flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Debt id (update an existing debt)
    #[arg(long)]
    pub id: Option<String>,

    /// Category ("groceries", "shipping", ...)
    #[arg(long)]
    pub kind: Option<String>,

    /// Debt date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Debtor person id
    #[arg(long)]
    pub debtor: Option<String>,

    /// Debtor display name (fallback identity when no id exists)
    #[arg(long)]
    pub debtor_name: Option<String>,

    /// Creditor person id
    #[arg(long)]
    pub creditor: Option<String>,

    /// Creditor display name (fallback identity when no id exists)
    #[arg(long)]
    pub creditor_name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Debt amount
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Acting user, recorded in audit fields
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args)]
pub struct PayArgs {
    /// Debt id
    pub id: String,

    /// Payment amount
    #[arg(long)]
    pub amount: Decimal,

    /// Payment date (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args, Default)]
pub struct FilterArgs {
    /// Period YYYY-MM (expands to that month)
    #[arg(long)]
    pub period: Option<String>,

    /// On or after (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// On or before (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,

    /// Only debts touching this person id
    #[arg(long)]
    pub person: Option<String>,

    /// Filter by category
    #[arg(long)]
    pub kind: Option<String>,

    /// Filter by derived status: pending, partial or paid
    #[arg(long)]
    pub status: Option<String>,

    /// Exclude fully paid debts
    #[arg(long)]
    pub exclude_paid: bool,

    /// Free-text search
    #[arg(long)]
    pub query: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> DebtFilter {
        DebtFilter {
            period: self.period.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            person_id: self.person.clone(),
            kind: self.kind.clone(),
            status: self.status.clone(),
            include_paid: Some(!self.exclude_paid),
            query: self.query.clone(),
        }
    }
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Debt id
    pub id: String,
}

pub fn run(cmd: &DebtCommand, ctx: &AppContext) -> Result<Value, Box<dyn std::error::Error>> {
    match cmd {
        DebtCommand::Add(args) => {
            let spec: DebtSpec = match &args.input {
                Some(path) => input::read_payload(path)?,
                None => DebtSpec {
                    id: args.id.clone(),
                    kind: args.kind.clone(),
                    date: args.date.clone(),
                    debtor_id: args.debtor.clone(),
                    debtor_name: args.debtor_name.clone(),
                    creditor_id: args.creditor.clone(),
                    creditor_name: args.creditor_name.clone(),
                    description: args.description.clone(),
                    amount: args.amount.unwrap_or_default(),
                    user: args.user.clone(),
                },
            };
            Ok(serde_json::to_value(ctx.expenses.save_debt(spec)?)?)
        }
        DebtCommand::Pay(args) => {
            let saved = ctx.expenses.record_payment(
                &args.id,
                args.amount,
                args.date.as_deref(),
                args.note.as_deref(),
                args.user.as_deref(),
            )?;
            Ok(serde_json::to_value(saved)?)
        }
        DebtCommand::List(args) => {
            let views = ctx.expenses.list_debts(&args.to_filter())?;
            Ok(serde_json::to_value(views)?)
        }
        DebtCommand::Delete(args) => {
            ctx.expenses.delete_debt(&args.id)?;
            Ok(serde_json::json!({ "deleted": args.id }))
        }
    }
}
