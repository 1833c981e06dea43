use clap::{Args, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use household_finance_core::dates::parse_required_date;
use household_finance_core::loans::service::{
    DisbursementRequest, LoanFilter, LoanSpec, PaymentRequest, SuggestMode, SuggestRequest,
};

use crate::context::AppContext;
use crate::input;

#[derive(Subcommand)]
pub enum LoanCommand {
    /// Create or update a loan and generate its amortization schedule
    Create(CreateArgs),
    /// Register the disbursement and activate the loan
    Disburse(DisburseArgs),
    /// Register a payment (penalty → interest → principal, oldest first)
    Pay(PayArgs),
    /// Full loan view: header, installments, payments, summary
    Detail(DetailArgs),
    /// Suggest a payment amount with an allocation preview
    Suggest(SuggestArgs),
    /// List loans with derived balances
    List(ListArgs),
    /// Delete a loan and its installment schedule
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// Path to a JSON/YAML loan spec ("-" for stdin; overrides flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan id (update an existing, unpaid loan)
    #[arg(long)]
    pub id: Option<String>,

    /// Borrower person id
    #[arg(long)]
    pub borrower: Option<String>,

    /// Borrower display name (defaults to the directory entry)
    #[arg(long)]
    pub borrower_name: Option<String>,

    /// Principal amount
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Term in months
    #[arg(long)]
    pub term: Option<u32>,

    /// Nominal monthly rate as a decimal (0.03 = 3%)
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Penalty policy: 25, 50 or manual
    #[arg(long)]
    pub penalty_mode: Option<String>,

    /// Monthly penalty rate when --penalty-mode manual
    #[arg(long)]
    pub penalty_rate: Option<Decimal>,

    /// Admin fee kind: flat or percent
    #[arg(long)]
    pub fee_kind: Option<String>,

    /// Admin fee value (amount, or percent of principal)
    #[arg(long)]
    pub fee_value: Option<Decimal>,

    /// REQUESTED (default) or GRANTED
    #[arg(long)]
    pub origin: Option<String>,

    /// Planned disbursement date (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub disbursed_on: Option<String>,

    /// Day of month payments fall due (1-28)
    #[arg(long)]
    pub payment_day: Option<u32>,

    /// Administrative status (defaults to Draft)
    #[arg(long)]
    pub status: Option<String>,

    /// Acting user, recorded in audit fields
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args)]
pub struct DisburseArgs {
    /// Loan id
    pub id: String,

    /// Disbursement datetime (YYYY-MM-DDTHH:MM, defaults to now)
    #[arg(long)]
    pub at: Option<String>,

    #[arg(long)]
    pub method: Option<String>,

    #[arg(long)]
    pub reference: Option<String>,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args)]
pub struct PayArgs {
    /// Loan id
    pub id: String,

    /// Payment amount
    #[arg(long)]
    pub amount: Decimal,

    /// Payment datetime (YYYY-MM-DDTHH:MM, defaults to now)
    #[arg(long)]
    pub at: Option<String>,

    #[arg(long)]
    pub method: Option<String>,

    #[arg(long)]
    pub reference: Option<String>,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args)]
pub struct DetailArgs {
    /// Loan id
    pub id: String,

    /// Project balances to this date (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SuggestModeArg {
    /// Everything pending on the next unpaid installment
    NextInstallment,
    /// Everything pending through a specific installment
    SpecificInstallment,
    /// Everything pending as of today
    SettleToday,
    /// Preview a free amount
    FreeAmount,
}

impl From<SuggestModeArg> for SuggestMode {
    fn from(value: SuggestModeArg) -> Self {
        match value {
            SuggestModeArg::NextInstallment => SuggestMode::NextInstallment,
            SuggestModeArg::SpecificInstallment => SuggestMode::SpecificInstallment,
            SuggestModeArg::SettleToday => SuggestMode::SettleToday,
            SuggestModeArg::FreeAmount => SuggestMode::FreeAmount,
        }
    }
}

#[derive(Args)]
pub struct SuggestArgs {
    /// Loan id
    pub id: String,

    /// Suggestion mode
    #[arg(long, default_value = "next-installment")]
    pub mode: SuggestModeArg,

    /// Target installment id (with --mode specific-installment)
    #[arg(long)]
    pub installment: Option<String>,

    /// Target installment number (with --mode specific-installment)
    #[arg(long)]
    pub number: Option<u32>,

    /// Amount to preview (with --mode free-amount)
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// As-of date (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Filter by borrower person id
    #[arg(long)]
    pub person: Option<String>,

    /// Filter by origin: requested, granted or all
    #[arg(long)]
    pub origin: Option<String>,

    /// Filter by status (administrative, or derived active/finalized)
    #[arg(long)]
    pub status: Option<String>,

    /// Disbursed on or after (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// Disbursed on or before (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,

    /// Free-text search over id and borrower
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Loan id
    pub id: String,
}

pub fn run(cmd: &LoanCommand, ctx: &AppContext) -> Result<Value, Box<dyn std::error::Error>> {
    match cmd {
        LoanCommand::Create(args) => {
            let spec: LoanSpec = match &args.input {
                Some(path) => input::read_payload(path)?,
                None => LoanSpec {
                    id: args.id.clone(),
                    origin: args.origin.clone(),
                    borrower_id: args.borrower.clone().unwrap_or_default(),
                    borrower_name: args.borrower_name.clone(),
                    principal: args.principal.unwrap_or_default(),
                    term_months: args.term.unwrap_or_default(),
                    monthly_rate: args.rate.unwrap_or_default(),
                    penalty_mode: args.penalty_mode.clone(),
                    manual_penalty_rate: args.penalty_rate,
                    fee_kind: args.fee_kind.clone(),
                    fee_value: args.fee_value,
                    disbursed_on: args.disbursed_on.clone(),
                    payment_day: args.payment_day,
                    status: args.status.clone(),
                    user: args.user.clone(),
                },
            };
            Ok(serde_json::to_value(ctx.loans.create_or_update(spec)?)?)
        }
        LoanCommand::Disburse(args) => {
            let summary = ctx.loans.register_disbursement(
                &args.id,
                DisbursementRequest {
                    at: args.at.clone(),
                    method: args.method.clone(),
                    reference: args.reference.clone(),
                    note: args.note.clone(),
                    user: args.user.clone(),
                },
            )?;
            Ok(serde_json::to_value(summary)?)
        }
        LoanCommand::Pay(args) => {
            let receipt = ctx.loans.register_payment(
                &args.id,
                PaymentRequest {
                    amount: args.amount,
                    at: args.at.clone(),
                    method: args.method.clone(),
                    reference: args.reference.clone(),
                    note: args.note.clone(),
                },
            )?;
            Ok(serde_json::to_value(receipt)?)
        }
        LoanCommand::Detail(args) => {
            let as_of = match args.as_of.as_deref() {
                Some(raw) => Some(parse_required_date(raw, "as_of")?),
                None => None,
            };
            Ok(serde_json::to_value(ctx.loans.detail(&args.id, as_of)?)?)
        }
        LoanCommand::Suggest(args) => {
            let suggestion = ctx.loans.suggest_payment(
                &args.id,
                args.mode.into(),
                SuggestRequest {
                    installment_id: args.installment.clone(),
                    number: args.number,
                    amount: args.amount,
                    as_of: args.as_of.clone(),
                },
            )?;
            Ok(serde_json::to_value(suggestion)?)
        }
        LoanCommand::List(args) => {
            let items = ctx.loans.list(&LoanFilter {
                person_id: args.person.clone(),
                origin: args.origin.clone(),
                status: args.status.clone(),
                from: args.from.clone(),
                to: args.to.clone(),
                query: args.query.clone(),
                as_of: None,
            })?;
            Ok(serde_json::to_value(items)?)
        }
        LoanCommand::Delete(args) => {
            ctx.loans.delete(&args.id)?;
            Ok(serde_json::json!({ "deleted": args.id }))
        }
    }
}
