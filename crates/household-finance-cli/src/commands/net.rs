use clap::Subcommand;
use serde_json::Value;

use crate::commands::debt::FilterArgs;
use crate::context::AppContext;

#[derive(Subcommand)]
pub enum NetCommand {
    /// Net balance per person with its breakdown
    Balance(FilterArgs),
    /// Settlement plan: who pays whom to zero the balances
    Plan(FilterArgs),
    /// Dashboard cards plus the per-person balance
    Summary(FilterArgs),
}

pub fn run(cmd: &NetCommand, ctx: &AppContext) -> Result<Value, Box<dyn std::error::Error>> {
    match cmd {
        NetCommand::Balance(args) => Ok(serde_json::to_value(
            ctx.expenses.balance_per_person(&args.to_filter())?,
        )?),
        NetCommand::Plan(args) => Ok(serde_json::to_value(
            ctx.expenses.compute_settlement_plan(&args.to_filter())?,
        )?),
        NetCommand::Summary(args) => Ok(serde_json::to_value(
            ctx.expenses.dashboard(&args.to_filter())?,
        )?),
    }
}
