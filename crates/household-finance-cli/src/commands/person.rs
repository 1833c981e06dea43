use clap::{Args, Subcommand};
use serde_json::Value;

use household_finance_core::persons::Person;

use crate::context::AppContext;

#[derive(Subcommand)]
pub enum PersonCommand {
    /// Add or update a person
    Add(AddArgs),
    /// List persons
    List(ListArgs),
    /// Remove a person from the directory
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct AddArgs {
    /// Display name
    pub name: String,

    /// Person id (update an existing person)
    #[arg(long)]
    pub id: Option<String>,

    /// Mark the person inactive
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Include inactive persons
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Person id
    pub id: String,
}

pub fn run(cmd: &PersonCommand, ctx: &AppContext) -> Result<Value, Box<dyn std::error::Error>> {
    let registry = ctx.expenses.persons();
    match cmd {
        PersonCommand::Add(args) => {
            let person = registry.save(Person {
                id: args.id.clone().unwrap_or_default(),
                name: args.name.clone(),
                active: !args.inactive,
            })?;
            Ok(serde_json::to_value(person)?)
        }
        PersonCommand::List(args) => Ok(serde_json::to_value(registry.list(!args.all)?)?),
        PersonCommand::Delete(args) => {
            registry.delete(&args.id)?;
            Ok(serde_json::json!({ "deleted": args.id }))
        }
    }
}
