//! Debt netting subsystem: variable-expense debts between household
//! members, their partial payments, and the settlement plan that collapses
//! the pairwise web into few transfers.

pub mod engine;
pub mod model;
pub mod service;

pub use engine::{net_positions, settlement_plan, NetPosition, SettlementPlan, Transfer};
pub use model::{Debt, DebtPayment, DebtStatus, DebtView};
pub use service::ExpenseService;
