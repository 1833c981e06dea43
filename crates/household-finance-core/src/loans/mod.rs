//! Loan subsystem: amortization schedule generation, daily arrears accrual,
//! the payment waterfall, and status derivation, all driven off the
//! append-only payment ledger rather than stored running balances.

pub mod arrears;
pub mod model;
pub mod schedule;
pub mod service;
pub mod status;
pub mod waterfall;

pub use model::{
    AdminFee, Installment, InstallmentAllocation, Loan, LoanOrigin, LoanPayment, LoanStatus,
    PenaltyMode,
};
pub use schedule::{build_schedule, Schedule, ScheduleParams};
pub use service::LoanService;
pub use status::InstallmentStatus;
