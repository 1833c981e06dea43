//! Loan domain types and their plain-string row mappings.
//!
//! Everything the tabular store sees is a string; the typed view lives
//! here. Monetary fields round to 2 decimals before every write.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dates::{format_date, parse_date};
use crate::store::Record;
use crate::types::{non_negative, parse_money, round2, Money, Rate};

use super::status::InstallmentStatus;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Whether the household requested this loan from someone, or granted it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanOrigin {
    #[default]
    Requested,
    Granted,
}

impl LoanOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanOrigin::Requested => "REQUESTED",
            LoanOrigin::Granted => "GRANTED",
        }
    }

    pub fn parse(raw: &str) -> LoanOrigin {
        match raw.trim().to_uppercase().as_str() {
            "GRANTED" => LoanOrigin::Granted,
            _ => LoanOrigin::Requested,
        }
    }
}

/// Administrative lifecycle of a loan. `Active` and `Finalized` are the
/// operative states the system derives; the rest are set by people.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    #[default]
    Draft,
    Approved,
    Active,
    Finalized,
    Cancelled,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Draft => "Draft",
            LoanStatus::Approved => "Approved",
            LoanStatus::Active => "Active",
            LoanStatus::Finalized => "Finalized",
            LoanStatus::Cancelled => "Cancelled",
            LoanStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(raw: &str) -> LoanStatus {
        match raw.trim().to_lowercase().as_str() {
            "approved" => LoanStatus::Approved,
            "active" => LoanStatus::Active,
            "finalized" => LoanStatus::Finalized,
            "cancelled" => LoanStatus::Cancelled,
            "rejected" => LoanStatus::Rejected,
            _ => LoanStatus::Draft,
        }
    }

    /// Operative statuses may be overwritten by the derived status cache;
    /// administrative ones (Draft/Cancelled/Rejected) never are.
    pub fn is_operative(&self) -> bool {
        matches!(
            self,
            LoanStatus::Approved | LoanStatus::Active | LoanStatus::Finalized
        )
    }
}

/// Penalty-rate policy: a multiplier of the nominal rate, or a manual rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyMode {
    /// 1.25x the nominal monthly rate.
    #[default]
    Surcharge25,
    /// 1.5x the nominal monthly rate.
    Surcharge50,
    /// Explicit monthly penalty rate.
    Manual,
}

impl PenaltyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyMode::Surcharge25 => "25",
            PenaltyMode::Surcharge50 => "50",
            PenaltyMode::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> PenaltyMode {
        match raw.trim().to_lowercase().as_str() {
            "50" => PenaltyMode::Surcharge50,
            "manual" => PenaltyMode::Manual,
            _ => PenaltyMode::Surcharge25,
        }
    }

    /// Monthly penalty rate under this policy, rounded to 2 decimals.
    pub fn monthly_penalty_rate(&self, nominal: Rate, manual: Rate) -> Rate {
        use rust_decimal_macros::dec;
        match self {
            PenaltyMode::Surcharge25 => round2(nominal * dec!(1.25)),
            PenaltyMode::Surcharge50 => round2(nominal * dec!(1.5)),
            PenaltyMode::Manual => round2(manual),
        }
    }
}

/// Administrative fee charged on top of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AdminFee {
    Flat(Money),
    PercentOfPrincipal(Decimal),
}

impl Default for AdminFee {
    fn default() -> Self {
        AdminFee::Flat(Decimal::ZERO)
    }
}

impl AdminFee {
    pub fn kind_str(&self) -> &'static str {
        match self {
            AdminFee::Flat(_) => "flat",
            AdminFee::PercentOfPrincipal(_) => "percent",
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            AdminFee::Flat(v) | AdminFee::PercentOfPrincipal(v) => *v,
        }
    }

    pub fn parse(kind: &str, value: Decimal) -> AdminFee {
        match kind.trim().to_lowercase().as_str() {
            "percent" | "percentage" => AdminFee::PercentOfPrincipal(value),
            _ => AdminFee::Flat(value),
        }
    }

    /// Fee amount for a given principal, rounded.
    pub fn amount(&self, principal: Money) -> Money {
        use rust_decimal_macros::dec;
        match self {
            AdminFee::Flat(v) => round2(*v),
            AdminFee::PercentOfPrincipal(pct) => round2(principal * *pct / dec!(100)),
        }
    }
}

// ---------------------------------------------------------------------------
// Loan header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub origin: LoanOrigin,
    /// Canonical borrower id (may be a synthetic `name:` id).
    pub borrower_id: String,
    pub borrower_name: String,
    pub principal: Money,
    pub term_months: u32,
    pub monthly_rate: Rate,
    pub penalty_mode: PenaltyMode,
    pub penalty_monthly_rate: Rate,
    pub admin_fee: AdminFee,
    pub admin_fee_amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursed_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disbursed_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disbursement_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disbursement_reference: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disbursement_note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_due_date: Option<NaiveDate>,
    pub payment_day: u32,
    pub level_payment: Money,
    pub total_interest_estimate: Money,
    pub total_payable_estimate: Money,
    pub status: LoanStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_by: String,
    pub updated_at: String,
}

pub(crate) const LOAN_FIELDS: &[&str] = &[
    "id",
    "origin",
    "borrower_id",
    "borrower_name",
    "principal",
    "term_months",
    "monthly_rate",
    "penalty_mode",
    "penalty_monthly_rate",
    "fee_kind",
    "fee_value",
    "fee_amount",
    "disbursed_on",
    "disbursed_at",
    "disbursement_method",
    "disbursement_reference",
    "disbursement_note",
    "first_due_date",
    "payment_day",
    "level_payment",
    "total_interest_estimate",
    "total_payable_estimate",
    "status",
    "created_by",
    "created_at",
    "updated_by",
    "updated_at",
];

impl Loan {
    pub(crate) fn to_record(&self) -> Record {
        let mut r = Record::new(&self.id);
        r.set("id", &self.id)
            .set("origin", self.origin.as_str())
            .set("borrower_id", &self.borrower_id)
            .set("borrower_name", &self.borrower_name)
            .set("principal", round2(self.principal))
            .set("term_months", self.term_months)
            .set("monthly_rate", self.monthly_rate)
            .set("penalty_mode", self.penalty_mode.as_str())
            .set("penalty_monthly_rate", self.penalty_monthly_rate)
            .set("fee_kind", self.admin_fee.kind_str())
            .set("fee_value", self.admin_fee.value())
            .set("fee_amount", round2(self.admin_fee_amount))
            .set("disbursed_on", opt_date(self.disbursed_on))
            .set("disbursed_at", &self.disbursed_at)
            .set("disbursement_method", &self.disbursement_method)
            .set("disbursement_reference", &self.disbursement_reference)
            .set("disbursement_note", &self.disbursement_note)
            .set("first_due_date", opt_date(self.first_due_date))
            .set("payment_day", self.payment_day)
            .set("level_payment", round2(self.level_payment))
            .set("total_interest_estimate", round2(self.total_interest_estimate))
            .set("total_payable_estimate", round2(self.total_payable_estimate))
            .set("status", self.status.as_str())
            .set("created_by", &self.created_by)
            .set("created_at", &self.created_at)
            .set("updated_by", &self.updated_by)
            .set("updated_at", &self.updated_at);
        r
    }

    pub(crate) fn from_record(record: &Record) -> Option<Loan> {
        let id = record.get("id").trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Loan {
            id,
            origin: LoanOrigin::parse(record.get("origin")),
            borrower_id: record.get("borrower_id").trim().to_string(),
            borrower_name: record.get("borrower_name").trim().to_string(),
            principal: parse_money(record.get("principal")),
            term_months: record.get("term_months").trim().parse().unwrap_or(0),
            monthly_rate: parse_money(record.get("monthly_rate")),
            penalty_mode: PenaltyMode::parse(record.get("penalty_mode")),
            penalty_monthly_rate: parse_money(record.get("penalty_monthly_rate")),
            admin_fee: AdminFee::parse(
                record.get("fee_kind"),
                parse_money(record.get("fee_value")),
            ),
            admin_fee_amount: parse_money(record.get("fee_amount")),
            disbursed_on: parse_date(record.get("disbursed_on")),
            disbursed_at: record.get("disbursed_at").trim().to_string(),
            disbursement_method: record.get("disbursement_method").trim().to_string(),
            disbursement_reference: record.get("disbursement_reference").trim().to_string(),
            disbursement_note: record.get("disbursement_note").trim().to_string(),
            first_due_date: parse_date(record.get("first_due_date")),
            payment_day: record.get("payment_day").trim().parse().unwrap_or(1),
            level_payment: parse_money(record.get("level_payment")),
            total_interest_estimate: parse_money(record.get("total_interest_estimate")),
            total_payable_estimate: parse_money(record.get("total_payable_estimate")),
            status: LoanStatus::parse(record.get("status")),
            created_by: record.get("created_by").trim().to_string(),
            created_at: record.get("created_at").trim().to_string(),
            updated_by: record.get("updated_by").trim().to_string(),
            updated_at: record.get("updated_at").trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Installments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    pub id: String,
    pub loan_id: String,
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Scheduled payment for this installment (level cuota; the final one
    /// absorbs rounding drift).
    pub payment: Money,
    pub interest: Money,
    pub principal: Money,
    pub balance_after: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    pub penalty_accrued: Money,
    pub penalty_paid: Money,
    /// Date through which penalty has already been accrued. Guards the
    /// same span from accruing twice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_through: Option<NaiveDate>,
    pub status: InstallmentStatus,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) const INSTALLMENT_FIELDS: &[&str] = &[
    "id",
    "loan_id",
    "number",
    "due_date",
    "payment",
    "interest",
    "principal",
    "balance_after",
    "interest_paid",
    "principal_paid",
    "penalty_accrued",
    "penalty_paid",
    "penalty_through",
    "status",
    "created_at",
    "updated_at",
];

impl Installment {
    pub fn interest_pending(&self) -> Money {
        round2(non_negative(self.interest - self.interest_paid))
    }

    pub fn principal_pending(&self) -> Money {
        round2(non_negative(self.principal - self.principal_paid))
    }

    /// Unpaid interest + principal: the base on which penalty accrues.
    pub fn base_pending(&self) -> Money {
        round2(self.interest_pending() + self.principal_pending())
    }

    pub fn penalty_pending(&self) -> Money {
        round2(non_negative(self.penalty_accrued - self.penalty_paid))
    }

    pub fn total_pending(&self) -> Money {
        round2(self.base_pending() + self.penalty_pending())
    }

    pub(crate) fn to_record(&self) -> Record {
        let mut r = Record::new(&self.id);
        r.set("id", &self.id)
            .set("loan_id", &self.loan_id)
            .set("number", self.number)
            .set("due_date", opt_date(self.due_date))
            .set("payment", round2(self.payment))
            .set("interest", round2(self.interest))
            .set("principal", round2(self.principal))
            .set("balance_after", round2(self.balance_after))
            .set("interest_paid", round2(self.interest_paid))
            .set("principal_paid", round2(self.principal_paid))
            .set("penalty_accrued", round2(self.penalty_accrued))
            .set("penalty_paid", round2(self.penalty_paid))
            .set("penalty_through", opt_date(self.penalty_through))
            .set("status", self.status.as_str())
            .set("created_at", &self.created_at)
            .set("updated_at", &self.updated_at);
        r
    }

    pub(crate) fn from_record(record: &Record) -> Option<Installment> {
        let id = record.get("id").trim().to_string();
        if id.is_empty() {
            return None;
        }
        let due_date = parse_date(record.get("due_date"));
        Some(Installment {
            id,
            loan_id: record.get("loan_id").trim().to_string(),
            number: record.get("number").trim().parse().unwrap_or(0),
            due_date,
            payment: parse_money(record.get("payment")),
            interest: parse_money(record.get("interest")),
            principal: parse_money(record.get("principal")),
            balance_after: parse_money(record.get("balance_after")),
            interest_paid: parse_money(record.get("interest_paid")),
            principal_paid: parse_money(record.get("principal_paid")),
            penalty_accrued: parse_money(record.get("penalty_accrued")),
            penalty_paid: parse_money(record.get("penalty_paid")),
            // An absent checkpoint means penalty has accrued through the
            // due date at most.
            penalty_through: parse_date(record.get("penalty_through")).or(due_date),
            status: InstallmentStatus::parse(record.get("status")),
            created_at: record.get("created_at").trim().to_string(),
            updated_at: record.get("updated_at").trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Payments (append-only ledger)
// ---------------------------------------------------------------------------

/// How one payment was split across one installment's balance categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentAllocation {
    pub installment_id: String,
    pub number: u32,
    pub penalty: Money,
    pub interest: Money,
    pub principal: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanPayment {
    pub id: String,
    pub loan_id: String,
    /// `YYYY-MM-DDTHH:MM:SS` of the payment event.
    pub at: String,
    pub amount: Money,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
    pub penalty_charged: Money,
    pub interest_charged: Money,
    pub principal_charged: Money,
    /// Remainder that exceeded every obligation. Reported, never silently
    /// applied forward.
    pub credit_balance: Money,
    pub allocations: Vec<InstallmentAllocation>,
}

pub(crate) const LOAN_PAYMENT_FIELDS: &[&str] = &[
    "id",
    "loan_id",
    "at",
    "amount",
    "method",
    "reference",
    "note",
    "penalty_charged",
    "interest_charged",
    "principal_charged",
    "credit_balance",
    "allocations",
];

impl LoanPayment {
    pub(crate) fn to_record(&self) -> Record {
        let allocations = serde_json::to_string(&self.allocations).unwrap_or_default();
        let mut r = Record::new(&self.id);
        r.set("id", &self.id)
            .set("loan_id", &self.loan_id)
            .set("at", &self.at)
            .set("amount", round2(self.amount))
            .set("method", &self.method)
            .set("reference", &self.reference)
            .set("note", &self.note)
            .set("penalty_charged", round2(self.penalty_charged))
            .set("interest_charged", round2(self.interest_charged))
            .set("principal_charged", round2(self.principal_charged))
            .set("credit_balance", round2(self.credit_balance))
            .set("allocations", allocations);
        r
    }

    pub(crate) fn from_record(record: &Record) -> Option<LoanPayment> {
        let id = record.get("id").trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(LoanPayment {
            id,
            loan_id: record.get("loan_id").trim().to_string(),
            at: record.get("at").trim().to_string(),
            amount: parse_money(record.get("amount")),
            method: record.get("method").trim().to_string(),
            reference: record.get("reference").trim().to_string(),
            note: record.get("note").trim().to_string(),
            penalty_charged: parse_money(record.get("penalty_charged")),
            interest_charged: parse_money(record.get("interest_charged")),
            principal_charged: parse_money(record.get("principal_charged")),
            credit_balance: parse_money(record.get("credit_balance")),
            allocations: serde_json::from_str(record.get("allocations")).unwrap_or_default(),
        })
    }
}

fn opt_date(date: Option<NaiveDate>) -> String {
    date.map(format_date).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pending_balances_clamp_at_zero() {
        let inst = Installment {
            id: "i1".into(),
            loan_id: "l1".into(),
            number: 1,
            due_date: None,
            payment: dec!(100),
            interest: dec!(20),
            principal: dec!(80),
            balance_after: dec!(0),
            interest_paid: dec!(25),
            principal_paid: dec!(30),
            penalty_accrued: dec!(5),
            penalty_paid: dec!(0),
            penalty_through: None,
            status: InstallmentStatus::Pending,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(inst.interest_pending(), dec!(0));
        assert_eq!(inst.principal_pending(), dec!(50));
        assert_eq!(inst.base_pending(), dec!(50));
        assert_eq!(inst.total_pending(), dec!(55));
    }

    #[test]
    fn loan_record_round_trip() {
        let loan = Loan {
            id: "l1".into(),
            origin: LoanOrigin::Granted,
            borrower_id: "p1".into(),
            borrower_name: "Ana".into(),
            principal: dec!(1000),
            term_months: 6,
            monthly_rate: dec!(0.03),
            penalty_mode: PenaltyMode::Surcharge50,
            penalty_monthly_rate: dec!(0.05),
            admin_fee: AdminFee::PercentOfPrincipal(dec!(2)),
            admin_fee_amount: dec!(20),
            disbursed_on: parse_date("2024-01-10"),
            disbursed_at: "2024-01-10T09:30:00".into(),
            disbursement_method: "transfer".into(),
            disbursement_reference: "ref-1".into(),
            disbursement_note: String::new(),
            first_due_date: parse_date("2024-02-05"),
            payment_day: 5,
            level_payment: dec!(184.60),
            total_interest_estimate: dec!(107.55),
            total_payable_estimate: dec!(1127.55),
            status: LoanStatus::Active,
            created_by: "ana".into(),
            created_at: "2024-01-10T09:00:00".into(),
            updated_by: String::new(),
            updated_at: "2024-01-10T09:30:00".into(),
        };
        let restored = Loan::from_record(&loan.to_record()).unwrap();
        assert_eq!(restored.origin, LoanOrigin::Granted);
        assert_eq!(restored.penalty_mode, PenaltyMode::Surcharge50);
        assert_eq!(restored.admin_fee, AdminFee::PercentOfPrincipal(dec!(2)));
        assert_eq!(restored.first_due_date, loan.first_due_date);
        assert_eq!(restored.level_payment, loan.level_payment);
    }

    #[test]
    fn penalty_mode_rates() {
        assert_eq!(
            PenaltyMode::Surcharge25.monthly_penalty_rate(dec!(0.04), Decimal::ZERO),
            dec!(0.05)
        );
        assert_eq!(
            PenaltyMode::Surcharge50.monthly_penalty_rate(dec!(0.04), Decimal::ZERO),
            dec!(0.06)
        );
        assert_eq!(
            PenaltyMode::Manual.monthly_penalty_rate(dec!(0.04), dec!(0.10)),
            dec!(0.10)
        );
    }
}
