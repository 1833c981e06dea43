//! Debt domain types: a debt is "debtor owes creditor", reduced by zero or
//! more partial payments. Status is derived from balances, never stored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::parse_date;
use crate::store::Record;
use crate::types::{non_negative, parse_money, round2, Money, BALANCE_EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtStatus {
    Pending,
    Partial,
    Paid,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "Pending",
            DebtStatus::Partial => "Partial",
            DebtStatus::Paid => "Paid",
        }
    }
}

/// Derive a debt's status from its amount and what has been paid.
pub fn derive_debt_status(amount: Money, paid: Money, pending: Money) -> DebtStatus {
    if amount > Money::ZERO && pending <= BALANCE_EPSILON {
        DebtStatus::Paid
    } else if paid > BALANCE_EPSILON {
        DebtStatus::Partial
    } else {
        DebtStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    /// Free-form category ("groceries", "shipping", ...).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Canonical debtor id (may be synthetic `name:` id).
    pub debtor_id: String,
    pub debtor_name: String,
    pub creditor_id: String,
    pub creditor_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub amount: Money,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    pub created_at: String,
}

pub(crate) const DEBT_FIELDS: &[&str] = &[
    "id",
    "kind",
    "date",
    "debtor_id",
    "debtor_name",
    "creditor_id",
    "creditor_name",
    "description",
    "amount",
    "created_by",
    "created_at",
];

impl Debt {
    pub(crate) fn to_record(&self) -> Record {
        let mut r = Record::new(&self.id);
        r.set("id", &self.id)
            .set("kind", &self.kind)
            .set(
                "date",
                self.date.map(crate::dates::format_date).unwrap_or_default(),
            )
            .set("debtor_id", &self.debtor_id)
            .set("debtor_name", &self.debtor_name)
            .set("creditor_id", &self.creditor_id)
            .set("creditor_name", &self.creditor_name)
            .set("description", &self.description)
            .set("amount", round2(self.amount))
            .set("created_by", &self.created_by)
            .set("created_at", &self.created_at);
        r
    }

    pub(crate) fn from_record(record: &Record) -> Option<Debt> {
        let id = record.get("id").trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Debt {
            id,
            kind: record.get("kind").trim().to_string(),
            date: parse_date(record.get("date")),
            debtor_id: record.get("debtor_id").trim().to_string(),
            debtor_name: record.get("debtor_name").trim().to_string(),
            creditor_id: record.get("creditor_id").trim().to_string(),
            creditor_name: record.get("creditor_name").trim().to_string(),
            description: record.get("description").trim().to_string(),
            amount: parse_money(record.get("amount")),
            created_by: record.get("created_by").trim().to_string(),
            created_at: record.get("created_at").trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPayment {
    pub id: String,
    pub debt_id: String,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub recorded_by: String,
}

pub(crate) const DEBT_PAYMENT_FIELDS: &[&str] =
    &["id", "debt_id", "amount", "date", "note", "recorded_by"];

impl DebtPayment {
    pub(crate) fn to_record(&self) -> Record {
        let mut r = Record::new(&self.id);
        r.set("id", &self.id)
            .set("debt_id", &self.debt_id)
            .set("amount", round2(self.amount))
            .set(
                "date",
                self.date.map(crate::dates::format_date).unwrap_or_default(),
            )
            .set("note", &self.note)
            .set("recorded_by", &self.recorded_by);
        r
    }

    pub(crate) fn from_record(record: &Record) -> Option<DebtPayment> {
        let id = record.get("id").trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(DebtPayment {
            id,
            debt_id: record.get("debt_id").trim().to_string(),
            amount: parse_money(record.get("amount")),
            date: parse_date(record.get("date")),
            note: record.get("note").trim().to_string(),
            recorded_by: record.get("recorded_by").trim().to_string(),
        })
    }
}

/// A debt joined with its payments and derived balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtView {
    #[serde(flatten)]
    pub debt: Debt,
    pub payments: Vec<DebtPayment>,
    pub paid: Money,
    pub pending: Money,
    pub status: DebtStatus,
}

impl DebtView {
    pub fn build(debt: Debt, mut payments: Vec<DebtPayment>) -> DebtView {
        payments.sort_by(|a, b| a.date.cmp(&b.date));
        let paid: Money = payments.iter().map(|p| p.amount).sum();
        let pending = round2(non_negative(debt.amount - paid));
        let status = derive_debt_status(debt.amount, paid, pending);
        DebtView {
            debt,
            payments,
            paid: round2(paid),
            pending,
            status,
        }
    }
}
