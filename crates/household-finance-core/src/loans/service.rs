//! Loan API over the tabular store: create/update, disbursement, payment
//! registration, detail, suggestions, listing.
//!
//! Every mutation validates and checks conflicts before its first write,
//! holds the "loans" advisory lock for its whole read-modify-write span,
//! and orders writes so a partial failure leaves re-derivable state
//! (installments regenerate from the header; payments are append-only).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::dates::{
    format_date, format_datetime, normalize_iso, parse_datetime, parse_required_date,
};
use crate::error::LedgerError;
use crate::store::lock::LockRegistry;
use crate::store::TabularStore;
use crate::types::{non_negative, round2, Money, Rate, BALANCE_EPSILON};
use crate::LedgerResult;

use super::arrears::{daily_penalty_rate, project, InstallmentView};
use super::model::{
    AdminFee, Installment, Loan, LoanOrigin, LoanPayment, LoanStatus, PenaltyMode,
    INSTALLMENT_FIELDS, LOAN_FIELDS, LOAN_PAYMENT_FIELDS,
};
use super::schedule::{build_schedule, Schedule, ScheduleParams};
use super::status::{derive_loan_status, InstallmentStatus};
use super::waterfall::allocate;

/// Mutation scope for the loan subsystem.
pub const LOANS_LOCK: &str = "loans";

pub struct LoanService {
    store: Arc<dyn TabularStore>,
    locks: Arc<LockRegistry>,
    config: StoreConfig,
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoanSpec {
    /// Present on update; a fresh id is assigned otherwise.
    pub id: Option<String>,
    pub origin: Option<String>,
    pub borrower_id: String,
    pub borrower_name: Option<String>,
    pub principal: Money,
    pub term_months: u32,
    pub monthly_rate: Rate,
    /// "25" (default), "50", or "manual".
    pub penalty_mode: Option<String>,
    pub manual_penalty_rate: Option<Rate>,
    /// "flat" (default) or "percent".
    pub fee_kind: Option<String>,
    pub fee_value: Option<Decimal>,
    pub disbursed_on: Option<String>,
    pub payment_day: Option<u32>,
    pub status: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedLoan {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DisbursementRequest {
    /// Datetime (or date) of the disbursement; defaults to now.
    pub at: Option<String>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisbursementSummary {
    pub id: String,
    pub status: LoanStatus,
    pub disbursed_on: NaiveDate,
    pub disbursed_at: String,
    pub first_due_date: NaiveDate,
    pub level_payment: Money,
    pub total_interest_estimate: Money,
    pub total_payable_estimate: Money,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentRequest {
    pub amount: Money,
    /// Datetime (or date) of the payment; defaults to now.
    pub at: Option<String>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestMode {
    NextInstallment,
    SpecificInstallment,
    SettleToday,
    FreeAmount,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SuggestRequest {
    pub installment_id: Option<String>,
    pub number: Option<u32>,
    pub amount: Option<Money>,
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPreview {
    pub amount: Money,
    pub penalty: Money,
    pub interest: Money,
    pub principal: Money,
    pub credit_balance: Money,
    pub allocations: Vec<super::model::InstallmentAllocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedPayment {
    pub loan_id: String,
    pub mode: SuggestMode,
    pub as_of: NaiveDate,
    pub amount: Money,
    pub summary: LoanSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PaymentPreview>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingInstallment {
    pub number: u32,
    pub due_date: NaiveDate,
    pub total_pending: Money,
    pub penalty_pending: Money,
    pub interest_pending: Money,
    pub principal_pending: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanSummary {
    pub base_pending: Money,
    pub penalty_pending: Money,
    pub total_pending: Money,
    /// Unpaid principal across the schedule.
    pub principal_outstanding: Money,
    pub overdue_count: u32,
    pub overdue_amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Money,
    pub upcoming: Vec<UpcomingInstallment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub system_status: LoanStatus,
    pub installments: Vec<InstallmentView>,
    pub payments: Vec<LoanPayment>,
    pub summary: LoanSummary,
}

#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub person_id: Option<String>,
    /// "requested" | "granted"; anything else (or None) lists all.
    pub origin: Option<String>,
    /// Administrative status name, or operative "active"/"finalized".
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub query: Option<String>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanListItem {
    #[serde(flatten)]
    pub loan: Loan,
    pub system_status: LoanStatus,
    pub principal_outstanding: Money,
    pub base_pending: Money,
    pub penalty_pending: Money,
    pub total_pending: Money,
    pub overdue_count: u32,
    pub overdue_amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Money,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

impl LoanService {
    pub fn new(
        store: Arc<dyn TabularStore>,
        locks: Arc<LockRegistry>,
        config: StoreConfig,
    ) -> LedgerResult<Self> {
        store.ensure_collection(&config.loans, LOAN_FIELDS)?;
        store.ensure_collection(&config.loan_installments, INSTALLMENT_FIELDS)?;
        store.ensure_collection(&config.loan_payments, LOAN_PAYMENT_FIELDS)?;
        Ok(LoanService {
            store,
            locks,
            config,
        })
    }

    /// Create a loan or update one that has not yet been paid against.
    /// (Re)generates the amortization schedule as a full replacement set.
    pub fn create_or_update(&self, spec: LoanSpec) -> LedgerResult<SavedLoan> {
        let borrower_id = spec.borrower_id.trim().to_string();
        if borrower_id.is_empty() {
            return Err(LedgerError::validation("borrower_id", "select a person"));
        }
        if spec.principal <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "principal",
                "amount must be greater than 0",
            ));
        }
        if spec.term_months == 0 {
            return Err(LedgerError::validation(
                "term_months",
                "term must be at least 1 month",
            ));
        }
        if spec.monthly_rate < Decimal::ZERO {
            return Err(LedgerError::validation(
                "monthly_rate",
                "monthly rate cannot be negative",
            ));
        }

        let disbursed_on = match spec.disbursed_on.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_required_date(raw, "disbursed_on")?,
            _ => today(),
        };
        let payment_day = spec.payment_day.unwrap_or(1).clamp(1, 28);
        let penalty_mode = PenaltyMode::parse(spec.penalty_mode.as_deref().unwrap_or(""));
        let manual_rate = spec.manual_penalty_rate.unwrap_or(Decimal::ZERO);
        if penalty_mode == PenaltyMode::Manual && manual_rate < Decimal::ZERO {
            return Err(LedgerError::validation(
                "manual_penalty_rate",
                "penalty rate cannot be negative",
            ));
        }
        let penalty_monthly_rate = penalty_mode.monthly_penalty_rate(spec.monthly_rate, manual_rate);
        let admin_fee = AdminFee::parse(
            spec.fee_kind.as_deref().unwrap_or("flat"),
            spec.fee_value.unwrap_or(Decimal::ZERO),
        );
        let admin_fee_amount = admin_fee.amount(spec.principal);

        let schedule = build_schedule(&ScheduleParams {
            principal: spec.principal,
            term_months: spec.term_months,
            monthly_rate: spec.monthly_rate,
            disbursed_on,
            payment_day,
        })?;

        let _guard = self.locks.acquire(LOANS_LOCK, self.config.lock_wait())?;

        let id = match spec.id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let existing = self.find_loan(&id)?;
        if existing.is_some() {
            self.guard_schedule_untouched(&id)?;
        }
        let now = now_string();
        let user = spec.user.clone().unwrap_or_default();
        let borrower_name = match spec.borrower_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.person_name(&borrower_id)?,
        };
        let status = spec
            .status
            .as_deref()
            .map(LoanStatus::parse)
            .or(existing.as_ref().map(|l| l.status))
            .unwrap_or(LoanStatus::Draft);

        let loan = Loan {
            id: id.clone(),
            origin: LoanOrigin::parse(spec.origin.as_deref().unwrap_or("")),
            borrower_id,
            borrower_name,
            principal: round2(spec.principal),
            term_months: spec.term_months,
            monthly_rate: spec.monthly_rate,
            penalty_mode,
            penalty_monthly_rate,
            admin_fee,
            admin_fee_amount,
            disbursed_on: Some(disbursed_on),
            disbursed_at: existing
                .as_ref()
                .map(|l| l.disbursed_at.clone())
                .unwrap_or_default(),
            disbursement_method: existing
                .as_ref()
                .map(|l| l.disbursement_method.clone())
                .unwrap_or_default(),
            disbursement_reference: existing
                .as_ref()
                .map(|l| l.disbursement_reference.clone())
                .unwrap_or_default(),
            disbursement_note: existing
                .as_ref()
                .map(|l| l.disbursement_note.clone())
                .unwrap_or_default(),
            first_due_date: Some(schedule.first_due_date),
            payment_day,
            level_payment: schedule.level_payment,
            total_interest_estimate: schedule.total_interest,
            total_payable_estimate: round2(
                spec.principal + schedule.total_interest + admin_fee_amount,
            ),
            status,
            created_by: existing
                .as_ref()
                .map(|l| l.created_by.clone())
                .unwrap_or_else(|| user.clone()),
            created_at: existing
                .as_ref()
                .map(|l| l.created_at.clone())
                .unwrap_or_else(|| now.clone()),
            updated_by: user,
            updated_at: now.clone(),
        };

        self.persist_loan(&loan)?;
        self.replace_installments(&loan.id, &schedule, &now)?;
        self.store.flush()?;
        info!(loan = %loan.id, principal = %loan.principal, "loan saved");
        Ok(SavedLoan { id })
    }

    /// Register the real disbursement: rebuilds the schedule from the
    /// actual date and activates the loan. Forbidden once any payment or
    /// allocation exists.
    pub fn register_disbursement(
        &self,
        id: &str,
        req: DisbursementRequest,
    ) -> LedgerResult<DisbursementSummary> {
        let _guard = self.locks.acquire(LOANS_LOCK, self.config.lock_wait())?;

        let loan = self.load_loan(id)?;
        match loan.status {
            LoanStatus::Cancelled => {
                return Err(LedgerError::StateConflict("this loan is cancelled".into()))
            }
            LoanStatus::Finalized => {
                return Err(LedgerError::StateConflict(
                    "this loan is already finalized".into(),
                ))
            }
            _ => {}
        }
        self.guard_schedule_untouched(&loan.id)?;

        let at = req
            .at
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or_else(|| Local::now().naive_local());
        let disbursed_on = at.date();
        let disbursed_at = format_datetime(at);

        let schedule = build_schedule(&ScheduleParams {
            principal: loan.principal,
            term_months: loan.term_months.max(1),
            monthly_rate: loan.monthly_rate,
            disbursed_on,
            payment_day: loan.payment_day.clamp(1, 28),
        })?;

        let now = now_string();
        let updated = Loan {
            disbursed_on: Some(disbursed_on),
            disbursed_at: disbursed_at.clone(),
            disbursement_method: req.method.unwrap_or_default(),
            disbursement_reference: req.reference.unwrap_or_default(),
            disbursement_note: req.note.unwrap_or_default(),
            first_due_date: Some(schedule.first_due_date),
            level_payment: schedule.level_payment,
            total_interest_estimate: schedule.total_interest,
            total_payable_estimate: round2(
                loan.principal + schedule.total_interest + loan.admin_fee_amount,
            ),
            status: LoanStatus::Active,
            updated_by: req.user.unwrap_or_default(),
            updated_at: now.clone(),
            ..loan
        };

        self.persist_loan(&updated)?;
        self.replace_installments(&updated.id, &schedule, &now)?;
        self.store.flush()?;
        info!(loan = %updated.id, on = %disbursed_on, "disbursement registered");

        Ok(DisbursementSummary {
            id: updated.id,
            status: LoanStatus::Active,
            disbursed_on,
            disbursed_at,
            first_due_date: schedule.first_due_date,
            level_payment: schedule.level_payment,
            total_interest_estimate: schedule.total_interest,
            total_payable_estimate: updated.total_payable_estimate,
        })
    }

    /// Register a payment: bring penalties current as of the payment date,
    /// run the waterfall, persist the touched installments and append the
    /// payment with its allocation breakdown.
    pub fn register_payment(&self, id: &str, req: PaymentRequest) -> LedgerResult<LoanPayment> {
        let amount = round2(req.amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "amount",
                "amount must be greater than 0",
            ));
        }

        let _guard = self.locks.acquire(LOANS_LOCK, self.config.lock_wait())?;

        let loan = self.load_loan(id)?;
        match loan.status {
            LoanStatus::Cancelled => {
                return Err(LedgerError::StateConflict("this loan is cancelled".into()))
            }
            LoanStatus::Finalized => {
                return Err(LedgerError::StateConflict(
                    "this loan is already finalized".into(),
                ))
            }
            _ => {}
        }
        if loan.origin == LoanOrigin::Granted && loan.disbursed_at.is_empty() {
            return Err(LedgerError::StateConflict(
                "register the disbursement before registering payments".into(),
            ));
        }

        let mut installments = self.load_installments(&loan.id)?;
        if installments.is_empty() {
            return Err(LedgerError::StateConflict(
                "this loan has no installment schedule".into(),
            ));
        }

        let at = req
            .at
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or_else(|| Local::now().naive_local());
        let as_of = at.date();
        let daily_rate = daily_penalty_rate(loan.penalty_monthly_rate);

        let outcome = allocate(amount, as_of, daily_rate, &mut installments);

        let now = now_string();
        for inst in &mut installments {
            inst.updated_at = now.clone();
            self.store.upsert_record(
                &self.config.loan_installments,
                &inst.id,
                inst.to_record().fields,
            )?;
        }

        // Opportunistic status cache refresh, operative statuses only.
        let total_pending: Money = installments.iter().map(Installment::total_pending).sum();
        let derived = derive_loan_status(round2(total_pending));
        if loan.status.is_operative() && loan.status != derived {
            let refreshed = Loan {
                status: derived,
                updated_at: now.clone(),
                ..loan.clone()
            };
            self.persist_loan(&refreshed)?;
        }

        let payment = LoanPayment {
            id: Uuid::new_v4().to_string(),
            loan_id: loan.id.clone(),
            at: format_datetime(at),
            amount,
            method: req.method.unwrap_or_default(),
            reference: req.reference.unwrap_or_default(),
            note: req.note.unwrap_or_default(),
            penalty_charged: outcome.penalty_applied,
            interest_charged: outcome.interest_applied,
            principal_charged: outcome.principal_applied,
            credit_balance: outcome.credit_balance,
            allocations: outcome.allocations,
        };
        self.store.upsert_record(
            &self.config.loan_payments,
            &payment.id,
            payment.to_record().fields,
        )?;
        self.store.flush()?;
        info!(
            loan = %loan.id,
            amount = %amount,
            credit = %payment.credit_balance,
            "payment registered"
        );
        Ok(payment)
    }

    /// Full loan view with installments projected to `as_of`, the payment
    /// ledger, and derived aggregates. Refreshes the cached status when the
    /// loan is in an operative state.
    pub fn detail(&self, id: &str, as_of: Option<NaiveDate>) -> LedgerResult<LoanDetail> {
        let mut loan = self.load_loan(id)?;
        let as_of = as_of.unwrap_or_else(today);
        let daily_rate = daily_penalty_rate(loan.penalty_monthly_rate);

        let installments = self.load_installments(&loan.id)?;
        let views: Vec<InstallmentView> = installments
            .iter()
            .map(|inst| project(inst, daily_rate, as_of))
            .collect();
        let summary = build_summary(&views, as_of);
        let system_status = derive_loan_status(summary.total_pending);

        if loan.status.is_operative() && loan.status != system_status {
            let refreshed = Loan {
                status: system_status,
                updated_at: now_string(),
                ..loan.clone()
            };
            self.persist_loan(&refreshed)?;
            loan = refreshed;
            debug!(loan = %loan.id, status = ?system_status, "status cache refreshed");
        }

        Ok(LoanDetail {
            payments: self.load_payments(&loan.id)?,
            loan,
            system_status,
            installments: views,
            summary,
        })
    }

    /// Suggest a payment amount and preview its allocation without writing
    /// anything.
    pub fn suggest_payment(
        &self,
        id: &str,
        mode: SuggestMode,
        req: SuggestRequest,
    ) -> LedgerResult<SuggestedPayment> {
        let loan = self.load_loan(id)?;
        let as_of = match req.as_of.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_required_date(raw, "as_of")?,
            _ => today(),
        };
        let daily_rate = daily_penalty_rate(loan.penalty_monthly_rate);

        let installments = self.load_installments(&loan.id)?;
        if installments.is_empty() {
            return Err(LedgerError::StateConflict(
                "this loan has no installment schedule".into(),
            ));
        }
        let views: Vec<InstallmentView> = installments
            .iter()
            .map(|inst| project(inst, daily_rate, as_of))
            .collect();
        let summary = build_summary(&views, as_of);

        let mut warnings = Vec::new();
        let amount = match mode {
            SuggestMode::SettleToday => summary.total_pending,
            SuggestMode::FreeAmount => round2(non_negative(req.amount.unwrap_or(Decimal::ZERO))),
            SuggestMode::NextInstallment => views
                .iter()
                .find(|v| v.total_pending > BALANCE_EPSILON)
                .map(|v| v.total_pending)
                .unwrap_or(Decimal::ZERO),
            SuggestMode::SpecificInstallment => {
                let target = views
                    .iter()
                    .find(|v| {
                        req.installment_id
                            .as_deref()
                            .map(|wanted| v.installment.id == wanted)
                            .unwrap_or(false)
                            || req
                                .number
                                .map(|wanted| v.installment.number == wanted)
                                .unwrap_or(false)
                    })
                    .ok_or_else(|| LedgerError::NotFound {
                        entity: "installment",
                        id: req
                            .installment_id
                            .clone()
                            .unwrap_or_else(|| req.number.unwrap_or(0).to_string()),
                    })?;
                let earlier_pending = views.iter().any(|v| {
                    v.installment.number < target.installment.number
                        && v.total_pending > BALANCE_EPSILON
                });
                if earlier_pending {
                    warnings.push(
                        "earlier installments are pending; payments always apply to the \
                         oldest installment first"
                            .to_string(),
                    );
                }
                round2(
                    views
                        .iter()
                        .filter(|v| v.installment.number <= target.installment.number)
                        .map(|v| v.total_pending)
                        .sum::<Money>(),
                )
            }
        };
        let amount = round2(amount);

        let preview = if amount > Decimal::ZERO {
            let mut scratch = installments.clone();
            let outcome = allocate(amount, as_of, daily_rate, &mut scratch);
            if outcome.credit_balance > BALANCE_EPSILON {
                warnings.push(
                    "the amount exceeds everything pending; a credit balance will remain"
                        .to_string(),
                );
            }
            Some(PaymentPreview {
                amount,
                penalty: outcome.penalty_applied,
                interest: outcome.interest_applied,
                principal: outcome.principal_applied,
                credit_balance: outcome.credit_balance,
                allocations: outcome.allocations,
            })
        } else {
            None
        };

        Ok(SuggestedPayment {
            loan_id: loan.id,
            mode,
            as_of,
            amount,
            summary,
            preview,
            warnings,
        })
    }

    /// Filtered listing enriched with read-time aggregates. Does not
    /// persist anything.
    pub fn list(&self, filter: &LoanFilter) -> LedgerResult<Vec<LoanListItem>> {
        let as_of = filter.as_of.unwrap_or_else(today);
        let origin = filter
            .origin
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(LoanOrigin::parse);
        let status_filter = filter
            .status
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let operative_filter = matches!(status_filter.as_deref(), Some("active") | Some("finalized"));
        let from = filter.from.as_deref().map(normalize_iso).unwrap_or_default();
        let to = filter.to.as_deref().map(normalize_iso).unwrap_or_default();
        let query = filter
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .unwrap_or_default();

        let mut loans: Vec<Loan> = self
            .store
            .list_records(&self.config.loans)?
            .iter()
            .filter_map(Loan::from_record)
            .filter(|loan| {
                if let Some(wanted) = origin {
                    if loan.origin != wanted {
                        return false;
                    }
                }
                if let Some(person) = filter.person_id.as_deref().map(str::trim) {
                    if !person.is_empty() && loan.borrower_id != person {
                        return false;
                    }
                }
                if let Some(ref wanted) = status_filter {
                    if !operative_filter
                        && loan.status.as_str().to_lowercase() != *wanted
                    {
                        return false;
                    }
                }
                let disbursed = loan.disbursed_on.map(format_date).unwrap_or_default();
                if !from.is_empty() && !disbursed.is_empty() && disbursed < from {
                    return false;
                }
                if !to.is_empty() && !disbursed.is_empty() && disbursed > to {
                    return false;
                }
                if !query.is_empty() {
                    let haystack = format!(
                        "{} {} {}",
                        loan.id, loan.borrower_name, loan.borrower_id
                    )
                    .to_lowercase();
                    if !haystack.contains(&query) {
                        return false;
                    }
                }
                true
            })
            .collect();

        // One pass over all installments, bucketed by loan.
        let mut by_loan: HashMap<String, Vec<Installment>> = HashMap::new();
        for record in self.store.list_records(&self.config.loan_installments)? {
            if let Some(inst) = Installment::from_record(&record) {
                by_loan.entry(inst.loan_id.clone()).or_default().push(inst);
            }
        }

        loans.sort_by(|a, b| {
            let da = a.disbursed_on.map(format_date).unwrap_or_default();
            let db = b.disbursed_on.map(format_date).unwrap_or_default();
            db.cmp(&da).then_with(|| b.id.cmp(&a.id))
        });

        let mut out = Vec::with_capacity(loans.len());
        for loan in loans {
            let daily_rate = daily_penalty_rate(loan.penalty_monthly_rate);
            let mut installments = by_loan.remove(&loan.id).unwrap_or_default();
            installments.sort_by_key(|i| i.number);
            let views: Vec<InstallmentView> = installments
                .iter()
                .map(|inst| project(inst, daily_rate, as_of))
                .collect();
            let summary = build_summary(&views, as_of);
            let system_status = derive_loan_status(summary.total_pending);

            if operative_filter {
                if let Some(ref wanted) = status_filter {
                    if system_status.as_str().to_lowercase() != *wanted {
                        continue;
                    }
                }
            }

            out.push(LoanListItem {
                loan,
                system_status,
                principal_outstanding: summary.principal_outstanding,
                base_pending: summary.base_pending,
                penalty_pending: summary.penalty_pending,
                total_pending: summary.total_pending,
                overdue_count: summary.overdue_count,
                overdue_amount: summary.overdue_amount,
                next_due_date: summary.next_due_date,
                next_due_amount: summary.next_due_amount,
            });
        }
        Ok(out)
    }

    /// Remove a loan header and its installment set. The payment ledger is
    /// append-only and is deliberately not pruned.
    pub fn delete(&self, id: &str) -> LedgerResult<()> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.acquire(LOANS_LOCK, self.config.lock_wait())?;
        self.store.delete_record(&self.config.loans, id)?;
        for record in self.store.list_records(&self.config.loan_installments)? {
            if record.get("loan_id").trim() == id {
                self.store
                    .delete_record(&self.config.loan_installments, &record.key)?;
            }
        }
        self.store.flush()?;
        info!(loan = %id, "loan deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn find_loan(&self, id: &str) -> LedgerResult<Option<Loan>> {
        Ok(self
            .store
            .list_records(&self.config.loans)?
            .iter()
            .filter_map(Loan::from_record)
            .find(|l| l.id == id))
    }

    fn load_loan(&self, id: &str) -> LedgerResult<Loan> {
        self.find_loan(id.trim())?.ok_or_else(|| LedgerError::NotFound {
            entity: "loan",
            id: id.trim().to_string(),
        })
    }

    fn load_installments(&self, loan_id: &str) -> LedgerResult<Vec<Installment>> {
        let mut out: Vec<Installment> = self
            .store
            .list_records(&self.config.loan_installments)?
            .iter()
            .filter_map(Installment::from_record)
            .filter(|i| i.loan_id == loan_id)
            .collect();
        out.sort_by_key(|i| i.number);
        Ok(out)
    }

    fn load_payments(&self, loan_id: &str) -> LedgerResult<Vec<LoanPayment>> {
        let mut out: Vec<LoanPayment> = self
            .store
            .list_records(&self.config.loan_payments)?
            .iter()
            .filter_map(LoanPayment::from_record)
            .filter(|p| p.loan_id == loan_id)
            .collect();
        out.sort_by(|a, b| b.at.cmp(&a.at));
        Ok(out)
    }

    /// Reject schedule regeneration once any payment or allocation exists.
    fn guard_schedule_untouched(&self, loan_id: &str) -> LedgerResult<()> {
        let has_payments = self
            .store
            .list_records(&self.config.loan_payments)?
            .iter()
            .any(|r| r.get("loan_id").trim() == loan_id);
        if has_payments {
            return Err(LedgerError::StateConflict(
                "this loan already has payments; its schedule cannot be regenerated".into(),
            ));
        }
        let touched = self.load_installments(loan_id)?.iter().any(|i| {
            i.interest_paid > Decimal::ZERO
                || i.principal_paid > Decimal::ZERO
                || i.penalty_paid > Decimal::ZERO
        });
        if touched {
            return Err(LedgerError::StateConflict(
                "installments already carry allocations; the schedule cannot be regenerated"
                    .into(),
            ));
        }
        Ok(())
    }

    fn replace_installments(
        &self,
        loan_id: &str,
        schedule: &Schedule,
        now: &str,
    ) -> LedgerResult<()> {
        for record in self.store.list_records(&self.config.loan_installments)? {
            if record.get("loan_id").trim() == loan_id {
                self.store
                    .delete_record(&self.config.loan_installments, &record.key)?;
            }
        }
        for scheduled in &schedule.installments {
            let inst = Installment {
                id: Uuid::new_v4().to_string(),
                loan_id: loan_id.to_string(),
                number: scheduled.number,
                due_date: Some(scheduled.due_date),
                payment: scheduled.payment,
                interest: scheduled.interest,
                principal: scheduled.principal,
                balance_after: scheduled.balance_after,
                interest_paid: Decimal::ZERO,
                principal_paid: Decimal::ZERO,
                penalty_accrued: Decimal::ZERO,
                penalty_paid: Decimal::ZERO,
                penalty_through: Some(scheduled.due_date),
                status: InstallmentStatus::Pending,
                created_at: now.to_string(),
                updated_at: now.to_string(),
            };
            self.store.upsert_record(
                &self.config.loan_installments,
                &inst.id,
                inst.to_record().fields,
            )?;
        }
        Ok(())
    }

    fn persist_loan(&self, loan: &Loan) -> LedgerResult<()> {
        self.store
            .upsert_record(&self.config.loans, &loan.id, loan.to_record().fields)
    }

    fn person_name(&self, person_id: &str) -> LedgerResult<String> {
        Ok(self
            .store
            .list_records(&self.config.persons)?
            .iter()
            .find(|r| r.get("id").trim() == person_id)
            .map(|r| r.get("name").trim().to_string())
            .unwrap_or_default())
    }
}

/// Aggregate the projected views into the per-loan summary.
fn build_summary(views: &[InstallmentView], as_of: NaiveDate) -> LoanSummary {
    let mut base_pending = Decimal::ZERO;
    let mut penalty_pending = Decimal::ZERO;
    let mut total_pending = Decimal::ZERO;
    let mut principal_outstanding = Decimal::ZERO;
    let mut overdue_count = 0u32;
    let mut overdue_amount = Decimal::ZERO;
    let mut upcoming = Vec::new();

    for view in views {
        base_pending = round2(base_pending + view.interest_pending + view.principal_pending);
        penalty_pending = round2(penalty_pending + view.penalty_pending);
        total_pending = round2(total_pending + view.total_pending);
        principal_outstanding = round2(principal_outstanding + view.principal_pending);

        if view.status_as_of == InstallmentStatus::Overdue {
            overdue_count += 1;
            overdue_amount = round2(overdue_amount + view.total_pending);
        }
        if view.status_as_of != InstallmentStatus::Paid {
            if let Some(due) = view.installment.due_date {
                if due >= as_of {
                    upcoming.push(UpcomingInstallment {
                        number: view.installment.number,
                        due_date: due,
                        total_pending: view.total_pending,
                        penalty_pending: view.penalty_pending,
                        interest_pending: view.interest_pending,
                        principal_pending: view.principal_pending,
                    });
                }
            }
        }
    }

    upcoming.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.number.cmp(&b.number)));
    upcoming.truncate(3);
    let (next_due_date, next_due_amount) = upcoming
        .first()
        .map(|u| (Some(u.due_date), u.total_pending))
        .unwrap_or((None, Decimal::ZERO));

    LoanSummary {
        base_pending,
        penalty_pending,
        total_pending,
        principal_outstanding,
        overdue_count,
        overdue_amount,
        next_due_date,
        next_due_amount,
        upcoming,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn now_string() -> String {
    format_datetime(Local::now().naive_local())
}
