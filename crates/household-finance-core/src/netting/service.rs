//! Debt CRUD and the Netting API: per-person balances, the settlement
//! plan, and the dashboard summary.
//!
//! Read paths are tolerant of a half-provisioned store (absent collections
//! read as empty) and of historical rows without person ids: those
//! resolve through the directory or fall back to deterministic synthetic
//! identities instead of being dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::dates::{
    format_date, format_datetime, normalize_iso, normalize_period, parse_date, period_range,
};
use crate::error::LedgerError;
use crate::persons::{PersonDirectory, PersonRegistry, EXPENSES_LOCK};
use crate::store::lock::LockRegistry;
use crate::store::TabularStore;
use crate::types::{round2, Money};
use crate::LedgerResult;

use super::engine::{net_positions, settlement_plan, SettlementPlan, NET_EPSILON};
use super::model::{Debt, DebtPayment, DebtView, DEBT_FIELDS, DEBT_PAYMENT_FIELDS};

pub struct ExpenseService {
    store: Arc<dyn TabularStore>,
    locks: Arc<LockRegistry>,
    config: StoreConfig,
    persons: PersonRegistry,
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebtSpec {
    /// Present on update; a fresh id is assigned otherwise.
    pub id: Option<String>,
    pub kind: Option<String>,
    pub date: Option<String>,
    pub debtor_id: Option<String>,
    pub debtor_name: Option<String>,
    pub creditor_id: Option<String>,
    pub creditor_name: Option<String>,
    pub description: Option<String>,
    pub amount: Money,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedDebt {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebtFilter {
    /// `YYYY-MM`; expands to that month's date range unless from/to are
    /// given explicitly.
    pub period: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub person_id: Option<String>,
    pub kind: Option<String>,
    /// Derived status name: "pending" | "partial" | "paid".
    pub status: Option<String>,
    pub include_paid: Option<bool>,
    pub query: Option<String>,
}

/// Date window a filter resolved to, echoed back to the caller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedWindow {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub period: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonBalance {
    pub person_id: String,
    pub person_name: String,
    /// Pending amount this person still owes others.
    pub as_debtor: Money,
    /// Pending amount others still owe this person.
    pub as_creditor: Money,
    pub payments_made: Money,
    pub payments_received: Money,
    /// `as_creditor - as_debtor`.
    pub net: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCards {
    pub total_amount: Money,
    pub total_paid: Money,
    pub total_pending: Money,
    pub creditor_count: u32,
    pub creditor_amount: Money,
    pub debtor_count: u32,
    pub debtor_amount: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub cards: DashboardCards,
    pub balance: Vec<PersonBalance>,
    /// Normalized names shared by two ids; such rows resolve synthetically.
    pub ambiguous_names: usize,
    pub window: ResolvedWindow,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    #[serde(flatten)]
    pub plan: SettlementPlan,
    pub window: ResolvedWindow,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

impl ExpenseService {
    pub fn new(
        store: Arc<dyn TabularStore>,
        locks: Arc<LockRegistry>,
        config: StoreConfig,
    ) -> LedgerResult<Self> {
        store.ensure_collection(&config.debts, DEBT_FIELDS)?;
        store.ensure_collection(&config.debt_payments, DEBT_PAYMENT_FIELDS)?;
        let persons = PersonRegistry::new(store.clone(), locks.clone(), config.clone())?;
        Ok(ExpenseService {
            store,
            locks,
            config,
            persons,
        })
    }

    pub fn persons(&self) -> &PersonRegistry {
        &self.persons
    }

    /// Create or update a debt. Identities resolve through the directory;
    /// a name with no id becomes a deterministic synthetic identity.
    pub fn save_debt(&self, spec: DebtSpec) -> LedgerResult<SavedDebt> {
        if spec.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "amount",
                "amount must be greater than 0",
            ));
        }
        let directory = self.persons.directory()?;
        let debtor = directory
            .resolve(
                spec.debtor_id.as_deref().unwrap_or(""),
                spec.debtor_name.as_deref().unwrap_or(""),
            )
            .ok_or_else(|| LedgerError::validation("debtor", "select the person who owes"))?;
        let creditor = directory
            .resolve(
                spec.creditor_id.as_deref().unwrap_or(""),
                spec.creditor_name.as_deref().unwrap_or(""),
            )
            .ok_or_else(|| LedgerError::validation("creditor", "select the person owed"))?;
        let debtor_id = debtor.canonical_id();
        let creditor_id = creditor.canonical_id();
        if debtor_id == creditor_id {
            return Err(LedgerError::validation(
                "creditor",
                "debtor and creditor must be different people",
            ));
        }

        let _guard = self.locks.acquire(EXPENSES_LOCK, self.config.lock_wait())?;

        let id = match spec.id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let existing = self
            .store
            .list_records(&self.config.debts)?
            .iter()
            .filter_map(Debt::from_record)
            .find(|d| d.id == id);

        let debtor_name = display_name(&directory, &debtor_id, spec.debtor_name.as_deref());
        let creditor_name = display_name(&directory, &creditor_id, spec.creditor_name.as_deref());

        let debt = Debt {
            id: id.clone(),
            kind: spec.kind.unwrap_or_default().trim().to_string(),
            date: spec.date.as_deref().and_then(parse_date),
            debtor_id,
            debtor_name,
            creditor_id,
            creditor_name,
            description: spec.description.unwrap_or_default().trim().to_string(),
            amount: round2(spec.amount),
            created_by: spec.user.unwrap_or_default(),
            created_at: existing
                .map(|d| d.created_at)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(now_string),
        };
        self.store
            .upsert_record(&self.config.debts, &debt.id, debt.to_record().fields)?;
        // Barrier: the next read must see this write.
        self.store.flush()?;
        info!(debt = %debt.id, amount = %debt.amount, "debt saved");
        Ok(SavedDebt { id })
    }

    /// Record a partial payment against a debt.
    pub fn record_payment(
        &self,
        debt_id: &str,
        amount: Money,
        date: Option<&str>,
        note: Option<&str>,
        recorded_by: Option<&str>,
    ) -> LedgerResult<SavedDebt> {
        let debt_id = debt_id.trim();
        if debt_id.is_empty() {
            return Err(LedgerError::validation("debt_id", "debt id is required"));
        }
        let amount = round2(amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "amount",
                "amount must be greater than 0",
            ));
        }

        let _guard = self.locks.acquire(EXPENSES_LOCK, self.config.lock_wait())?;

        let exists = self
            .store
            .list_records(&self.config.debts)?
            .iter()
            .any(|r| r.get("id").trim() == debt_id);
        if !exists {
            return Err(LedgerError::NotFound {
                entity: "debt",
                id: debt_id.to_string(),
            });
        }

        let payment = DebtPayment {
            id: Uuid::new_v4().to_string(),
            debt_id: debt_id.to_string(),
            amount,
            date: date.and_then(parse_date).or_else(|| Some(today())),
            note: note.unwrap_or_default().trim().to_string(),
            recorded_by: recorded_by.unwrap_or_default().trim().to_string(),
        };
        self.store.upsert_record(
            &self.config.debt_payments,
            &payment.id,
            payment.to_record().fields,
        )?;
        self.store.flush()?;
        info!(debt = %debt_id, amount = %amount, "debt payment recorded");
        Ok(SavedDebt { id: payment.id })
    }

    /// Delete a debt together with its payment details.
    pub fn delete_debt(&self, id: &str) -> LedgerResult<()> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.acquire(EXPENSES_LOCK, self.config.lock_wait())?;
        self.store.delete_record(&self.config.debts, id)?;
        for record in self.store.list_records(&self.config.debt_payments)? {
            if record.get("debt_id").trim() == id {
                self.store
                    .delete_record(&self.config.debt_payments, &record.key)?;
            }
        }
        self.store.flush()?;
        info!(debt = %id, "debt deleted");
        Ok(())
    }

    /// Filtered debt listing with derived balances, date desc then kind.
    pub fn list_debts(&self, filter: &DebtFilter) -> LedgerResult<Vec<DebtView>> {
        let (views, _) = self.filtered_views(filter)?;
        Ok(views)
    }

    /// Net balance per person with its breakdown. Directory persons appear
    /// even when they have no movements.
    pub fn balance_per_person(&self, filter: &DebtFilter) -> LedgerResult<Vec<PersonBalance>> {
        let directory = self.persons.directory()?;
        let (views, _) = self.filtered_views_with_directory(filter, &directory)?;
        Ok(balance_rows(&views, &directory, filter.person_id.as_deref()))
    }

    /// Settlement plan over the filtered pending debts. When a person
    /// filter is set, only transfers touching that person are returned.
    pub fn compute_settlement_plan(&self, filter: &DebtFilter) -> LedgerResult<SettlementReport> {
        let directory = self.persons.directory()?;
        let (views, window) = self.filtered_views_with_directory(filter, &directory)?;
        let positions = net_positions(&views);
        let mut plan = settlement_plan(&positions);

        if let Some(person) = filter.person_id.as_deref().map(str::trim) {
            if !person.is_empty() {
                plan.transfers
                    .retain(|t| t.from_person_id == person || t.to_person_id == person);
                plan.total = round2(plan.transfers.iter().map(|t| t.amount).sum::<Money>());
            }
        }
        Ok(SettlementReport { plan, window })
    }

    /// Cards + per-person balance in one call.
    pub fn dashboard(&self, filter: &DebtFilter) -> LedgerResult<DashboardSummary> {
        let directory = self.persons.directory()?;
        let (views, window) = self.filtered_views_with_directory(filter, &directory)?;

        let total_amount = round2(views.iter().map(|v| v.debt.amount).sum::<Money>());
        let total_paid = round2(views.iter().map(|v| v.paid).sum::<Money>());
        let total_pending = round2(views.iter().map(|v| v.pending).sum::<Money>());

        let mut creditor_count = 0u32;
        let mut creditor_amount = Decimal::ZERO;
        let mut debtor_count = 0u32;
        let mut debtor_amount = Decimal::ZERO;
        for position in net_positions(&views) {
            if let Some(person) = filter.person_id.as_deref().map(str::trim) {
                if !person.is_empty() && position.person_id != person {
                    continue;
                }
            }
            if position.net > NET_EPSILON {
                creditor_count += 1;
                creditor_amount = round2(creditor_amount + position.net);
            } else if position.net < -NET_EPSILON {
                debtor_count += 1;
                debtor_amount = round2(debtor_amount + position.net.abs());
            }
        }

        Ok(DashboardSummary {
            cards: DashboardCards {
                total_amount,
                total_paid,
                total_pending,
                creditor_count,
                creditor_amount,
                debtor_count,
                debtor_amount,
            },
            balance: balance_rows(&views, &directory, filter.person_id.as_deref()),
            ambiguous_names: directory.ambiguous_name_count(),
            window,
            generated_at: now_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn filtered_views(&self, filter: &DebtFilter) -> LedgerResult<(Vec<DebtView>, ResolvedWindow)> {
        let directory = self.persons.directory()?;
        self.filtered_views_with_directory(filter, &directory)
    }

    fn filtered_views_with_directory(
        &self,
        filter: &DebtFilter,
        directory: &PersonDirectory,
    ) -> LedgerResult<(Vec<DebtView>, ResolvedWindow)> {
        let window = resolve_window(filter)?;

        let mut payments_by_debt: HashMap<String, Vec<DebtPayment>> = HashMap::new();
        for record in self.store.list_records(&self.config.debt_payments)? {
            if let Some(payment) = DebtPayment::from_record(&record) {
                payments_by_debt
                    .entry(payment.debt_id.clone())
                    .or_default()
                    .push(payment);
            }
        }

        let kind = filter
            .kind
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let status = filter
            .status
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let query = filter
            .query
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let person = filter
            .person_id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        let include_paid = filter.include_paid.unwrap_or(true);

        let mut views: Vec<DebtView> = Vec::new();
        for record in self.store.list_records(&self.config.debts)? {
            let Some(mut debt) = Debt::from_record(&record) else {
                continue;
            };
            // Resolve identities before any aggregation.
            if let Some(r) = directory.resolve(&debt.debtor_id, &debt.debtor_name) {
                debt.debtor_id = r.canonical_id();
            }
            if let Some(r) = directory.resolve(&debt.creditor_id, &debt.creditor_name) {
                debt.creditor_id = r.canonical_id();
            }
            debt.debtor_name = display_name(directory, &debt.debtor_id, Some(&debt.debtor_name));
            debt.creditor_name =
                display_name(directory, &debt.creditor_id, Some(&debt.creditor_name));

            let date = debt.date.map(format_date).unwrap_or_default();
            if !window.from.is_empty() && !date.is_empty() && date < window.from {
                continue;
            }
            if !window.to.is_empty() && !date.is_empty() && date > window.to {
                continue;
            }
            if !kind.is_empty() && debt.kind.to_lowercase() != kind {
                continue;
            }
            if !person.is_empty() && debt.debtor_id != person && debt.creditor_id != person {
                continue;
            }
            if !query.is_empty() {
                let haystack = format!(
                    "{} {} {} {}",
                    debt.kind, debt.description, debt.debtor_name, debt.creditor_name
                )
                .to_lowercase();
                if !haystack.contains(&query) {
                    continue;
                }
            }

            let payments = payments_by_debt.remove(&debt.id).unwrap_or_default();
            let view = DebtView::build(debt, payments);
            if !status.is_empty() && view.status.as_str().to_lowercase() != status {
                continue;
            }
            if !include_paid && view.pending <= crate::types::BALANCE_EPSILON {
                continue;
            }
            views.push(view);
        }

        views.sort_by(|a, b| {
            let da = a.debt.date.map(format_date).unwrap_or_default();
            let db = b.debt.date.map(format_date).unwrap_or_default();
            db.cmp(&da).then_with(|| a.debt.kind.cmp(&b.debt.kind))
        });
        Ok((views, window))
    }
}

/// Resolve the filter's period/from/to into a concrete window. A period
/// expands to its month; an explicit from/to wins over the period.
fn resolve_window(filter: &DebtFilter) -> LedgerResult<ResolvedWindow> {
    let period = filter
        .period
        .as_deref()
        .map(normalize_period)
        .unwrap_or_default();
    let mut from = filter
        .from
        .as_deref()
        .map(normalize_iso)
        .unwrap_or_default();
    let mut to = filter.to.as_deref().map(normalize_iso).unwrap_or_default();

    if (from.is_empty() || to.is_empty()) && !period.is_empty() {
        if let Some((first, last)) = period_range(&period) {
            if from.is_empty() {
                from = format_date(first);
            }
            if to.is_empty() {
                to = format_date(last);
            }
        }
    }
    if !from.is_empty() && !to.is_empty() && from > to {
        return Err(LedgerError::validation(
            "from",
            "invalid date range: from is after to",
        ));
    }
    Ok(ResolvedWindow { period, from, to })
}

fn balance_rows(
    views: &[DebtView],
    directory: &PersonDirectory,
    person_filter: Option<&str>,
) -> Vec<PersonBalance> {
    let mut rows: HashMap<String, PersonBalance> = HashMap::new();
    for (id, name) in directory.iter() {
        rows.insert(
            id.to_string(),
            PersonBalance {
                person_id: id.to_string(),
                person_name: name.to_string(),
                as_debtor: Decimal::ZERO,
                as_creditor: Decimal::ZERO,
                payments_made: Decimal::ZERO,
                payments_received: Decimal::ZERO,
                net: Decimal::ZERO,
            },
        );
    }
    let mut ensure = |rows: &mut HashMap<String, PersonBalance>, id: &str, name: &str| {
        rows.entry(id.to_string()).or_insert_with(|| PersonBalance {
            person_id: id.to_string(),
            person_name: if name.trim().is_empty() {
                "(unnamed)".to_string()
            } else {
                name.trim().to_string()
            },
            as_debtor: Decimal::ZERO,
            as_creditor: Decimal::ZERO,
            payments_made: Decimal::ZERO,
            payments_received: Decimal::ZERO,
            net: Decimal::ZERO,
        });
    };

    for view in views {
        let debtor_id = view.debt.debtor_id.trim().to_string();
        let creditor_id = view.debt.creditor_id.trim().to_string();
        if !debtor_id.is_empty() {
            ensure(&mut rows, &debtor_id, &view.debt.debtor_name);
            if let Some(row) = rows.get_mut(&debtor_id) {
                row.as_debtor = round2(row.as_debtor + view.pending);
                row.payments_made = round2(row.payments_made + view.paid);
            }
        }
        if !creditor_id.is_empty() {
            ensure(&mut rows, &creditor_id, &view.debt.creditor_name);
            if let Some(row) = rows.get_mut(&creditor_id) {
                row.as_creditor = round2(row.as_creditor + view.pending);
                row.payments_received = round2(row.payments_received + view.paid);
            }
        }
    }

    let mut out: Vec<PersonBalance> = rows
        .into_values()
        .map(|mut row| {
            row.net = round2(row.as_creditor - row.as_debtor);
            row
        })
        .collect();

    if let Some(person) = person_filter.map(str::trim) {
        if !person.is_empty() {
            out.retain(|r| r.person_id == person);
        }
    }

    out.sort_by(|a, b| {
        b.net
            .cmp(&a.net)
            .then_with(|| a.person_name.cmp(&b.person_name))
    });
    out
}

fn display_name(directory: &PersonDirectory, canonical_id: &str, hint: Option<&str>) -> String {
    directory
        .display_name(canonical_id)
        .map(str::to_string)
        .or_else(|| hint.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()))
        .unwrap_or_default()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn now_string() -> String {
    format_datetime(Local::now().naive_local())
}
