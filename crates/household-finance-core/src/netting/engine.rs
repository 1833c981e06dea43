//! The netting engine: aggregate pending debts into per-person net
//! positions, then collapse them into a settlement plan by greedy
//! largest-creditor / largest-debtor matching.
//!
//! The greedy heuristic does not guarantee the minimum possible number of
//! transfers (that problem is NP-hard in general); what it guarantees is
//! reproducibility, so it must not be swapped for a cleverer heuristic.
//! Tie-breaking among equal amounts follows current list order and callers
//! must not depend on it.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{round2, Money};

use super::model::DebtView;

/// Rounding noise tolerance for net positions.
pub const NET_EPSILON: Decimal = dec!(0.005);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetPosition {
    pub person_id: String,
    pub person_name: String,
    /// Positive: the household owes this person. Negative: they owe.
    pub net: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub from_person_id: String,
    pub from_person_name: String,
    pub to_person_id: String,
    pub to_person_name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub transfers: Vec<Transfer>,
    pub total: Money,
    /// Set when the safety cap stopped a non-converging run; the plan is
    /// partial but valid as far as it goes.
    pub truncated: bool,
}

/// Net balance per person over the pending debts. Debts whose pending
/// amount is inside the epsilon are ignored.
pub fn net_positions(debts: &[DebtView]) -> Vec<NetPosition> {
    struct Slot {
        name: String,
        net: Money,
    }
    let mut slots: BTreeMap<String, Slot> = BTreeMap::new();
    {
        let mut touch = |id: &str, name: &str, delta: Money| {
            let id = id.trim();
            if id.is_empty() {
                return;
            }
            let slot = slots.entry(id.to_string()).or_insert_with(|| Slot {
                name: name.trim().to_string(),
                net: Decimal::ZERO,
            });
            if slot.name.is_empty() && !name.trim().is_empty() {
                slot.name = name.trim().to_string();
            }
            slot.net = round2(slot.net + delta);
        };

        for view in debts {
            if view.pending <= NET_EPSILON {
                continue;
            }
            touch(&view.debt.debtor_id, &view.debt.debtor_name, -view.pending);
            touch(
                &view.debt.creditor_id,
                &view.debt.creditor_name,
                view.pending,
            );
        }
    }

    slots
        .into_iter()
        .map(|(person_id, slot)| NetPosition {
            person_id,
            person_name: slot.name,
            net: slot.net,
        })
        .collect()
}

/// Greedy settlement over the given positions.
pub fn settlement_plan(positions: &[NetPosition]) -> SettlementPlan {
    struct Side {
        id: String,
        name: String,
        amount: Money,
    }

    let mut creditors: Vec<Side> = Vec::new();
    let mut debtors: Vec<Side> = Vec::new();
    for position in positions {
        let net = round2(position.net);
        if net > NET_EPSILON {
            creditors.push(Side {
                id: position.person_id.clone(),
                name: position.person_name.clone(),
                amount: net,
            });
        } else if net < -NET_EPSILON {
            debtors.push(Side {
                id: position.person_id.clone(),
                name: position.person_name.clone(),
                amount: net.abs(),
            });
        }
    }

    // Stable sort: equal amounts keep their current relative order.
    let sort_desc = |side: &mut Vec<Side>| side.sort_by(|a, b| b.amount.cmp(&a.amount));
    sort_desc(&mut creditors);
    sort_desc(&mut debtors);

    let mut transfers = Vec::new();
    let mut total = Decimal::ZERO;
    // Safety cap against non-convergent input; generously above any sane
    // plan size.
    let cap = (creditors.len() + debtors.len() + 10) * 50;
    let mut iterations = 0usize;
    let mut truncated = false;

    while !creditors.is_empty() && !debtors.is_empty() {
        if iterations >= cap {
            truncated = true;
            break;
        }
        iterations += 1;
        sort_desc(&mut creditors);
        sort_desc(&mut debtors);

        let pay = round2(creditors[0].amount.min(debtors[0].amount));
        if pay <= NET_EPSILON {
            break;
        }

        transfers.push(Transfer {
            from_person_id: debtors[0].id.clone(),
            from_person_name: debtors[0].name.clone(),
            to_person_id: creditors[0].id.clone(),
            to_person_name: creditors[0].name.clone(),
            amount: pay,
        });
        total = round2(total + pay);

        creditors[0].amount = round2(creditors[0].amount - pay);
        debtors[0].amount = round2(debtors[0].amount - pay);
        if creditors[0].amount <= NET_EPSILON {
            creditors.remove(0);
        }
        if debtors[0].amount <= NET_EPSILON {
            debtors.remove(0);
        }
    }

    SettlementPlan {
        transfers,
        total,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netting::model::{Debt, DebtView};
    use pretty_assertions::assert_eq;

    fn pending_debt(debtor: &str, creditor: &str, amount: Money) -> DebtView {
        DebtView::build(
            Debt {
                id: format!("{debtor}->{creditor}:{amount}"),
                kind: String::new(),
                date: None,
                debtor_id: debtor.to_string(),
                debtor_name: debtor.to_uppercase(),
                creditor_id: creditor.to_string(),
                creditor_name: creditor.to_uppercase(),
                description: String::new(),
                amount,
                created_by: String::new(),
                created_at: String::new(),
            },
            vec![],
        )
    }

    #[test]
    fn single_creditor_example() {
        // A owes B 100, C owes B 50: nets are A=-100, C=-50, B=+150, and
        // the plan is exactly A->B 100, C->B 50.
        let debts = vec![
            pending_debt("a", "b", dec!(100)),
            pending_debt("c", "b", dec!(50)),
        ];
        let positions = net_positions(&debts);
        let by_id: std::collections::HashMap<&str, Money> = positions
            .iter()
            .map(|p| (p.person_id.as_str(), p.net))
            .collect();
        assert_eq!(by_id["a"], dec!(-100));
        assert_eq!(by_id["b"], dec!(150));
        assert_eq!(by_id["c"], dec!(-50));

        let plan = settlement_plan(&positions);
        assert_eq!(plan.transfers.len(), 2);
        assert!(!plan.truncated);
        assert_eq!(plan.total, dec!(150));
        assert!(plan
            .transfers
            .iter()
            .all(|t| t.to_person_id == "b"));
        let amounts: Vec<Money> = plan.transfers.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![dec!(100), dec!(50)]);
    }

    #[test]
    fn offsetting_debts_cancel_out() {
        let debts = vec![
            pending_debt("a", "b", dec!(70)),
            pending_debt("b", "a", dec!(70)),
        ];
        let positions = net_positions(&debts);
        assert!(positions.iter().all(|p| p.net.abs() <= NET_EPSILON));
        let plan = settlement_plan(&positions);
        assert!(plan.transfers.is_empty());
        assert_eq!(plan.total, dec!(0));
    }

    #[test]
    fn conservation_over_a_messy_web() {
        let debts = vec![
            pending_debt("a", "b", dec!(100)),
            pending_debt("b", "c", dec!(30)),
            pending_debt("c", "a", dec!(45.55)),
            pending_debt("d", "a", dec!(12.20)),
            pending_debt("b", "d", dec!(64.99)),
        ];
        let positions = net_positions(&debts);
        let positive: Money = positions
            .iter()
            .filter(|p| p.net > NET_EPSILON)
            .map(|p| p.net)
            .sum();
        let negative: Money = positions
            .iter()
            .filter(|p| p.net < -NET_EPSILON)
            .map(|p| p.net.abs())
            .sum();
        assert_eq!(positive, negative);

        let plan = settlement_plan(&positions);
        assert_eq!(plan.total, positive);
        // At most one fewer transfer than non-zero positions.
        let nonzero = positions.iter().filter(|p| p.net.abs() > NET_EPSILON).count();
        assert!(plan.transfers.len() <= nonzero.saturating_sub(1));

        // Applying every transfer drives all nets to within epsilon.
        let mut residual: std::collections::HashMap<String, Money> = positions
            .iter()
            .map(|p| (p.person_id.clone(), p.net))
            .collect();
        for t in &plan.transfers {
            *residual.get_mut(&t.from_person_id).unwrap() += t.amount;
            *residual.get_mut(&t.to_person_id).unwrap() -= t.amount;
        }
        for (person, net) in residual {
            assert!(net.abs() <= NET_EPSILON, "{person} left with {net}");
        }
    }

    #[test]
    fn sub_epsilon_pendings_are_ignored() {
        let debts = vec![pending_debt("a", "b", dec!(0.004))];
        assert!(net_positions(&debts).is_empty());
    }
}
