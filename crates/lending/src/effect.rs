use serde::{Deserialize, Serialize};

use stationlend_core::ItemId;

use crate::loan::LoanEvent;

/// Inventory side effect that must commit together with a loan event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum LedgerEffect {
    /// Take stock off the shelf.
    Reserve { item_id: ItemId, quantity: u32 },
    /// Stock comes back. Consumables are written off instead.
    Settle { item_id: ItemId, quantity: u32 },
    /// Flag the item faulty.
    MarkFaulty { item_id: ItemId },
}

impl LedgerEffect {
    pub fn item_id(&self) -> ItemId {
        match self {
            LedgerEffect::Reserve { item_id, .. }
            | LedgerEffect::Settle { item_id, .. }
            | LedgerEffect::MarkFaulty { item_id } => *item_id,
        }
    }
}

impl LoanEvent {
    /// Ledger effects implied by this event, in the order they apply.
    pub fn ledger_effects(&self) -> Vec<LedgerEffect> {
        match self {
            LoanEvent::LoanBorrowed(e) => vec![LedgerEffect::Reserve {
                item_id: e.terms.item.item_id,
                quantity: e.terms.quantity,
            }],
            LoanEvent::LoanApproved(e) => vec![LedgerEffect::Reserve {
                item_id: e.item.item_id,
                quantity: e.quantity,
            }],
            LoanEvent::LoanReturned(e) => {
                let mut effects = vec![LedgerEffect::Settle {
                    item_id: e.item.item_id,
                    quantity: e.quantity,
                }];
                if e.fault.as_ref().is_some_and(|f| f.marks_faulty()) {
                    effects.push(LedgerEffect::MarkFaulty {
                        item_id: e.item.item_id,
                    });
                }
                effects
            }
            LoanEvent::ReturnApproved(e) => {
                let mut effects = vec![LedgerEffect::Settle {
                    item_id: e.item.item_id,
                    quantity: e.quantity,
                }];
                if e.mark_faulty {
                    effects.push(LedgerEffect::MarkFaulty {
                        item_id: e.item.item_id,
                    });
                }
                effects
            }
            LoanEvent::LoanRequested(_)
            | LoanEvent::LoanRejected(_)
            | LoanEvent::ReturnSubmitted(_)
            | LoanEvent::ReturnRejected(_)
            | LoanEvent::LoanSigned(_)
            | LoanEvent::LoanDeleted(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stationlend_core::TenantId;
    use stationlend_inventory::{ItemKind, ItemStatus};

    use crate::loan::{FaultReport, ItemRef, LoanId, LoanRejected, LoanReturned, ReturnSubmitted};

    fn item() -> ItemRef {
        ItemRef {
            item_id: ItemId::new(),
            kind: ItemKind::Unit,
        }
    }

    #[test]
    fn return_with_fault_settles_then_flags() {
        let item = item();
        let ev = LoanEvent::LoanReturned(LoanReturned {
            tenant_id: TenantId::new(),
            loan_id: LoanId::generate(),
            item,
            quantity: 1,
            fault: Some(FaultReport {
                reported_status: ItemStatus::Faulty,
                notes: None,
            }),
            evidence: None,
            decided_by: None,
            occurred_at: Utc::now(),
        });
        assert_eq!(
            ev.ledger_effects(),
            vec![
                LedgerEffect::Settle {
                    item_id: item.item_id,
                    quantity: 1
                },
                LedgerEffect::MarkFaulty {
                    item_id: item.item_id
                },
            ]
        );
    }

    #[test]
    fn queue_bookkeeping_touches_no_stock() {
        let submitted = LoanEvent::ReturnSubmitted(ReturnSubmitted {
            tenant_id: TenantId::new(),
            loan_id: LoanId::generate(),
            fault: None,
            evidence: None,
            occurred_at: Utc::now(),
        });
        let rejected = LoanEvent::LoanRejected(LoanRejected {
            tenant_id: TenantId::new(),
            loan_id: LoanId::generate(),
            decided_by: None,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(submitted.ledger_effects().is_empty());
        assert!(rejected.ledger_effects().is_empty());
    }
}
