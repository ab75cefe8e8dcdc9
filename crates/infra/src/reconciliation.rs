//! Ledger drift detection.
//!
//! Recomputes what every item's stock should be from the loans that hold a
//! reservation and reports where the ledger disagrees. Never repairs;
//! corrections go through `LendingService::repair` after an operator has
//! reviewed the report.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use stationlend_auth::{Intent, Presentation, authorize_intent};
use stationlend_core::{ItemId, TenantId};
use stationlend_events::{EventBus, EventEnvelope};
use stationlend_inventory::InventoryItem;
use stationlend_lending::LoanId;

use crate::error::ServiceResult;
use crate::event_store::EventStore;
use crate::gate::TransitionGates;
use crate::ledger::InventoryLedger;
use crate::projections::{LoanDirectory, LoanRecord};
use crate::service::LendingService;
use crate::tenants::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// `quantity != catalog_total - open quantity`.
    QuantityMismatch {
        item_id: ItemId,
        expected: i64,
        actual: u32,
        catalog_total: u32,
        open_quantity: u32,
    },
    /// `is_available` disagrees with whether an open loan holds the unit.
    AvailabilityMismatch {
        item_id: ItemId,
        expected_available: bool,
        actual_available: bool,
        open_loans: Vec<LoanId>,
    },
    /// More than one open loan holds the same unit.
    MultipleOpenLoans { item_id: ItemId, loans: Vec<LoanId> },
    /// Open loans reference an item the ledger does not know.
    MissingItem { item_id: ItemId, loans: Vec<LoanId> },
}

impl Discrepancy {
    pub fn item_id(&self) -> ItemId {
        match self {
            Discrepancy::QuantityMismatch { item_id, .. }
            | Discrepancy::AvailabilityMismatch { item_id, .. }
            | Discrepancy::MultipleOpenLoans { item_id, .. }
            | Discrepancy::MissingItem { item_id, .. } => *item_id,
        }
    }
}

pub struct ReconciliationEngine {
    tenants: Arc<TenantStore>,
    ledger: Arc<InventoryLedger>,
    loans: Arc<LoanDirectory>,
    gates: Arc<TransitionGates>,
}

impl ReconciliationEngine {
    pub fn new(
        tenants: Arc<TenantStore>,
        ledger: Arc<InventoryLedger>,
        loans: Arc<LoanDirectory>,
        gates: Arc<TransitionGates>,
    ) -> Self {
        Self {
            tenants,
            ledger,
            loans,
            gates,
        }
    }

    /// Share the stores a lending service writes to.
    pub fn for_service<S, B>(service: &LendingService<S, B>) -> Self
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        Self::new(
            service.tenants().clone(),
            service.ledger().clone(),
            service.loans().clone(),
            service.gates().clone(),
        )
    }

    /// The diagnostic operation: a view-only manager asks for a report.
    pub fn diagnose(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
    ) -> ServiceResult<Vec<Discrepancy>> {
        let tenant = self.tenants.get(tenant_id)?;
        authorize_intent(&tenant, presented, Intent::ViewDiagnostics)?;
        self.verify(tenant_id)
    }

    /// Compare every item of a tenant against its open loans.
    ///
    /// Runs under the tenant's transition gate, so a transition is seen
    /// either with its ledger effect or not at all.
    pub fn verify(&self, tenant_id: TenantId) -> ServiceResult<Vec<Discrepancy>> {
        self.tenants.get(tenant_id)?;
        let found = self.gates.with(tenant_id, || {
            let items = self.ledger.list(tenant_id)?;
            let open = self.loans.reservations_by_item(tenant_id);
            Ok::<_, stationlend_core::DomainError>(compare(&items, open))
        })??;

        for d in &found {
            tracing::error!(
                tenant_id = %tenant_id,
                item_id = %d.item_id(),
                discrepancy = ?d,
                "ledger discrepancy"
            );
        }
        if found.is_empty() {
            tracing::debug!(tenant_id = %tenant_id, "ledger reconciled");
        }
        Ok(found)
    }

    /// Verify every tenant; tenants that fail to verify are logged and
    /// skipped.
    pub fn verify_all(&self) -> ServiceResult<HashMap<TenantId, Vec<Discrepancy>>> {
        let mut report = HashMap::new();
        for tenant in self.tenants.list()? {
            let tenant_id = tenant.id_typed();
            match self.verify(tenant_id) {
                Ok(found) if !found.is_empty() => {
                    report.insert(tenant_id, found);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(tenant_id = %tenant_id, error = %err, "reconciliation failed");
                }
            }
        }
        Ok(report)
    }
}

fn compare(
    items: &[InventoryItem],
    mut open: HashMap<ItemId, Vec<LoanRecord>>,
) -> Vec<Discrepancy> {
    let mut found = Vec::new();

    for item in items {
        let item_id = item.id_typed();
        let loans = open.remove(&item_id).unwrap_or_default();
        let loan_ids: Vec<LoanId> = loans.iter().map(|l| l.loan_id).collect();

        match item {
            InventoryItem::Counted(c) => {
                let open_quantity: u32 = loans.iter().map(|l| l.quantity).sum();
                let expected = i64::from(c.catalog_total) - i64::from(open_quantity);
                if expected != i64::from(c.quantity) {
                    found.push(Discrepancy::QuantityMismatch {
                        item_id,
                        expected,
                        actual: c.quantity,
                        catalog_total: c.catalog_total,
                        open_quantity,
                    });
                }
            }
            InventoryItem::Unit(u) => {
                if loan_ids.len() > 1 {
                    found.push(Discrepancy::MultipleOpenLoans {
                        item_id,
                        loans: loan_ids.clone(),
                    });
                }
                let expected_available = loan_ids.is_empty();
                if u.is_available != expected_available {
                    found.push(Discrepancy::AvailabilityMismatch {
                        item_id,
                        expected_available,
                        actual_available: u.is_available,
                        open_loans: loan_ids,
                    });
                }
            }
        }
    }

    let mut missing: Vec<_> = open
        .into_iter()
        .map(|(item_id, loans)| Discrepancy::MissingItem {
            item_id,
            loans: loans.iter().map(|l| l.loan_id).collect(),
        })
        .collect();
    missing.sort_by_key(Discrepancy::item_id);
    found.extend(missing);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use stationlend_core::{DomainError, TenantId};
    use stationlend_inventory::{InventoryItem, NewCountedItem, NewUnitItem, RepairAction};
    use stationlend_tenancy::{OperatingMode, TenantKind};

    use crate::projections::LoanDirectoryProjection;
    use crate::read_model::InMemoryReadModelStore;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    struct Fixture {
        engine: ReconciliationEngine,
        ledger: Arc<InventoryLedger>,
        tenant_id: TenantId,
    }

    fn fixture() -> Fixture {
        let tenants = Arc::new(TenantStore::new());
        let tenant_id = tenants
            .create("East Station", TenantKind::Station, OperatingMode::Direct, test_time())
            .unwrap()
            .id_typed();
        let ledger = Arc::new(InventoryLedger::new());
        let engine = ReconciliationEngine::new(
            tenants,
            ledger.clone(),
            Arc::new(LoanDirectoryProjection::new(Arc::new(
                InMemoryReadModelStore::new(),
            ))),
            Arc::new(TransitionGates::new()),
        );
        Fixture {
            engine,
            ledger,
            tenant_id,
        }
    }

    #[test]
    fn clean_ledger_has_no_discrepancies() {
        let f = fixture();
        f.ledger
            .add_counted_item(
                f.tenant_id,
                NewCountedItem {
                    name: "Helmet".to_string(),
                    category: None,
                    quantity: 4,
                    is_consumable: false,
                },
                test_time(),
            )
            .unwrap();
        assert!(f.engine.verify(f.tenant_id).unwrap().is_empty());
    }

    #[test]
    fn stock_missing_without_a_loan_is_reported_not_repaired() {
        let f = fixture();
        let item = f
            .ledger
            .add_counted_item(
                f.tenant_id,
                NewCountedItem {
                    name: "Helmet".to_string(),
                    category: None,
                    quantity: 4,
                    is_consumable: false,
                },
                test_time(),
            )
            .unwrap()
            .id_typed();
        f.ledger.reserve(f.tenant_id, item, 1).unwrap();

        let found = f.engine.verify(f.tenant_id).unwrap();
        assert_eq!(
            found,
            vec![Discrepancy::QuantityMismatch {
                item_id: item,
                expected: 4,
                actual: 3,
                catalog_total: 4,
                open_quantity: 0,
            }]
        );
        // Still there on the next pass.
        assert_eq!(f.engine.verify(f.tenant_id).unwrap().len(), 1);

        f.ledger
            .repair(
                f.tenant_id,
                item,
                &RepairAction::SetQuantity {
                    quantity: 4,
                    catalog_total: None,
                },
            )
            .unwrap();
        assert!(f.engine.verify(f.tenant_id).unwrap().is_empty());
    }

    #[test]
    fn unavailable_unit_without_a_loan_is_reported() {
        let f = fixture();
        let unit = f
            .ledger
            .add_unit_item(
                f.tenant_id,
                NewUnitItem {
                    unit_number: "T-7".to_string(),
                    size: None,
                    bolt_pattern: None,
                    category: None,
                },
                test_time(),
            )
            .unwrap();
        let InventoryItem::Unit(u) = &unit else {
            panic!("expected a unit");
        };
        f.ledger.reserve(f.tenant_id, u.id, 1).unwrap();

        let found = f.engine.verify(f.tenant_id).unwrap();
        assert!(matches!(
            found.as_slice(),
            [Discrepancy::AvailabilityMismatch {
                expected_available: true,
                actual_available: false,
                ..
            }]
        ));
    }

    #[test]
    fn unknown_tenant_is_not_found() {
        let f = fixture();
        let err = f.engine.verify(TenantId::new()).unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::TenantNotFound));
    }
}
