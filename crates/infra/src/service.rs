//! Loan state machine orchestration.
//!
//! Every loan transition runs the same pipeline under the tenant's
//! [`TransitionGates`] entry:
//!
//! ```text
//! guard (tenant active, credential tier)
//!   -> rehydrate loan
//!   -> decide events              (Loan::handle; empty = idempotent no-op)
//!   -> ledger effects             (reserve / settle / mark faulty)
//!   -> append                     (ExpectedVersion::Exact)
//!   -> loan directory
//!   -> event sink                 (best-effort)
//! ```
//!
//! Ledger rows touched by the effects are snapshotted first. If a later
//! effect or the append fails, the snapshots are put back in reverse order,
//! so a loan transition and its ledger effect commit together or not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stationlend_auth::{
    AccessTier, Grant, Intent, Presentation, Requirement, authorize, authorize_intent,
};
use stationlend_core::{Aggregate, Clock, DomainError, ItemId, TenantId};
use stationlend_events::{Command, EventBus, EventEnvelope};
use stationlend_inventory::{
    InventoryItem, ItemKind, ItemStatus, NewCountedItem, NewUnitItem, RepairAction, UnitQuery,
};
use stationlend_lending::{
    ApproveLoan, ApproveReturn, BorrowLoan, Borrower, DeleteLoan, Deposit, Evidence, FaultReport,
    ItemRef, LedgerEffect, Loan, LoanCommand, LoanEvent, LoanId, LoanStatus, LoanTerms,
    RejectLoan, RejectReturn, RequestLoan, ReturnLoan, SignLoan, SubmitReturn,
};
use stationlend_tenancy::{OperatingMode, Tenant, TenantKind};

use crate::dispatcher::TransitionDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::EventStore;
use crate::gate::TransitionGates;
use crate::ledger::InventoryLedger;
use crate::projections::{LOAN_AGGREGATE_TYPE, LoanDirectory, LoanRecord};
use crate::tenants::{TenantSettings, TenantStore};

/// Which item a new loan is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSelector {
    Item(ItemId),
    /// Oldest available working unit with these attributes.
    Matching(UnitQuery),
}

/// Input for `request` and `borrow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenLoan {
    /// Client-chosen id; replaying the same id is a no-op.
    pub loan_id: Option<LoanId>,
    pub item: ItemSelector,
    pub quantity: Option<u32>,
    pub borrower: Borrower,
    pub expected_return_date: Option<DateTime<Utc>>,
    pub deposit: Option<Deposit>,
}

/// What the borrower or manager reports when an item comes back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnDetails {
    pub fault: Option<FaultReport>,
    pub evidence: Option<Evidence>,
}

pub struct LendingService<S, B> {
    tenants: Arc<TenantStore>,
    ledger: Arc<InventoryLedger>,
    loans: Arc<LoanDirectory>,
    gates: Arc<TransitionGates>,
    dispatcher: TransitionDispatcher<S, B>,
    clock: Arc<dyn Clock>,
}

impl<S, B> LendingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        tenants: Arc<TenantStore>,
        ledger: Arc<InventoryLedger>,
        loans: Arc<LoanDirectory>,
        gates: Arc<TransitionGates>,
        dispatcher: TransitionDispatcher<S, B>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tenants,
            ledger,
            loans,
            gates,
            dispatcher,
            clock,
        }
    }

    pub fn tenants(&self) -> &Arc<TenantStore> {
        &self.tenants
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        &self.ledger
    }

    pub fn loans(&self) -> &Arc<LoanDirectory> {
        &self.loans
    }

    pub fn gates(&self) -> &Arc<TransitionGates> {
        &self.gates
    }

    pub fn dispatcher(&self) -> &TransitionDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve the tenant and check the caller for `intent`.
    ///
    /// Mutating intents are refused on inactive tenants before any
    /// credential is looked at.
    pub fn authorize(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        intent: Intent,
    ) -> ServiceResult<(Tenant, Grant)> {
        let tenant = self.tenants.get(tenant_id)?;
        if intent.is_mutating() {
            tenant.ensure_active()?;
        }
        let grant = authorize_intent(&tenant, presented, intent)?;
        Ok((tenant, grant))
    }

    fn owner(&self, loan_id: LoanId) -> ServiceResult<TenantId> {
        self.loans
            .locate(loan_id)
            .ok_or(ServiceError::Domain(DomainError::NotFound))
    }

    fn record(&self, tenant_id: TenantId, loan_id: LoanId) -> ServiceResult<LoanRecord> {
        self.loans
            .get(tenant_id, &loan_id)
            .ok_or(ServiceError::Domain(DomainError::NotFound))
    }

    // ---------------------------------------------------------------------
    // Opening loans
    // ---------------------------------------------------------------------

    /// `POST /loans`: request or direct borrow, by the tenant's mode.
    pub fn open_loan(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        input: OpenLoan,
    ) -> ServiceResult<LoanRecord> {
        match self.tenants.get(tenant_id)?.mode() {
            OperatingMode::Direct => self.borrow(tenant_id, presented, input),
            OperatingMode::Request => self.request(tenant_id, presented, input),
        }
    }

    /// End user files a request; nothing is reserved until approval.
    pub fn request(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        input: OpenLoan,
    ) -> ServiceResult<LoanRecord> {
        let (tenant, _) = self.authorize(tenant_id, presented, Intent::Request)?;
        if tenant.mode() != OperatingMode::Request {
            return Err(DomainError::wrong_mode(tenant.mode(), "request").into());
        }
        self.open(&tenant, input, |loan_id, terms, at| {
            LoanCommand::Request(RequestLoan {
                tenant_id,
                loan_id,
                terms,
                occurred_at: at,
            })
        })
    }

    /// Manager hands the item over; the loan starts `borrowed`.
    pub fn borrow(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        input: OpenLoan,
    ) -> ServiceResult<LoanRecord> {
        let (tenant, grant) = self.authorize(tenant_id, presented, Intent::Borrow)?;
        if tenant.mode() != OperatingMode::Direct {
            return Err(DomainError::wrong_mode(tenant.mode(), "borrow").into());
        }
        self.open(&tenant, input, |loan_id, terms, at| {
            LoanCommand::Borrow(BorrowLoan {
                tenant_id,
                loan_id,
                terms,
                decided_by: grant.manager,
                occurred_at: at,
            })
        })
    }

    fn open(
        &self,
        tenant: &Tenant,
        input: OpenLoan,
        build: impl FnOnce(LoanId, LoanTerms, DateTime<Utc>) -> LoanCommand,
    ) -> ServiceResult<LoanRecord> {
        let tenant_id = tenant.id_typed();
        tenant.check_caller_identity(&input.borrower.name, input.borrower.phone.as_deref())?;

        let loan_id = input.loan_id.unwrap_or_else(LoanId::generate);
        if let Some(owner) = self.loans.locate(loan_id)
            && owner != tenant_id
        {
            return Err(DomainError::conflict(format!("loan id {loan_id} is already in use")).into());
        }

        self.gates.with(tenant_id, || {
            // A replayed id keeps its original terms so that a unit picked by
            // attributes is not matched a second time.
            let terms = match self.loans.get(tenant_id, &loan_id) {
                Some(existing) => existing.terms(),
                None => self.resolve_terms(tenant_id, input)?,
            };
            let command = build(loan_id, terms, self.now());
            self.transition(tenant_id, loan_id, command)
        })??;

        self.record(tenant_id, loan_id)
    }

    fn resolve_terms(&self, tenant_id: TenantId, input: OpenLoan) -> ServiceResult<LoanTerms> {
        let item = match input.item {
            ItemSelector::Item(item_id) => {
                let item = self.ledger.get(tenant_id, item_id)?;
                ItemRef {
                    item_id,
                    kind: item.kind(),
                }
            }
            ItemSelector::Matching(query) => {
                let item_id = self
                    .ledger
                    .find_available_unit(tenant_id, &query)?
                    .ok_or(DomainError::UnitUnavailable)?;
                ItemRef {
                    item_id,
                    kind: ItemKind::Unit,
                }
            }
        };
        Ok(LoanTerms {
            item,
            quantity: input.quantity.unwrap_or(1),
            borrower: input.borrower,
            expected_return_date: input.expected_return_date,
            deposit: input.deposit,
        })
    }

    // ---------------------------------------------------------------------
    // Transitions on existing loans
    // ---------------------------------------------------------------------

    /// Authorize `intent` on the loan's tenant, then run one transition.
    fn on_loan(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
        intent: Intent,
        build: impl FnOnce(TenantId, Grant, DateTime<Utc>) -> LoanCommand,
    ) -> ServiceResult<LoanRecord> {
        let tenant_id = self.owner(loan_id)?;
        let (_, grant) = self.authorize(tenant_id, presented, intent)?;
        self.run_on(tenant_id, loan_id, grant, build)
    }

    fn run_on(
        &self,
        tenant_id: TenantId,
        loan_id: LoanId,
        grant: Grant,
        build: impl FnOnce(TenantId, Grant, DateTime<Utc>) -> LoanCommand,
    ) -> ServiceResult<LoanRecord> {
        self.gates.with(tenant_id, || {
            let command = build(tenant_id, grant, self.now());
            self.transition(tenant_id, loan_id, command)
        })??;
        self.record(tenant_id, loan_id)
    }

    pub fn approve(&self, loan_id: LoanId, presented: &Presentation) -> ServiceResult<LoanRecord> {
        self.on_loan(loan_id, presented, Intent::Approve, |tenant_id, grant, at| {
            LoanCommand::Approve(ApproveLoan {
                tenant_id,
                loan_id,
                decided_by: grant.manager,
                occurred_at: at,
            })
        })
    }

    pub fn reject(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
        reason: Option<String>,
    ) -> ServiceResult<LoanRecord> {
        self.on_loan(loan_id, presented, Intent::Reject, |tenant_id, grant, at| {
            LoanCommand::Reject(RejectLoan {
                tenant_id,
                loan_id,
                decided_by: grant.manager,
                reason,
                occurred_at: at,
            })
        })
    }

    /// `POST /loans/{id}/return`.
    ///
    /// - a full-access manager marks the loan returned in any mode
    /// - otherwise, when the tenant requires return approval, the caller
    ///   submits the return for review
    /// - otherwise the caller needs full access and is refused
    pub fn return_loan(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
        details: ReturnDetails,
    ) -> ServiceResult<LoanRecord> {
        let tenant = self.tenants.get(self.owner(loan_id)?)?;
        let full_access = authorize(
            &tenant,
            presented,
            Requirement::Tier(AccessTier::FullAccess),
        )
        .is_ok();

        if !full_access && tenant.requires_return_approval() {
            self.submit_return(loan_id, presented, details)
        } else {
            self.mark_returned(loan_id, presented, details)
        }
    }

    /// Manager marks the loan returned; stock goes back to the ledger.
    pub fn mark_returned(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
        details: ReturnDetails,
    ) -> ServiceResult<LoanRecord> {
        self.on_loan(loan_id, presented, Intent::Return, |tenant_id, grant, at| {
            LoanCommand::Return(ReturnLoan {
                tenant_id,
                loan_id,
                decided_by: grant.manager,
                fault: details.fault,
                evidence: details.evidence,
                occurred_at: at,
            })
        })
    }

    /// Borrower hands the item back for review. Stock stays reserved.
    pub fn submit_return(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
        details: ReturnDetails,
    ) -> ServiceResult<LoanRecord> {
        let tenant_id = self.owner(loan_id)?;
        let (tenant, grant) = self.authorize(tenant_id, presented, Intent::SubmitReturn)?;
        if !tenant.requires_return_approval() {
            return Err(DomainError::wrong_mode(tenant.mode(), "submit-return").into());
        }
        self.run_on(tenant_id, loan_id, grant, |tenant_id, _, at| {
            LoanCommand::SubmitReturn(SubmitReturn {
                tenant_id,
                loan_id,
                fault: details.fault,
                evidence: details.evidence,
                occurred_at: at,
            })
        })
    }

    pub fn approve_return(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
    ) -> ServiceResult<LoanRecord> {
        self.on_loan(
            loan_id,
            presented,
            Intent::ApproveReturn,
            |tenant_id, grant, at| {
                LoanCommand::ApproveReturn(ApproveReturn {
                    tenant_id,
                    loan_id,
                    decided_by: grant.manager,
                    occurred_at: at,
                })
            },
        )
    }

    pub fn reject_return(
        &self,
        loan_id: LoanId,
        presented: &Presentation,
        reason: Option<String>,
    ) -> ServiceResult<LoanRecord> {
        self.on_loan(
            loan_id,
            presented,
            Intent::RejectReturn,
            |tenant_id, grant, at| {
                LoanCommand::RejectReturn(RejectReturn {
                    tenant_id,
                    loan_id,
                    decided_by: grant.manager,
                    reason,
                    occurred_at: at,
                })
            },
        )
    }

    pub fn sign(&self, loan_id: LoanId, presented: &Presentation) -> ServiceResult<LoanRecord> {
        self.on_loan(loan_id, presented, Intent::Sign, |tenant_id, _, at| {
            LoanCommand::Sign(SignLoan {
                tenant_id,
                loan_id,
                occurred_at: at,
            })
        })
    }

    /// Drop closed loan history.
    pub fn delete(&self, loan_id: LoanId, presented: &Presentation) -> ServiceResult<()> {
        let tenant_id = self.owner(loan_id)?;
        let (_, grant) = self.authorize(tenant_id, presented, Intent::DeleteHistory)?;
        self.gates.with(tenant_id, || {
            let command = LoanCommand::Delete(DeleteLoan {
                tenant_id,
                loan_id,
                decided_by: grant.manager,
                occurred_at: self.now(),
            });
            self.transition(tenant_id, loan_id, command)
        })??;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// A single loan, gated like the end-user intents.
    pub fn get_loan(&self, loan_id: LoanId, presented: &Presentation) -> ServiceResult<LoanRecord> {
        let tenant_id = self.owner(loan_id)?;
        let tenant = self.tenants.get(tenant_id)?;
        authorize(&tenant, presented, Requirement::Public)?;
        self.record(tenant_id, loan_id)
    }

    /// Loans of a tenant, oldest first.
    pub fn list_loans(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        status: Option<LoanStatus>,
    ) -> ServiceResult<Vec<LoanRecord>> {
        self.authorize(tenant_id, presented, Intent::ViewDiagnostics)?;
        Ok(self.loans.list(tenant_id, status))
    }

    /// Current counted and unit item states.
    pub fn inventory(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
    ) -> ServiceResult<Vec<InventoryItem>> {
        let tenant = self.tenants.get(tenant_id)?;
        authorize(&tenant, presented, Requirement::Public)?;
        Ok(self.ledger.list(tenant_id)?)
    }

    // ---------------------------------------------------------------------
    // Inventory administration
    // ---------------------------------------------------------------------

    fn manage_inventory<R>(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        f: impl FnOnce(&InventoryLedger) -> Result<R, DomainError>,
    ) -> ServiceResult<R> {
        self.authorize(tenant_id, presented, Intent::ManageInventory)?;
        Ok(self.gates.with(tenant_id, || f(&self.ledger))??)
    }

    pub fn add_counted_item(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        input: NewCountedItem,
    ) -> ServiceResult<InventoryItem> {
        let at = self.now();
        self.manage_inventory(tenant_id, presented, |ledger| {
            ledger.add_counted_item(tenant_id, input, at)
        })
    }

    pub fn add_unit_item(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        input: NewUnitItem,
    ) -> ServiceResult<InventoryItem> {
        let at = self.now();
        self.manage_inventory(tenant_id, presented, |ledger| {
            ledger.add_unit_item(tenant_id, input, at)
        })
    }

    pub fn set_item_status(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        item_id: ItemId,
        status: ItemStatus,
    ) -> ServiceResult<InventoryItem> {
        self.manage_inventory(tenant_id, presented, |ledger| {
            ledger.set_status(tenant_id, item_id, status)?;
            ledger.get(tenant_id, item_id)
        })
    }

    pub fn restock(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        item_id: ItemId,
        delta: i64,
    ) -> ServiceResult<InventoryItem> {
        self.manage_inventory(tenant_id, presented, |ledger| {
            ledger.restock(tenant_id, item_id, delta)
        })
    }

    pub fn repair(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        item_id: ItemId,
        action: &RepairAction,
    ) -> ServiceResult<InventoryItem> {
        self.manage_inventory(tenant_id, presented, |ledger| {
            ledger.repair(tenant_id, item_id, action)
        })
    }

    // ---------------------------------------------------------------------
    // Tenant administration
    // ---------------------------------------------------------------------

    /// Register a tenant with its primary full-access credential.
    ///
    /// Callers are platform administrators; the API checks the admin token.
    pub fn create_tenant(
        &self,
        display_name: &str,
        kind: TenantKind,
        mode: OperatingMode,
        primary_secret: &str,
    ) -> ServiceResult<Tenant> {
        let tenant = self.tenants.create(display_name, kind, mode, self.now())?;
        let tenant_id = tenant.id_typed();
        self.tenants.update(tenant_id, |t| {
            t.set_primary_credential(primary_secret)?;
            Ok(t.clone())
        })
        .map_err(Into::into)
    }

    /// Soft removal; loan history stays readable.
    pub fn deactivate_tenant(&self, tenant_id: TenantId) -> ServiceResult<Tenant> {
        Ok(self.tenants.deactivate(tenant_id)?)
    }

    pub fn set_mode(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        mode: OperatingMode,
    ) -> ServiceResult<Tenant> {
        self.authorize(tenant_id, presented, Intent::ManageTenant)?;
        Ok(self.tenants.set_mode(tenant_id, mode)?)
    }

    pub fn set_credential(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        secret: &str,
    ) -> ServiceResult<()> {
        self.authorize(tenant_id, presented, Intent::ManageTenant)?;
        Ok(self.tenants.set_credential(tenant_id, secret)?)
    }

    pub fn configure(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        settings: &TenantSettings,
    ) -> ServiceResult<Tenant> {
        self.authorize(tenant_id, presented, Intent::ManageTenant)?;
        Ok(self.tenants.configure(tenant_id, settings)?)
    }

    pub fn add_manager(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        label: &str,
        secret: &str,
        tier: AccessTier,
    ) -> ServiceResult<()> {
        self.authorize(tenant_id, presented, Intent::ManageTenant)?;
        self.tenants
            .update(tenant_id, |t| t.upsert_manager(label, secret, tier))?;
        tracing::info!(tenant_id = %tenant_id, label, tier = tier.as_str(), "manager credential stored");
        Ok(())
    }

    pub fn remove_manager(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        label: &str,
    ) -> ServiceResult<()> {
        self.authorize(tenant_id, presented, Intent::ManageTenant)?;
        self.tenants.update(tenant_id, |t| t.remove_manager(label))?;
        tracing::info!(tenant_id = %tenant_id, label, "manager credential removed");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Pipeline
    // ---------------------------------------------------------------------

    /// One loan transition. Caller holds the tenant gate.
    ///
    /// Returns `false` for an idempotent no-op.
    fn transition(
        &self,
        tenant_id: TenantId,
        loan_id: LoanId,
        command: LoanCommand,
    ) -> ServiceResult<bool> {
        let intent = command.intent();
        let loaded = self
            .dispatcher
            .load(tenant_id, loan_id.0, |id| Loan::empty(LoanId(id)))?;
        let mut loan = loaded.aggregate;

        let events = loan.handle(&command)?;
        if events.is_empty() {
            tracing::debug!(
                tenant_id = %tenant_id,
                loan_id = %loan_id,
                intent,
                status = %loan.status(),
                "loan already in target state"
            );
            return Ok(false);
        }

        let undo = self.apply_ledger_effects(tenant_id, &events)?;

        let committed = match self.dispatcher.append(
            tenant_id,
            loan_id.0,
            LOAN_AGGREGATE_TYPE,
            &events,
            loaded.expected,
        ) {
            Ok(committed) => committed,
            Err(err) => {
                self.restore(undo);
                return Err(err);
            }
        };

        for stored in &committed {
            if let Err(err) = self.loans.apply_stored(stored) {
                tracing::error!(
                    tenant_id = %tenant_id,
                    loan_id = %loan_id,
                    error = %err,
                    "loan directory rejected a committed event"
                );
            }
        }
        self.dispatcher.publish(&committed);

        for ev in &events {
            loan.apply(ev);
        }
        tracing::info!(
            tenant_id = %tenant_id,
            loan_id = %loan_id,
            intent,
            status = %loan.status(),
            "loan transition committed"
        );
        Ok(true)
    }

    /// Apply the ledger side of `events`, returning snapshots to undo them.
    fn apply_ledger_effects(
        &self,
        tenant_id: TenantId,
        events: &[LoanEvent],
    ) -> ServiceResult<Vec<InventoryItem>> {
        let mut undo = Vec::new();
        for effect in events.iter().flat_map(LoanEvent::ledger_effects) {
            let item_id = effect.item_id();
            let snapshot = match self.ledger.get(tenant_id, item_id) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.restore(undo);
                    return Err(err.into());
                }
            };

            let applied = match effect {
                LedgerEffect::Reserve { quantity, .. } => self
                    .ledger
                    .reserve(tenant_id, item_id, quantity)
                    .map(|_| ()),
                LedgerEffect::Settle { quantity, .. } => self
                    .ledger
                    .settle(tenant_id, item_id, quantity)
                    .map(|_| ()),
                LedgerEffect::MarkFaulty { .. } => self
                    .ledger
                    .set_status(tenant_id, item_id, ItemStatus::Faulty)
                    .map(|_| ()),
            };

            if let Err(err) = applied {
                self.restore(undo);
                return Err(err.into());
            }
            undo.push(snapshot);
        }
        Ok(undo)
    }

    fn restore(&self, undo: Vec<InventoryItem>) {
        for snapshot in undo.into_iter().rev() {
            let (tenant_id, item_id) = (snapshot.tenant_id(), snapshot.id_typed());
            if let Err(err) = self.ledger.restore(snapshot) {
                tracing::error!(
                    tenant_id = %tenant_id,
                    item_id = %item_id,
                    error = %err,
                    "failed to undo ledger effect"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stationlend_core::FixedClock;
    use stationlend_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::projections::LoanDirectoryProjection;
    use crate::read_model::InMemoryReadModelStore;

    type Service = LendingService<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    >;

    fn test_time() -> DateTime<Utc> {
        "2026-03-02T09:00:00Z".parse().unwrap()
    }

    fn service() -> Service {
        LendingService::new(
            Arc::new(TenantStore::new()),
            Arc::new(InventoryLedger::new()),
            Arc::new(LoanDirectoryProjection::new(Arc::new(
                InMemoryReadModelStore::new(),
            ))),
            Arc::new(TransitionGates::new()),
            TransitionDispatcher::new(
                Arc::new(InMemoryEventStore::new()),
                Arc::new(InMemoryEventBus::new()),
            ),
            Arc::new(FixedClock::new(test_time())),
        )
    }

    fn root() -> Presentation {
        Presentation::manager("root-secret")
    }

    fn station(svc: &Service, mode: OperatingMode) -> TenantId {
        svc.create_tenant("Dock Station", TenantKind::Station, mode, "root-secret")
            .unwrap()
            .id_typed()
    }

    fn counted(svc: &Service, tenant_id: TenantId, quantity: u32) -> ItemId {
        svc.add_counted_item(
            tenant_id,
            &root(),
            NewCountedItem {
                name: "Pump".to_string(),
                category: None,
                quantity,
                is_consumable: false,
            },
        )
        .unwrap()
        .id_typed()
    }

    fn open(item_id: ItemId) -> OpenLoan {
        OpenLoan {
            loan_id: None,
            item: ItemSelector::Item(item_id),
            quantity: None,
            borrower: Borrower {
                name: "Rana".to_string(),
                phone: Some("0501234567".to_string()),
            },
            expected_return_date: None,
            deposit: None,
        }
    }

    fn quantity(svc: &Service, tenant_id: TenantId, item_id: ItemId) -> u32 {
        svc.ledger()
            .get_counted_item(tenant_id, item_id)
            .unwrap()
            .quantity
    }

    #[test]
    fn open_loan_follows_the_tenant_mode() {
        let svc = service();
        let direct = station(&svc, OperatingMode::Direct);
        let item = counted(&svc, direct, 2);
        let loan = svc.open_loan(direct, &root(), open(item)).unwrap();
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(loan.decided_by.as_deref(), Some("primary"));

        let request = station(&svc, OperatingMode::Request);
        let item = counted(&svc, request, 2);
        let loan = svc
            .open_loan(request, &Presentation::anonymous(), open(item))
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(quantity(&svc, request, item), 2);
    }

    #[test]
    fn intents_outside_the_mode_are_refused() {
        let svc = service();
        let direct = station(&svc, OperatingMode::Direct);
        let item = counted(&svc, direct, 1);
        let err = svc
            .request(direct, &Presentation::anonymous(), open(item))
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::WrongMode { .. })));
    }

    #[test]
    fn failed_append_releases_the_reservation() {
        let svc = service();
        let tenant_id = station(&svc, OperatingMode::Request);
        let item = counted(&svc, tenant_id, 1);
        let loan = svc
            .request(tenant_id, &Presentation::anonymous(), open(item))
            .unwrap();

        // Someone else appends to the stream behind the service's back.
        let loaded = svc
            .dispatcher()
            .load(tenant_id, loan.loan_id.0, |id| Loan::empty(LoanId(id)))
            .unwrap();
        let sign = LoanCommand::Sign(SignLoan {
            tenant_id,
            loan_id: loan.loan_id,
            occurred_at: test_time(),
        });
        let events = loaded.aggregate.handle(&sign).unwrap();

        let stale = svc
            .dispatcher()
            .load(tenant_id, loan.loan_id.0, |id| Loan::empty(LoanId(id)))
            .unwrap();
        svc.dispatcher()
            .append(tenant_id, loan.loan_id.0, LOAN_AGGREGATE_TYPE, &events, loaded.expected)
            .unwrap();

        let approve = LoanCommand::Approve(ApproveLoan {
            tenant_id,
            loan_id: loan.loan_id,
            decided_by: None,
            occurred_at: test_time(),
        });
        let approved = stale.aggregate.handle(&approve).unwrap();
        let undo = svc.apply_ledger_effects(tenant_id, &approved).unwrap();
        assert_eq!(quantity(&svc, tenant_id, item), 0);

        let err = svc
            .dispatcher()
            .append(tenant_id, loan.loan_id.0, LOAN_AGGREGATE_TYPE, &approved, stale.expected)
            .unwrap_err();
        svc.restore(undo);

        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
        assert_eq!(quantity(&svc, tenant_id, item), 1);
    }

    #[test]
    fn replayed_loan_id_does_not_match_a_second_unit() {
        let svc = service();
        let tenant_id = station(&svc, OperatingMode::Direct);
        for number in ["W-1", "W-2"] {
            svc.add_unit_item(
                tenant_id,
                &root(),
                NewUnitItem {
                    unit_number: number.to_string(),
                    size: Some("16".to_string()),
                    bolt_pattern: None,
                    category: None,
                },
            )
            .unwrap();
        }

        let mut input = open(ItemId::new());
        input.loan_id = Some(LoanId::generate());
        input.item = ItemSelector::Matching(UnitQuery {
            size: Some("16".to_string()),
            ..UnitQuery::default()
        });

        let first = svc.borrow(tenant_id, &root(), input.clone()).unwrap();
        let again = svc.borrow(tenant_id, &root(), input).unwrap();
        assert_eq!(first.item, again.item);
        assert_eq!(again.version, 1);

        let available = svc
            .inventory(tenant_id, &Presentation::anonymous())
            .unwrap()
            .into_iter()
            .filter(|i| i.as_unit().is_some_and(|u| u.is_available))
            .count();
        assert_eq!(available, 1);
    }

    #[test]
    fn loan_ids_are_not_shared_across_tenants() {
        let svc = service();
        let a = station(&svc, OperatingMode::Direct);
        let b = station(&svc, OperatingMode::Direct);
        let item_a = counted(&svc, a, 1);
        let item_b = counted(&svc, b, 1);

        let mut input = open(item_a);
        input.loan_id = Some(LoanId::generate());
        svc.borrow(a, &root(), input.clone()).unwrap();

        input.item = ItemSelector::Item(item_b);
        let err = svc.borrow(b, &root(), input).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
        assert_eq!(quantity(&svc, b, item_b), 1);
    }

    #[test]
    fn manager_tiers_are_enforced_on_administration() {
        let svc = service();
        let tenant_id = station(&svc, OperatingMode::Request);
        svc.add_manager(tenant_id, &root(), "viewer", "look-only", AccessTier::ViewOnly)
            .unwrap();

        let viewer = Presentation::manager("look-only");
        assert!(svc.list_loans(tenant_id, &viewer, None).is_ok());
        let err = svc
            .set_mode(tenant_id, &viewer, OperatingMode::Direct)
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Forbidden(_))));

        svc.remove_manager(tenant_id, &root(), "viewer").unwrap();
        let err = svc.list_loans(tenant_id, &viewer, None).unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::Unauthorized));
    }
}
