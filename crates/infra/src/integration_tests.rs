//! Integration tests for the full lending pipeline.
//!
//! Tests: guard → Loan aggregate → InventoryLedger → EventStore → loan
//! directory → event sink, with reconciliation checking the result.
//!
//! Verifies:
//! - Every committed transition carries its ledger effect, and a refused one
//!   carries none
//! - Racing callers never both take the last unit
//! - Idempotent replays do not reserve twice
//! - Tenant isolation and access control hold end to end

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;

    use stationlend_auth::{AccessTier, Presentation};
    use stationlend_core::{DomainError, FixedClock, ItemId, TenantId};
    use stationlend_events::{EventBus, EventEnvelope, Subscription};
    use stationlend_inventory::{ItemStatus, NewCountedItem, NewUnitItem, RepairAction, UnitQuery};
    use stationlend_lending::{Borrower, Evidence, FaultReport, LoanId, LoanStatus};
    use stationlend_tenancy::{OperatingMode, TenantKind};

    use crate::dispatcher::TransitionDispatcher;
    use crate::event_store::InMemoryEventStore;
    use crate::gate::TransitionGates;
    use crate::ledger::InventoryLedger;
    use crate::projections::LoanDirectoryProjection;
    use crate::queue::QueueDecision;
    use crate::read_model::InMemoryReadModelStore;
    use crate::reconciliation::Discrepancy;
    use crate::service::{ItemSelector, LendingService, OpenLoan, ReturnDetails};
    use crate::stack::InMemoryStack;
    use crate::tenants::{TenantSettings, TenantStore};

    const ROOT: &str = "root-secret";
    const DESK: &str = "desk-secret";

    fn test_time() -> DateTime<Utc> {
        "2026-05-04T08:00:00Z".parse().unwrap()
    }

    fn root() -> Presentation {
        Presentation::manager(ROOT)
    }

    fn desk() -> Presentation {
        Presentation::manager(DESK)
    }

    fn anyone() -> Presentation {
        Presentation::anonymous()
    }

    struct World {
        stack: InMemoryStack,
        clock: Arc<FixedClock>,
    }

    impl World {
        fn new() -> Self {
            let clock = Arc::new(FixedClock::new(test_time()));
            Self {
                stack: InMemoryStack::with_clock(clock.clone()),
                clock,
            }
        }

        fn tick(&self) {
            self.clock.advance(Duration::seconds(1));
        }

        fn tenant(&self, mode: OperatingMode) -> TenantId {
            let svc = &self.stack.service;
            let tenant_id = svc
                .create_tenant("Central Station", TenantKind::Station, mode, ROOT)
                .unwrap()
                .id_typed();
            svc.add_manager(tenant_id, &root(), "desk", DESK, AccessTier::ApproveRequests)
                .unwrap();
            tenant_id
        }

        fn counted(&self, tenant_id: TenantId, quantity: u32, consumable: bool) -> ItemId {
            self.stack
                .service
                .add_counted_item(
                    tenant_id,
                    &root(),
                    NewCountedItem {
                        name: "Tire pump".to_string(),
                        category: Some("tools".to_string()),
                        quantity,
                        is_consumable: consumable,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn unit(&self, tenant_id: TenantId, number: &str) -> ItemId {
            self.stack
                .service
                .add_unit_item(
                    tenant_id,
                    &root(),
                    NewUnitItem {
                        unit_number: number.to_string(),
                        size: Some("185/65R15".to_string()),
                        bolt_pattern: Some("4x100".to_string()),
                        category: Some("spare wheel".to_string()),
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn quantity(&self, tenant_id: TenantId, item_id: ItemId) -> u32 {
            self.stack
                .service
                .ledger()
                .get_counted_item(tenant_id, item_id)
                .unwrap()
                .quantity
        }

        fn unit_state(&self, tenant_id: TenantId, item_id: ItemId) -> (bool, ItemStatus) {
            let u = self
                .stack
                .service
                .ledger()
                .get_unit_item(tenant_id, item_id)
                .unwrap();
            (u.is_available, u.status)
        }

        fn assert_reconciled(&self, tenant_id: TenantId) {
            let found = self.stack.reconciliation.verify(tenant_id).unwrap();
            assert!(found.is_empty(), "unexpected discrepancies: {found:?}");
        }
    }

    fn loan_for(item_id: ItemId) -> OpenLoan {
        OpenLoan {
            loan_id: None,
            item: ItemSelector::Item(item_id),
            quantity: None,
            borrower: Borrower {
                name: "Yael".to_string(),
                phone: Some("0521112233".to_string()),
            },
            expected_return_date: Some(test_time() + Duration::days(3)),
            deposit: None,
        }
    }

    fn faulty() -> ReturnDetails {
        ReturnDetails {
            fault: Some(FaultReport {
                reported_status: ItemStatus::Faulty,
                notes: Some("valve leaks".to_string()),
            }),
            evidence: Some(Evidence("uploads/valve.jpg".to_string())),
        }
    }

    // -----------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------

    #[test]
    fn direct_borrow_and_return_restores_quantity() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let item = w.counted(tenant_id, 3, false);
        let svc = &w.stack.service;

        let loan = svc.open_loan(tenant_id, &root(), loan_for(item)).unwrap();
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(w.quantity(tenant_id, item), 2);
        w.assert_reconciled(tenant_id);

        let loan = svc
            .return_loan(loan.loan_id, &root(), ReturnDetails::default())
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Returned);
        assert_eq!(w.quantity(tenant_id, item), 3);
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn rejected_request_never_touches_the_unit() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let unit = w.unit(tenant_id, "SW-01");
        let svc = &w.stack.service;

        let loan = svc.open_loan(tenant_id, &anyone(), loan_for(unit)).unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(w.unit_state(tenant_id, unit), (true, ItemStatus::Working));

        let loan = w
            .stack
            .queue
            .decide(
                loan.loan_id,
                QueueDecision::Reject {
                    reason: Some("no deposit".to_string()),
                },
                &desk(),
            )
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Rejected);
        assert_eq!(loan.decision_note.as_deref(), Some("no deposit"));
        assert_eq!(loan.decided_by.as_deref(), Some("desk"));
        assert_eq!(w.unit_state(tenant_id, unit), (true, ItemStatus::Working));
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn reported_fault_marks_the_unit_faulty_on_approved_return() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let unit = w.unit(tenant_id, "SW-02");
        let svc = &w.stack.service;
        let queue = &w.stack.queue;

        let loan = svc.open_loan(tenant_id, &anyone(), loan_for(unit)).unwrap();
        let loan = queue
            .decide(loan.loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(w.unit_state(tenant_id, unit), (false, ItemStatus::Working));

        let loan = svc.return_loan(loan.loan_id, &anyone(), faulty()).unwrap();
        assert_eq!(loan.status, LoanStatus::PendingApproval);
        assert_eq!(w.unit_state(tenant_id, unit), (false, ItemStatus::Working));
        w.assert_reconciled(tenant_id);

        let loan = queue
            .decide(loan.loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Returned);
        assert_eq!(w.unit_state(tenant_id, unit), (true, ItemStatus::Faulty));
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn request_approve_submit_approve_round_trip_on_counted_item() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 5, false);
        let svc = &w.stack.service;

        let mut input = loan_for(item);
        input.quantity = Some(2);
        let loan = svc.request(tenant_id, &anyone(), input).unwrap();
        svc.approve(loan.loan_id, &desk()).unwrap();
        assert_eq!(w.quantity(tenant_id, item), 3);

        svc.submit_return(loan.loan_id, &anyone(), ReturnDetails::default())
            .unwrap();
        assert_eq!(w.quantity(tenant_id, item), 3);

        svc.approve_return(loan.loan_id, &desk()).unwrap();
        assert_eq!(w.quantity(tenant_id, item), 5);
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn rejected_return_reverts_to_borrowed_with_reservation_intact() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 2, false);
        let svc = &w.stack.service;

        let loan = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        let borrowed = svc.approve(loan.loan_id, &desk()).unwrap();
        assert_eq!(w.quantity(tenant_id, item), 1);

        w.tick();
        svc.submit_return(loan.loan_id, &anyone(), faulty()).unwrap();
        let reverted = svc
            .reject_return(loan.loan_id, &desk(), Some("still has a flat".to_string()))
            .unwrap();

        assert_eq!(reverted.status, LoanStatus::Borrowed);
        assert_eq!(reverted.return_date, None);
        assert_eq!(reverted.fault, None);
        assert_eq!(reverted.evidence, None);
        assert_eq!(reverted.borrow_date, borrowed.borrow_date);
        assert_eq!(w.quantity(tenant_id, item), 1);
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn repeating_a_return_rejection_through_the_queue_is_a_no_op() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let unit = w.unit(tenant_id, "SW-05");
        let svc = &w.stack.service;
        let queue = &w.stack.queue;

        let loan = svc.request(tenant_id, &anyone(), loan_for(unit)).unwrap();
        queue
            .decide(loan.loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        svc.submit_return(loan.loan_id, &anyone(), faulty()).unwrap();

        let reason = || QueueDecision::Reject {
            reason: Some("rim is bent".to_string()),
        };
        let first = queue.decide(loan.loan_id, reason(), &desk()).unwrap();
        w.tick();
        let second = queue.decide(loan.loan_id, reason(), &desk()).unwrap();

        assert_eq!(first.status, LoanStatus::Borrowed);
        assert_eq!(first, second);
        assert_eq!(w.unit_state(tenant_id, unit), (false, ItemStatus::Working));
        w.assert_reconciled(tenant_id);
    }

    // -----------------------------------------------------------------
    // Idempotence and atomicity
    // -----------------------------------------------------------------

    #[test]
    fn approving_twice_reserves_once() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 4, false);
        let svc = &w.stack.service;

        let loan = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        let first = svc.approve(loan.loan_id, &desk()).unwrap();
        let second = svc.approve(loan.loan_id, &desk()).unwrap();

        assert_eq!(first, second);
        assert_eq!(w.quantity(tenant_id, item), 3);
        assert_eq!(
            w.stack
                .store
                .tenant_history(tenant_id)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn approval_without_stock_leaves_the_loan_pending() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 1, false);
        let svc = &w.stack.service;

        let a = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        w.tick();
        let b = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        svc.approve(a.loan_id, &desk()).unwrap();

        let err = svc.approve(b.loan_id, &desk()).unwrap_err();
        assert_eq!(
            err.as_domain(),
            Some(&DomainError::InsufficientQuantity {
                requested: 1,
                available: 0
            })
        );
        let b = svc.get_loan(b.loan_id, &anyone()).unwrap();
        assert_eq!(b.status, LoanStatus::Pending);
        assert_eq!(b.version, 1);
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn illegal_transition_changes_nothing() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let item = w.counted(tenant_id, 2, false);
        let svc = &w.stack.service;

        let loan = svc.borrow(tenant_id, &root(), loan_for(item)).unwrap();
        svc.return_loan(loan.loan_id, &root(), ReturnDetails::default())
            .unwrap();

        let err = svc.approve(loan.loan_id, &root()).unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::IllegalTransition { .. })
        ));
        assert_eq!(w.quantity(tenant_id, item), 2);
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn consumables_are_written_off_on_return() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let item = w.counted(tenant_id, 10, true);
        let svc = &w.stack.service;

        let mut input = loan_for(item);
        input.quantity = Some(3);
        let loan = svc.borrow(tenant_id, &root(), input).unwrap();
        svc.return_loan(loan.loan_id, &root(), ReturnDetails::default())
            .unwrap();

        let c = svc.ledger().get_counted_item(tenant_id, item).unwrap();
        assert_eq!((c.quantity, c.catalog_total), (7, 7));
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn direct_return_with_fault_marks_item_faulty() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let unit = w.unit(tenant_id, "SW-09");
        let svc = &w.stack.service;

        let loan = svc.borrow(tenant_id, &root(), loan_for(unit)).unwrap();
        svc.return_loan(loan.loan_id, &root(), faulty()).unwrap();
        assert_eq!(w.unit_state(tenant_id, unit), (true, ItemStatus::Faulty));
    }

    // -----------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------

    #[test]
    fn racing_borrows_for_one_unit_have_one_winner() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let unit = w.unit(tenant_id, "SW-03");
        let service = w.stack.service.clone();

        let racers = 8;
        let barrier = Arc::new(Barrier::new(racers));
        let handles: Vec<_> = (0..racers)
            .map(|_| {
                let (service, barrier) = (service.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    service.borrow(tenant_id, &root(), loan_for(unit))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.as_domain(), Some(&DomainError::UnitUnavailable));
        }
        assert_eq!(w.unit_state(tenant_id, unit), (false, ItemStatus::Working));
        assert_eq!(
            service
                .list_loans(tenant_id, &root(), Some(LoanStatus::Borrowed))
                .unwrap()
                .len(),
            1
        );
        w.assert_reconciled(tenant_id);
    }

    #[test]
    fn racing_approvals_for_the_last_counted_unit_have_one_winner() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 1, false);
        let service = w.stack.service.clone();

        let pending: Vec<LoanId> = (0..6)
            .map(|_| {
                service
                    .request(tenant_id, &anyone(), loan_for(item))
                    .unwrap()
                    .loan_id
            })
            .collect();

        let barrier = Arc::new(Barrier::new(pending.len()));
        let handles: Vec<_> = pending
            .into_iter()
            .map(|loan_id| {
                let (service, barrier) = (service.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    service.approve(loan_id, &desk())
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(winners, 1);
        assert_eq!(w.quantity(tenant_id, item), 0);
        w.assert_reconciled(tenant_id);
    }

    // -----------------------------------------------------------------
    // Sink, directory, isolation
    // -----------------------------------------------------------------

    #[test]
    fn committed_transitions_reach_the_sink() {
        let w = World::new();
        let sub = w.stack.sink.subscribe();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 1, false);
        let svc = &w.stack.service;

        let loan = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        svc.approve(loan.loan_id, &desk()).unwrap();
        // No-op: nothing further is published.
        svc.approve(loan.loan_id, &desk()).unwrap();

        let types: Vec<String> = sub
            .drain()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(types, ["lending.loan.requested", "lending.loan.approved"]);
    }

    /// A sink that is always down.
    struct OfflineSink;

    impl EventBus<EventEnvelope<JsonValue>> for OfflineSink {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("offline")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[test]
    fn offline_sink_never_rolls_back_a_transition() {
        let svc = LendingService::new(
            Arc::new(TenantStore::new()),
            Arc::new(InventoryLedger::new()),
            Arc::new(LoanDirectoryProjection::new(Arc::new(
                InMemoryReadModelStore::new(),
            ))),
            Arc::new(TransitionGates::new()),
            TransitionDispatcher::new(Arc::new(InMemoryEventStore::new()), OfflineSink),
            Arc::new(FixedClock::new(test_time())),
        );
        let tenant_id = svc
            .create_tenant("Quiet Station", TenantKind::Station, OperatingMode::Direct, ROOT)
            .unwrap()
            .id_typed();
        let item = svc
            .add_counted_item(
                tenant_id,
                &root(),
                NewCountedItem {
                    name: "Chain tool".to_string(),
                    category: None,
                    quantity: 1,
                    is_consumable: false,
                },
            )
            .unwrap()
            .id_typed();

        let loan = svc.borrow(tenant_id, &root(), loan_for(item)).unwrap();
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(
            svc.ledger().get_counted_item(tenant_id, item).unwrap().quantity,
            0
        );
    }

    #[test]
    fn directory_rebuilds_to_the_same_state() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 3, false);
        let svc = &w.stack.service;

        let a = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        w.tick();
        let b = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        svc.approve(a.loan_id, &desk()).unwrap();
        svc.sign(a.loan_id, &anyone()).unwrap();
        svc.reject(b.loan_id, &desk(), None).unwrap();
        svc.delete(b.loan_id, &root()).unwrap();

        let before = svc.list_loans(tenant_id, &root(), None).unwrap();
        w.stack.rebuild_directory(tenant_id).unwrap();
        let after = svc.list_loans(tenant_id, &root(), None).unwrap();

        assert_eq!(before, after);
        assert_eq!(after.len(), 1);
        assert!(after[0].is_signed);
        assert_eq!(
            svc.get_loan(b.loan_id, &anyone()).unwrap_err().as_domain(),
            Some(&DomainError::NotFound)
        );
    }

    #[test]
    fn queue_lists_oldest_first_and_only_waiting_loans() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 5, false);
        let svc = &w.stack.service;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(svc.request(tenant_id, &anyone(), loan_for(item)).unwrap().loan_id);
            w.tick();
        }
        svc.approve(ids[1], &desk()).unwrap();
        svc.submit_return(ids[1], &anyone(), ReturnDetails::default())
            .unwrap();

        let all: Vec<LoanId> = w
            .stack
            .queue
            .list(tenant_id, &desk(), None)
            .unwrap()
            .into_iter()
            .map(|l| l.loan_id)
            .collect();
        assert_eq!(all, ids);

        let returns = w
            .stack
            .queue
            .list(tenant_id, &desk(), Some(LoanStatus::PendingApproval))
            .unwrap();
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].loan_id, ids[1]);

        assert!(w
            .stack
            .queue
            .list(tenant_id, &desk(), Some(LoanStatus::Returned))
            .is_err());
    }

    #[test]
    fn tenants_cannot_reach_each_others_loans() {
        let w = World::new();
        let a = w.tenant(OperatingMode::Direct);
        let b = w.tenant(OperatingMode::Direct);
        let item_a = w.counted(a, 1, false);
        let svc = &w.stack.service;

        svc.set_credential(b, &root(), "other-root").unwrap();
        let loan = svc.borrow(a, &root(), loan_for(item_a)).unwrap();

        let err = svc
            .return_loan(loan.loan_id, &Presentation::manager("other-root"), ReturnDetails::default())
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::Unauthorized));

        let err = svc.borrow(b, &root(), loan_for(item_a)).unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::Unauthorized | DomainError::NotFound)
        ));
        assert!(svc.list_loans(b, &Presentation::manager("other-root"), None).unwrap().is_empty());
    }

    #[test]
    fn deleted_loan_ids_stay_with_their_tenant() {
        let w = World::new();
        let a = w.tenant(OperatingMode::Direct);
        let b = w.tenant(OperatingMode::Direct);
        let item_a = w.counted(a, 1, false);
        let item_b = w.counted(b, 1, false);
        let svc = &w.stack.service;

        let loan = svc.borrow(a, &root(), loan_for(item_a)).unwrap();
        svc.return_loan(loan.loan_id, &root(), ReturnDetails::default())
            .unwrap();
        svc.delete(loan.loan_id, &root()).unwrap();

        let mut reused = loan_for(item_b);
        reused.loan_id = Some(loan.loan_id);
        let err = svc.borrow(b, &root(), reused).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
        assert_eq!(w.quantity(b, item_b), 1);
        assert!(svc.list_loans(b, &root(), None).unwrap().is_empty());
    }

    #[test]
    fn inactive_tenant_refuses_mutations_but_stays_readable() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let item = w.counted(tenant_id, 2, false);
        let svc = &w.stack.service;
        let loan = svc.borrow(tenant_id, &root(), loan_for(item)).unwrap();

        svc.deactivate_tenant(tenant_id).unwrap();

        let err = svc.borrow(tenant_id, &root(), loan_for(item)).unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::TenantInactive));
        let err = svc
            .return_loan(loan.loan_id, &root(), ReturnDetails::default())
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::TenantInactive));

        assert_eq!(svc.list_loans(tenant_id, &root(), None).unwrap().len(), 1);
        assert_eq!(svc.inventory(tenant_id, &anyone()).unwrap().len(), 1);
    }

    #[test]
    fn submitted_return_checks_the_tenant_before_its_return_policy() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let item = w.counted(tenant_id, 1, false);
        let svc = &w.stack.service;
        let loan = svc.borrow(tenant_id, &root(), loan_for(item)).unwrap();

        svc.configure(
            tenant_id,
            &root(),
            &TenantSettings {
                access_code: Some(Some("1357".to_string())),
                ..TenantSettings::default()
            },
        )
        .unwrap();
        let err = svc
            .submit_return(loan.loan_id, &anyone(), ReturnDetails::default())
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::Unauthorized));

        let err = svc
            .submit_return(
                loan.loan_id,
                &Presentation::access_code("1357"),
                ReturnDetails::default(),
            )
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::WrongMode { .. })));

        svc.deactivate_tenant(tenant_id).unwrap();
        let err = svc
            .submit_return(
                loan.loan_id,
                &Presentation::access_code("1357"),
                ReturnDetails::default(),
            )
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::TenantInactive));
    }

    #[test]
    fn access_code_and_caller_identity_gate_public_intents() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 2, false);
        let svc = &w.stack.service;

        svc.configure(
            tenant_id,
            &root(),
            &TenantSettings {
                access_code: Some(Some("2468".to_string())),
                require_caller_id: Some(true),
                ..TenantSettings::default()
            },
        )
        .unwrap();

        let err = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::Unauthorized));

        let mut no_phone = loan_for(item);
        no_phone.borrower.phone = None;
        let err = svc
            .request(tenant_id, &Presentation::access_code("2468"), no_phone)
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Validation(_))));

        let loan = svc
            .request(tenant_id, &Presentation::access_code("2468"), loan_for(item))
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
    }

    #[test]
    fn return_without_approval_requires_full_access() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Request);
        let item = w.counted(tenant_id, 1, false);
        let svc = &w.stack.service;
        svc.configure(
            tenant_id,
            &root(),
            &TenantSettings {
                return_approval: Some(Some(false)),
                ..TenantSettings::default()
            },
        )
        .unwrap();

        let loan = svc.request(tenant_id, &anyone(), loan_for(item)).unwrap();
        svc.approve(loan.loan_id, &desk()).unwrap();

        let err = svc
            .return_loan(loan.loan_id, &anyone(), ReturnDetails::default())
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::Unauthorized));
        let err = svc
            .return_loan(loan.loan_id, &desk(), ReturnDetails::default())
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Forbidden(_))));

        let loan = svc
            .return_loan(loan.loan_id, &root(), ReturnDetails::default())
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Returned);
        assert_eq!(w.quantity(tenant_id, item), 1);
    }

    #[test]
    fn open_loans_cannot_be_deleted() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let item = w.counted(tenant_id, 1, false);
        let svc = &w.stack.service;
        let loan = svc.borrow(tenant_id, &root(), loan_for(item)).unwrap();

        let err = svc.delete(loan.loan_id, &root()).unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::IllegalTransition { .. })
        ));
        let err = svc.delete(loan.loan_id, &desk()).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Forbidden(_))));
    }

    #[test]
    fn unit_matching_picks_the_oldest_available_working_unit() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let first = w.unit(tenant_id, "SW-10");
        w.tick();
        let second = w.unit(tenant_id, "SW-11");
        w.tick();
        let third = w.unit(tenant_id, "SW-12");
        let svc = &w.stack.service;
        svc.set_item_status(tenant_id, &root(), first, ItemStatus::Faulty)
            .unwrap();

        let mut input = loan_for(ItemId::new());
        input.item = ItemSelector::Matching(UnitQuery {
            size: Some("185/65r15".to_string()),
            bolt_pattern: None,
            category: None,
        });

        let a = svc.borrow(tenant_id, &root(), input.clone()).unwrap();
        let b = svc.borrow(tenant_id, &root(), input.clone()).unwrap();
        assert_eq!(a.item.item_id, second);
        assert_eq!(b.item.item_id, third);

        let err = svc.borrow(tenant_id, &root(), input).unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::UnitUnavailable));
    }

    #[test]
    fn drift_is_reported_until_repaired() {
        let w = World::new();
        let tenant_id = w.tenant(OperatingMode::Direct);
        let unit = w.unit(tenant_id, "SW-20");
        let svc = &w.stack.service;
        let loan = svc.borrow(tenant_id, &root(), loan_for(unit)).unwrap();

        // An operator flips the unit by hand while the loan is still open.
        svc.repair(
            tenant_id,
            &root(),
            unit,
            &RepairAction::SetAvailability { is_available: true },
        )
        .unwrap();

        let found = w.stack.reconciliation.diagnose(tenant_id, &desk()).unwrap();
        assert_eq!(
            found,
            vec![Discrepancy::AvailabilityMismatch {
                item_id: unit,
                expected_available: false,
                actual_available: true,
                open_loans: vec![loan.loan_id],
            }]
        );

        svc.repair(
            tenant_id,
            &root(),
            unit,
            &RepairAction::SetAvailability {
                is_available: false,
            },
        )
        .unwrap();
        w.assert_reconciled(tenant_id);
        assert!(w.stack.reconciliation.verify_all().unwrap().is_empty());
    }

    // -----------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Step {
        Borrow(u32),
        Return(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1u32..4).prop_map(Step::Borrow),
            (0usize..16).prop_map(Step::Return),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

        #[test]
        fn counted_stock_stays_in_bounds_and_reconciled(
            total in 1u32..8,
            steps in prop::collection::vec(step(), 1..24),
        ) {
            let w = World::new();
            let tenant_id = w.tenant(OperatingMode::Direct);
            let item = w.counted(tenant_id, total, false);
            let svc = &w.stack.service;
            let mut open: Vec<LoanId> = Vec::new();

            for s in steps {
                match s {
                    Step::Borrow(qty) => {
                        let before = w.quantity(tenant_id, item);
                        let mut input = loan_for(item);
                        input.quantity = Some(qty);
                        match svc.borrow(tenant_id, &root(), input) {
                            Ok(loan) => open.push(loan.loan_id),
                            Err(err) => {
                                prop_assert!(qty > before);
                                let short = matches!(
                                    err.as_domain(),
                                    Some(DomainError::InsufficientQuantity { .. })
                                );
                                prop_assert!(short);
                            }
                        }
                    }
                    Step::Return(i) if !open.is_empty() => {
                        let loan_id = open.remove(i % open.len());
                        svc.return_loan(loan_id, &root(), ReturnDetails::default()).unwrap();
                    }
                    Step::Return(_) => {}
                }

                let c = svc.ledger().get_counted_item(tenant_id, item).unwrap();
                prop_assert!(c.quantity <= c.catalog_total);
                prop_assert!(w.stack.reconciliation.verify(tenant_id).unwrap().is_empty());
            }

            for loan_id in open {
                svc.return_loan(loan_id, &root(), ReturnDetails::default()).unwrap();
            }
            prop_assert_eq!(w.quantity(tenant_id, item), total);
        }

        #[test]
        fn unit_is_unavailable_exactly_while_a_loan_holds_it(rounds in 1usize..5) {
            let w = World::new();
            let tenant_id = w.tenant(OperatingMode::Direct);
            let unit = w.unit(tenant_id, "SW-P");
            let svc = &w.stack.service;

            prop_assert!(w.unit_state(tenant_id, unit).0);
            for _ in 0..rounds {
                let loan = svc.borrow(tenant_id, &root(), loan_for(unit)).unwrap();
                prop_assert!(!w.unit_state(tenant_id, unit).0);
                let again = svc.borrow(tenant_id, &root(), loan_for(unit)).unwrap_err();
                prop_assert_eq!(again.as_domain(), Some(&DomainError::UnitUnavailable));
                svc.return_loan(loan.loan_id, &root(), ReturnDetails::default()).unwrap();
                prop_assert!(w.unit_state(tenant_id, unit).0);
                w.assert_reconciled(tenant_id);
            }
        }
    }
}
