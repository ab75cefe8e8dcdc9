//! Approval queue: loans waiting on a manager decision.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use stationlend_auth::{Intent, Presentation};
use stationlend_core::{DomainError, TenantId};
use stationlend_events::{EventBus, EventEnvelope};
use stationlend_lending::{LoanId, LoanStatus};

use crate::error::ServiceResult;
use crate::event_store::EventStore;
use crate::projections::LoanRecord;
use crate::service::LendingService;

/// A manager's verdict on a queued loan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QueueDecision {
    Approve,
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
}

pub struct ApprovalQueue<S, B> {
    service: Arc<LendingService<S, B>>,
}

impl<S, B> ApprovalQueue<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(service: Arc<LendingService<S, B>>) -> Self {
        Self { service }
    }

    /// Queue entries oldest first, optionally narrowed to one of the two
    /// waiting statuses.
    pub fn list(
        &self,
        tenant_id: TenantId,
        presented: &Presentation,
        status: Option<LoanStatus>,
    ) -> ServiceResult<Vec<LoanRecord>> {
        if let Some(status) = status
            && !status.awaits_decision()
        {
            return Err(DomainError::validation(format!(
                "'{status}' is not a queue status; use pending or pending_approval"
            ))
            .into());
        }

        self.service
            .authorize(tenant_id, presented, Intent::ViewDiagnostics)?;
        Ok(self
            .service
            .loans()
            .list(tenant_id, status)
            .into_iter()
            .filter(|l| l.status.awaits_decision())
            .collect())
    }

    /// Route a decision to the transition the loan's status calls for.
    ///
    /// A loan already past the queue goes through the same transition, so
    /// repeating a decision is a no-op and contradicting one is an
    /// `IllegalTransition`. A borrowed loan whose return was just rejected
    /// still counts as being in the return half.
    pub fn decide(
        &self,
        loan_id: LoanId,
        decision: QueueDecision,
        presented: &Presentation,
    ) -> ServiceResult<LoanRecord> {
        let tenant_id = self
            .service
            .loans()
            .locate(loan_id)
            .ok_or(DomainError::NotFound)?;
        let record = self
            .service
            .loans()
            .get(tenant_id, &loan_id)
            .ok_or(DomainError::NotFound)?;

        let returning = match record.status {
            LoanStatus::PendingApproval | LoanStatus::Returned => true,
            LoanStatus::Borrowed => record.return_rejected,
            _ => false,
        };
        match (decision, returning) {
            (QueueDecision::Approve, false) => self.service.approve(loan_id, presented),
            (QueueDecision::Reject { reason }, false) => {
                self.service.reject(loan_id, presented, reason)
            }
            (QueueDecision::Approve, true) => self.service.approve_return(loan_id, presented),
            (QueueDecision::Reject { reason }, true) => {
                self.service.reject_return(loan_id, presented, reason)
            }
        }
    }

    /// `decide-return`: only routes to the return half of the queue.
    pub fn decide_return(
        &self,
        loan_id: LoanId,
        decision: QueueDecision,
        presented: &Presentation,
    ) -> ServiceResult<LoanRecord> {
        match decision {
            QueueDecision::Approve => self.service.approve_return(loan_id, presented),
            QueueDecision::Reject { reason } => {
                self.service.reject_return(loan_id, presented, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stationlend_auth::AccessTier;
    use stationlend_core::ItemId;
    use stationlend_inventory::NewCountedItem;
    use stationlend_lending::Borrower;
    use stationlend_tenancy::{OperatingMode, TenantKind};

    use crate::service::{ItemSelector, OpenLoan, ReturnDetails};
    use crate::stack::InMemoryStack;

    fn desk() -> Presentation {
        Presentation::manager("desk-secret")
    }

    fn reject(reason: &str) -> QueueDecision {
        QueueDecision::Reject {
            reason: Some(reason.to_string()),
        }
    }

    /// A request-mode tenant with one pump in stock and a borrowed loan on it.
    fn borrowed_loan() -> (InMemoryStack, TenantId, ItemId, LoanId) {
        let stack = InMemoryStack::new();
        let svc = &stack.service;
        let root = Presentation::manager("root-secret");
        let tenant_id = svc
            .create_tenant(
                "Harbor Station",
                TenantKind::Station,
                OperatingMode::Request,
                "root-secret",
            )
            .unwrap()
            .id_typed();
        svc.add_manager(tenant_id, &root, "desk", "desk-secret", AccessTier::ApproveRequests)
            .unwrap();
        let item = svc
            .add_counted_item(
                tenant_id,
                &root,
                NewCountedItem {
                    name: "Tire pump".to_string(),
                    category: None,
                    quantity: 1,
                    is_consumable: false,
                },
            )
            .unwrap()
            .id_typed();
        let loan = svc
            .request(
                tenant_id,
                &Presentation::anonymous(),
                OpenLoan {
                    loan_id: None,
                    item: ItemSelector::Item(item),
                    quantity: None,
                    borrower: Borrower {
                        name: "Noa".to_string(),
                        phone: None,
                    },
                    expected_return_date: None,
                    deposit: None,
                },
            )
            .unwrap();
        let queue = &stack.queue;
        queue
            .decide(loan.loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        (stack, tenant_id, item, loan.loan_id)
    }

    fn submit(stack: &InMemoryStack, loan_id: LoanId) {
        stack
            .service
            .submit_return(loan_id, &Presentation::anonymous(), ReturnDetails::default())
            .unwrap();
    }

    fn stock(stack: &InMemoryStack, tenant_id: TenantId, item: ItemId) -> u32 {
        stack
            .service
            .ledger()
            .get_counted_item(tenant_id, item)
            .unwrap()
            .quantity
    }

    #[test]
    fn pending_loans_route_to_approve_and_reject() {
        let (stack, tenant_id, item, loan_id) = borrowed_loan();
        assert_eq!(stock(&stack, tenant_id, item), 0);

        let again = stack
            .queue
            .decide(loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        assert_eq!(again.status, LoanStatus::Borrowed);
        assert_eq!(stock(&stack, tenant_id, item), 0);

        let err = stack.queue.decide(loan_id, reject("late"), &desk()).unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn rejecting_a_pending_request_twice_is_a_no_op() {
        let (stack, tenant_id, item, _) = borrowed_loan();
        let svc = &stack.service;
        let other = svc
            .request(
                tenant_id,
                &Presentation::anonymous(),
                OpenLoan {
                    loan_id: None,
                    item: ItemSelector::Item(item),
                    quantity: None,
                    borrower: Borrower {
                        name: "Omer".to_string(),
                        phone: None,
                    },
                    expected_return_date: None,
                    deposit: None,
                },
            )
            .unwrap();

        let first = stack
            .queue
            .decide(other.loan_id, reject("out of stock"), &desk())
            .unwrap();
        let second = stack
            .queue
            .decide(other.loan_id, reject("out of stock"), &desk())
            .unwrap();
        assert_eq!(first.status, LoanStatus::Rejected);
        assert_eq!(first, second);
    }

    #[test]
    fn submitted_returns_route_to_approve_return() {
        let (stack, tenant_id, item, loan_id) = borrowed_loan();
        submit(&stack, loan_id);

        let first = stack
            .queue
            .decide(loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        let second = stack
            .queue
            .decide(loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        assert_eq!(first.status, LoanStatus::Returned);
        assert_eq!(first, second);
        assert_eq!(stock(&stack, tenant_id, item), 1);
    }

    #[test]
    fn repeated_return_rejection_is_a_no_op() {
        let (stack, tenant_id, item, loan_id) = borrowed_loan();
        submit(&stack, loan_id);

        let first = stack
            .queue
            .decide(loan_id, reject("still flat"), &desk())
            .unwrap();
        assert_eq!(first.status, LoanStatus::Borrowed);
        assert!(first.return_rejected);

        let second = stack
            .queue
            .decide(loan_id, reject("still flat"), &desk())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(stock(&stack, tenant_id, item), 0);

        let err = stack
            .queue
            .decide(loan_id, QueueDecision::Approve, &desk())
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn resubmitting_after_a_rejection_reopens_the_return() {
        let (stack, tenant_id, item, loan_id) = borrowed_loan();
        submit(&stack, loan_id);
        stack
            .queue
            .decide(loan_id, reject("still flat"), &desk())
            .unwrap();

        submit(&stack, loan_id);
        let queued = stack.service.get_loan(loan_id, &desk()).unwrap();
        assert_eq!(queued.status, LoanStatus::PendingApproval);
        assert!(!queued.return_rejected);

        let returned = stack
            .queue
            .decide(loan_id, QueueDecision::Approve, &desk())
            .unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(stock(&stack, tenant_id, item), 1);
    }

    #[test]
    fn decisions_deserialize_from_action_tags() {
        let approve: QueueDecision = serde_json::from_str(r#"{"action":"approve"}"#).unwrap();
        assert_eq!(approve, QueueDecision::Approve);

        let reject: QueueDecision =
            serde_json::from_str(r#"{"action":"reject","reason":"no deposit"}"#).unwrap();
        assert_eq!(
            reject,
            QueueDecision::Reject {
                reason: Some("no deposit".to_string())
            }
        );
    }
}
