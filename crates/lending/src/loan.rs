use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stationlend_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ItemId, TenantId, ValueObject};
use stationlend_events::{Command, Event};
use stationlend_inventory::{ItemKind, ItemStatus};

/// Loan identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub AggregateId);

impl LoanId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for LoanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for LoanId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AggregateId>().map(Self)
    }
}

/// Loan status lifecycle.
///
/// ```text
/// (none) --request--> pending --approve--> borrowed
/// (none) --borrow---> borrowed
/// pending --reject--> rejected
/// borrowed --return--> returned
/// borrowed --submit-return--> pending_approval --approve-return--> returned
///                             pending_approval --reject-return--> borrowed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Borrowed,
    PendingApproval,
    Returned,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::PendingApproval => "pending_approval",
            LoanStatus::Returned => "returned",
            LoanStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Returned | LoanStatus::Rejected)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses in which the loan holds stock taken from the ledger.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::PendingApproval)
    }

    /// Statuses surfaced by the approval queue.
    pub fn awaits_decision(&self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::PendingApproval)
    }
}

impl core::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for LoanStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "borrowed" => Ok(LoanStatus::Borrowed),
            "pending_approval" => Ok(LoanStatus::PendingApproval),
            "returned" => Ok(LoanStatus::Returned),
            "rejected" => Ok(LoanStatus::Rejected),
            other => Err(DomainError::validation(format!("unknown loan status '{other}'"))),
        }
    }
}

/// The inventory row a loan draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub item_id: ItemId,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ValueObject for Borrower {}

/// What the borrower left as security (ID card, cash, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl ValueObject for Deposit {}

/// Condition reported by the borrower on return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub reported_status: ItemStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FaultReport {
    pub fn marks_faulty(&self) -> bool {
        self.reported_status == ItemStatus::Faulty
    }
}

impl ValueObject for FaultReport {}

/// Reference to uploaded evidence (e.g. a photo URL). Storage is external.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Evidence(pub String);

impl ValueObject for Evidence {}

/// Everything fixed when a loan is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub item: ItemRef,
    pub quantity: u32,
    pub borrower: Borrower,
    #[serde(default)]
    pub expected_return_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deposit: Option<Deposit>,
}

impl LoanTerms {
    fn validate(&self) -> Result<(), DomainError> {
        if self.borrower.name.trim().is_empty() {
            return Err(DomainError::validation("borrower name cannot be empty"));
        }
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if self.item.kind == ItemKind::Unit && self.quantity != 1 {
            return Err(DomainError::validation("a unit is lent one at a time"));
        }
        if let Some(deposit) = &self.deposit
            && deposit.kind.trim().is_empty()
        {
            return Err(DomainError::validation("deposit type cannot be empty"));
        }
        Ok(())
    }
}

/// Aggregate root: Loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    id: LoanId,
    tenant_id: Option<TenantId>,
    status: LoanStatus,
    terms: Option<LoanTerms>,
    requested_at: Option<DateTime<Utc>>,
    borrow_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    signed_at: Option<DateTime<Utc>>,
    fault: Option<FaultReport>,
    evidence: Option<Evidence>,
    decision_note: Option<String>,
    decided_by: Option<String>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Loan {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LoanId) -> Self {
        Self {
            id,
            tenant_id: None,
            status: LoanStatus::Pending,
            terms: None,
            requested_at: None,
            borrow_date: None,
            return_date: None,
            signed_at: None,
            fault: None,
            evidence: None,
            decision_note: None,
            decided_by: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LoanId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn terms(&self) -> Option<&LoanTerms> {
        self.terms.as_ref()
    }

    pub fn item(&self) -> Option<ItemRef> {
        self.terms.as_ref().map(|t| t.item)
    }

    pub fn quantity(&self) -> u32 {
        self.terms.as_ref().map_or(0, |t| t.quantity)
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn borrow_date(&self) -> Option<DateTime<Utc>> {
        self.borrow_date
    }

    pub fn return_date(&self) -> Option<DateTime<Utc>> {
        self.return_date
    }

    pub fn is_signed(&self) -> bool {
        self.signed_at.is_some()
    }

    pub fn signed_at(&self) -> Option<DateTime<Utc>> {
        self.signed_at
    }

    pub fn fault(&self) -> Option<&FaultReport> {
        self.fault.as_ref()
    }

    pub fn evidence(&self) -> Option<&Evidence> {
        self.evidence.as_ref()
    }

    pub fn decision_note(&self) -> Option<&str> {
        self.decision_note.as_deref()
    }

    pub fn decided_by(&self) -> Option<&str> {
        self.decided_by.as_deref()
    }
}

impl AggregateRoot for Loan {
    type Id = LoanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestLoan (end user, request mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub terms: LoanTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BorrowLoan (manager hands the item over directly).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub terms: LoanTerms,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnLoan (manager marks the loan returned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub fault: Option<FaultReport>,
    pub evidence: Option<Evidence>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitReturn (borrower hands the item back for review).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReturn {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub fault: Option<FaultReport>,
    pub evidence: Option<Evidence>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveReturn {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReturn {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SignLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteLoan (closed history only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanCommand {
    Request(RequestLoan),
    Borrow(BorrowLoan),
    Approve(ApproveLoan),
    Reject(RejectLoan),
    Return(ReturnLoan),
    SubmitReturn(SubmitReturn),
    ApproveReturn(ApproveReturn),
    RejectReturn(RejectReturn),
    Sign(SignLoan),
    Delete(DeleteLoan),
}

impl LoanCommand {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            LoanCommand::Request(c) => c.tenant_id,
            LoanCommand::Borrow(c) => c.tenant_id,
            LoanCommand::Approve(c) => c.tenant_id,
            LoanCommand::Reject(c) => c.tenant_id,
            LoanCommand::Return(c) => c.tenant_id,
            LoanCommand::SubmitReturn(c) => c.tenant_id,
            LoanCommand::ApproveReturn(c) => c.tenant_id,
            LoanCommand::RejectReturn(c) => c.tenant_id,
            LoanCommand::Sign(c) => c.tenant_id,
            LoanCommand::Delete(c) => c.tenant_id,
        }
    }

    pub fn loan_id(&self) -> LoanId {
        match self {
            LoanCommand::Request(c) => c.loan_id,
            LoanCommand::Borrow(c) => c.loan_id,
            LoanCommand::Approve(c) => c.loan_id,
            LoanCommand::Reject(c) => c.loan_id,
            LoanCommand::Return(c) => c.loan_id,
            LoanCommand::SubmitReturn(c) => c.loan_id,
            LoanCommand::ApproveReturn(c) => c.loan_id,
            LoanCommand::RejectReturn(c) => c.loan_id,
            LoanCommand::Sign(c) => c.loan_id,
            LoanCommand::Delete(c) => c.loan_id,
        }
    }
}

impl Command for LoanCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.loan_id().0
    }

    fn intent(&self) -> &'static str {
        match self {
            LoanCommand::Request(_) => "request",
            LoanCommand::Borrow(_) => "borrow",
            LoanCommand::Approve(_) => "approve",
            LoanCommand::Reject(_) => "reject",
            LoanCommand::Return(_) => "return",
            LoanCommand::SubmitReturn(_) => "submit-return",
            LoanCommand::ApproveReturn(_) => "approve-return",
            LoanCommand::RejectReturn(_) => "reject-return",
            LoanCommand::Sign(_) => "sign",
            LoanCommand::Delete(_) => "delete",
        }
    }
}

/// Event: LoanRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequested {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub terms: LoanTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanBorrowed (opened directly as borrowed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanBorrowed {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub terms: LoanTerms,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApproved {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub item: ItemRef,
    pub quantity: u32,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRejected {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanReturned (direct return).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanReturned {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub item: ItemRef,
    pub quantity: u32,
    pub fault: Option<FaultReport>,
    pub evidence: Option<Evidence>,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSubmitted {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub fault: Option<FaultReport>,
    pub evidence: Option<Evidence>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnApproved {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub item: ItemRef,
    pub quantity: u32,
    /// The borrower reported the item faulty; the ledger flags it.
    pub mark_faulty: bool,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRejected {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanSigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSigned {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanDeleted {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub decided_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanEvent {
    LoanRequested(LoanRequested),
    LoanBorrowed(LoanBorrowed),
    LoanApproved(LoanApproved),
    LoanRejected(LoanRejected),
    LoanReturned(LoanReturned),
    ReturnSubmitted(ReturnSubmitted),
    ReturnApproved(ReturnApproved),
    ReturnRejected(ReturnRejected),
    LoanSigned(LoanSigned),
    LoanDeleted(LoanDeleted),
}

impl LoanEvent {
    pub fn loan_id(&self) -> LoanId {
        match self {
            LoanEvent::LoanRequested(e) => e.loan_id,
            LoanEvent::LoanBorrowed(e) => e.loan_id,
            LoanEvent::LoanApproved(e) => e.loan_id,
            LoanEvent::LoanRejected(e) => e.loan_id,
            LoanEvent::LoanReturned(e) => e.loan_id,
            LoanEvent::ReturnSubmitted(e) => e.loan_id,
            LoanEvent::ReturnApproved(e) => e.loan_id,
            LoanEvent::ReturnRejected(e) => e.loan_id,
            LoanEvent::LoanSigned(e) => e.loan_id,
            LoanEvent::LoanDeleted(e) => e.loan_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            LoanEvent::LoanRequested(e) => e.tenant_id,
            LoanEvent::LoanBorrowed(e) => e.tenant_id,
            LoanEvent::LoanApproved(e) => e.tenant_id,
            LoanEvent::LoanRejected(e) => e.tenant_id,
            LoanEvent::LoanReturned(e) => e.tenant_id,
            LoanEvent::ReturnSubmitted(e) => e.tenant_id,
            LoanEvent::ReturnApproved(e) => e.tenant_id,
            LoanEvent::ReturnRejected(e) => e.tenant_id,
            LoanEvent::LoanSigned(e) => e.tenant_id,
            LoanEvent::LoanDeleted(e) => e.tenant_id,
        }
    }
}

impl Event for LoanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::LoanRequested(_) => "lending.loan.requested",
            LoanEvent::LoanBorrowed(_) => "lending.loan.borrowed",
            LoanEvent::LoanApproved(_) => "lending.loan.approved",
            LoanEvent::LoanRejected(_) => "lending.loan.rejected",
            LoanEvent::LoanReturned(_) => "lending.loan.returned",
            LoanEvent::ReturnSubmitted(_) => "lending.loan.return_submitted",
            LoanEvent::ReturnApproved(_) => "lending.loan.return_approved",
            LoanEvent::ReturnRejected(_) => "lending.loan.return_rejected",
            LoanEvent::LoanSigned(_) => "lending.loan.signed",
            LoanEvent::LoanDeleted(_) => "lending.loan.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LoanEvent::LoanRequested(e) => e.occurred_at,
            LoanEvent::LoanBorrowed(e) => e.occurred_at,
            LoanEvent::LoanApproved(e) => e.occurred_at,
            LoanEvent::LoanRejected(e) => e.occurred_at,
            LoanEvent::LoanReturned(e) => e.occurred_at,
            LoanEvent::ReturnSubmitted(e) => e.occurred_at,
            LoanEvent::ReturnApproved(e) => e.occurred_at,
            LoanEvent::ReturnRejected(e) => e.occurred_at,
            LoanEvent::LoanSigned(e) => e.occurred_at,
            LoanEvent::LoanDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Loan {
    type Command = LoanCommand;
    type Event = LoanEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LoanEvent::LoanRequested(e) => {
                self.id = e.loan_id;
                self.tenant_id = Some(e.tenant_id);
                self.status = LoanStatus::Pending;
                self.terms = Some(e.terms.clone());
                self.requested_at = Some(e.occurred_at);
                self.created = true;
            }
            LoanEvent::LoanBorrowed(e) => {
                self.id = e.loan_id;
                self.tenant_id = Some(e.tenant_id);
                self.status = LoanStatus::Borrowed;
                self.terms = Some(e.terms.clone());
                self.requested_at = Some(e.occurred_at);
                self.borrow_date = Some(e.occurred_at);
                self.decided_by = e.decided_by.clone();
                self.created = true;
            }
            LoanEvent::LoanApproved(e) => {
                self.status = LoanStatus::Borrowed;
                self.borrow_date = Some(e.occurred_at);
                self.decided_by = e.decided_by.clone();
            }
            LoanEvent::LoanRejected(e) => {
                self.status = LoanStatus::Rejected;
                self.decided_by = e.decided_by.clone();
                self.decision_note = e.reason.clone();
            }
            LoanEvent::LoanReturned(e) => {
                self.status = LoanStatus::Returned;
                self.return_date = Some(e.occurred_at);
                self.fault = e.fault.clone();
                self.evidence = e.evidence.clone();
                self.decided_by = e.decided_by.clone();
            }
            LoanEvent::ReturnSubmitted(e) => {
                self.status = LoanStatus::PendingApproval;
                self.return_date = Some(e.occurred_at);
                self.fault = e.fault.clone();
                self.evidence = e.evidence.clone();
            }
            LoanEvent::ReturnApproved(e) => {
                self.status = LoanStatus::Returned;
                self.decided_by = e.decided_by.clone();
            }
            LoanEvent::ReturnRejected(e) => {
                // Back to exactly what `borrowed` looked like before submission.
                self.status = LoanStatus::Borrowed;
                self.return_date = None;
                self.fault = None;
                self.evidence = None;
                self.decided_by = e.decided_by.clone();
                self.decision_note = e.reason.clone();
            }
            LoanEvent::LoanSigned(e) => {
                self.signed_at = Some(e.occurred_at);
            }
            LoanEvent::LoanDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.created {
            self.ensure_tenant(command.tenant_id())?;
        }
        self.ensure_loan_id(command.loan_id())?;

        match command {
            LoanCommand::Request(cmd) => self.handle_request(cmd),
            LoanCommand::Borrow(cmd) => self.handle_borrow(cmd),
            LoanCommand::Approve(cmd) => self.handle_approve(cmd),
            LoanCommand::Reject(cmd) => self.handle_reject(cmd),
            LoanCommand::Return(cmd) => self.handle_return(cmd),
            LoanCommand::SubmitReturn(cmd) => self.handle_submit_return(cmd),
            LoanCommand::ApproveReturn(cmd) => self.handle_approve_return(cmd),
            LoanCommand::RejectReturn(cmd) => self.handle_reject_return(cmd),
            LoanCommand::Sign(cmd) => self.handle_sign(cmd),
            LoanCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

type Decision = Result<Vec<LoanEvent>, DomainError>;

impl Loan {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.tenant_id != Some(tenant_id) {
            // Other tenants' loans do not exist from the caller's point of view.
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_loan_id(&self, loan_id: LoanId) -> Result<(), DomainError> {
        if self.id != loan_id {
            return Err(DomainError::invariant("loan_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn illegal(&self, intent: &str) -> DomainError {
        DomainError::illegal(self.status, intent)
    }

    fn current_terms(&self) -> Result<&LoanTerms, DomainError> {
        self.terms
            .as_ref()
            .ok_or_else(|| DomainError::invariant("created loan without terms"))
    }

    fn handle_request(&self, cmd: &RequestLoan) -> Decision {
        if self.created {
            // Replayed request for the same loan id.
            return match self.status {
                LoanStatus::Pending if !self.deleted => Ok(vec![]),
                _ => Err(self.illegal("request")),
            };
        }
        cmd.terms.validate()?;

        Ok(vec![LoanEvent::LoanRequested(LoanRequested {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            terms: cmd.terms.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_borrow(&self, cmd: &BorrowLoan) -> Decision {
        if self.created {
            return match self.status {
                LoanStatus::Borrowed if !self.deleted => Ok(vec![]),
                _ => Err(self.illegal("borrow")),
            };
        }
        cmd.terms.validate()?;

        Ok(vec![LoanEvent::LoanBorrowed(LoanBorrowed {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            terms: cmd.terms.clone(),
            decided_by: cmd.decided_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveLoan) -> Decision {
        self.ensure_live()?;
        match self.status {
            LoanStatus::Pending => {
                let terms = self.current_terms()?;
                Ok(vec![LoanEvent::LoanApproved(LoanApproved {
                    tenant_id: cmd.tenant_id,
                    loan_id: cmd.loan_id,
                    item: terms.item,
                    quantity: terms.quantity,
                    decided_by: cmd.decided_by.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            LoanStatus::Borrowed => Ok(vec![]),
            _ => Err(self.illegal("approve")),
        }
    }

    fn handle_reject(&self, cmd: &RejectLoan) -> Decision {
        self.ensure_live()?;
        match self.status {
            LoanStatus::Pending => Ok(vec![LoanEvent::LoanRejected(LoanRejected {
                tenant_id: cmd.tenant_id,
                loan_id: cmd.loan_id,
                decided_by: cmd.decided_by.clone(),
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            LoanStatus::Rejected => Ok(vec![]),
            _ => Err(self.illegal("reject")),
        }
    }

    fn handle_return(&self, cmd: &ReturnLoan) -> Decision {
        self.ensure_live()?;
        match self.status {
            LoanStatus::Borrowed => {
                let terms = self.current_terms()?;
                Ok(vec![LoanEvent::LoanReturned(LoanReturned {
                    tenant_id: cmd.tenant_id,
                    loan_id: cmd.loan_id,
                    item: terms.item,
                    quantity: terms.quantity,
                    fault: cmd.fault.clone(),
                    evidence: cmd.evidence.clone(),
                    decided_by: cmd.decided_by.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            LoanStatus::Returned => Ok(vec![]),
            _ => Err(self.illegal("return")),
        }
    }

    fn handle_submit_return(&self, cmd: &SubmitReturn) -> Decision {
        self.ensure_live()?;
        match self.status {
            LoanStatus::Borrowed => Ok(vec![LoanEvent::ReturnSubmitted(ReturnSubmitted {
                tenant_id: cmd.tenant_id,
                loan_id: cmd.loan_id,
                fault: cmd.fault.clone(),
                evidence: cmd.evidence.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            LoanStatus::PendingApproval => Ok(vec![]),
            _ => Err(self.illegal("submit-return")),
        }
    }

    fn handle_approve_return(&self, cmd: &ApproveReturn) -> Decision {
        self.ensure_live()?;
        match self.status {
            LoanStatus::PendingApproval => {
                let terms = self.current_terms()?;
                Ok(vec![LoanEvent::ReturnApproved(ReturnApproved {
                    tenant_id: cmd.tenant_id,
                    loan_id: cmd.loan_id,
                    item: terms.item,
                    quantity: terms.quantity,
                    mark_faulty: self.fault.as_ref().is_some_and(FaultReport::marks_faulty),
                    decided_by: cmd.decided_by.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            LoanStatus::Returned => Ok(vec![]),
            _ => Err(self.illegal("approve-return")),
        }
    }

    fn handle_reject_return(&self, cmd: &RejectReturn) -> Decision {
        self.ensure_live()?;
        match self.status {
            LoanStatus::PendingApproval => Ok(vec![LoanEvent::ReturnRejected(ReturnRejected {
                tenant_id: cmd.tenant_id,
                loan_id: cmd.loan_id,
                decided_by: cmd.decided_by.clone(),
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            LoanStatus::Borrowed => Ok(vec![]),
            _ => Err(self.illegal("reject-return")),
        }
    }

    fn handle_sign(&self, cmd: &SignLoan) -> Decision {
        self.ensure_live()?;
        if self.is_signed() {
            return Ok(vec![]);
        }
        match self.status {
            LoanStatus::Pending | LoanStatus::Borrowed => {
                Ok(vec![LoanEvent::LoanSigned(LoanSigned {
                    tenant_id: cmd.tenant_id,
                    loan_id: cmd.loan_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            _ => Err(self.illegal("sign")),
        }
    }

    fn handle_delete(&self, cmd: &DeleteLoan) -> Decision {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Ok(vec![]);
        }
        if self.status.is_open() {
            return Err(self.illegal("delete"));
        }
        Ok(vec![LoanEvent::LoanDeleted(LoanDeleted {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            decided_by: cmd.decided_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
