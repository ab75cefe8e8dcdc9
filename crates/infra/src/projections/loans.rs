use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stationlend_core::{AggregateId, ItemId, TenantId};
use stationlend_events::EventEnvelope;
use stationlend_lending::{
    Borrower, Deposit, Evidence, FaultReport, ItemRef, LoanEvent, LoanId, LoanStatus, LoanTerms,
};

use crate::event_store::StoredEvent;
use crate::read_model::{InMemoryReadModelStore, ReadModelStore};

pub const LOAN_AGGREGATE_TYPE: &str = "lending.loan";

/// The loan directory over the in-memory store.
pub type LoanDirectory = LoanDirectoryProjection<Arc<InMemoryReadModelStore<LoanId, LoanRecord>>>;

/// Loan as listed to managers and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanRecord {
    pub loan_id: LoanId,
    pub tenant_id: TenantId,
    pub item: ItemRef,
    pub quantity: u32,
    pub borrower: Borrower,
    pub status: LoanStatus,
    pub requested_at: DateTime<Utc>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub expected_return_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub deposit: Option<Deposit>,
    pub is_signed: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub fault: Option<FaultReport>,
    pub evidence: Option<Evidence>,
    pub decision_note: Option<String>,
    pub decided_by: Option<String>,
    /// Set while the latest return submission stands rejected.
    pub return_rejected: bool,
    /// Stream revision this record reflects.
    pub version: u64,
}

impl LoanRecord {
    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            item: self.item,
            quantity: self.quantity,
            borrower: self.borrower.clone(),
            expected_return_date: self.expected_return_date,
            deposit: self.deposit.clone(),
        }
    }

    fn opened(
        tenant_id: TenantId,
        loan_id: LoanId,
        terms: LoanTerms,
        status: LoanStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            loan_id,
            tenant_id,
            item: terms.item,
            quantity: terms.quantity,
            borrower: terms.borrower,
            status,
            requested_at: at,
            borrow_date: (status == LoanStatus::Borrowed).then_some(at),
            expected_return_date: terms.expected_return_date,
            return_date: None,
            deposit: terms.deposit,
            is_signed: false,
            signed_at: None,
            fault: None,
            evidence: None,
            decision_note: None,
            decided_by: None,
            return_rejected: false,
            version: 0,
        }
    }

    /// Holds stock out of the ledger right now.
    pub fn holds_reservation(&self) -> bool {
        self.status.holds_reservation()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoanProjectionError {
    #[error("failed to deserialize loan event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error("event for unknown loan {0}")]
    UnknownLoan(LoanId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// The loan directory: one [`LoanRecord`] per live loan.
///
/// Applied inline by the lending service right after each append, so reads
/// observe a transition as soon as it commits. Deleted loans leave the
/// listings but keep their owner, so their ids are never handed to another
/// tenant.
#[derive(Debug)]
pub struct LoanDirectoryProjection<S>
where
    S: ReadModelStore<LoanId, LoanRecord>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    owners: RwLock<HashMap<LoanId, TenantId>>,
}

impl<S> LoanDirectoryProjection<S>
where
    S: ReadModelStore<LoanId, LoanRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, loan_id: &LoanId) -> Option<LoanRecord> {
        self.store.get(tenant_id, loan_id)
    }

    /// Which tenant owns a loan id.
    pub fn locate(&self, loan_id: LoanId) -> Option<TenantId> {
        self.owners.read().ok()?.get(&loan_id).copied()
    }

    /// Loans of a tenant, oldest first, optionally filtered by status.
    pub fn list(&self, tenant_id: TenantId, status: Option<LoanStatus>) -> Vec<LoanRecord> {
        let mut loans: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| status.is_none_or(|s| l.status == s))
            .collect();
        loans.sort_by_key(|l| (l.requested_at, l.loan_id));
        loans
    }

    /// Loans currently holding stock, grouped by item.
    pub fn reservations_by_item(&self, tenant_id: TenantId) -> HashMap<ItemId, Vec<LoanRecord>> {
        let mut by_item: HashMap<ItemId, Vec<LoanRecord>> = HashMap::new();
        for loan in self.list(tenant_id, None) {
            if loan.holds_reservation() {
                by_item.entry(loan.item.item_id).or_default().push(loan);
            }
        }
        by_item
    }

    pub fn apply_stored(&self, stored: &StoredEvent) -> Result<(), LoanProjectionError> {
        self.apply_envelope(&stored.to_envelope())
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), LoanProjectionError> {
        if envelope.aggregate_type() != LOAN_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(LoanProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery.
            return Ok(());
        }
        if seq != last + 1 {
            return Err(LoanProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: LoanEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| LoanProjectionError::Deserialize(e.to_string()))?;

        if ev.tenant_id() != tenant_id {
            return Err(LoanProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        let loan_id = ev.loan_id();
        if loan_id.0 != aggregate_id {
            return Err(LoanProjectionError::TenantIsolation(
                "event loan_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            LoanEvent::LoanRequested(e) => {
                let record = LoanRecord::opened(
                    tenant_id,
                    loan_id,
                    e.terms,
                    LoanStatus::Pending,
                    e.occurred_at,
                );
                self.insert(tenant_id, record, seq);
            }
            LoanEvent::LoanBorrowed(e) => {
                let mut record = LoanRecord::opened(
                    tenant_id,
                    loan_id,
                    e.terms,
                    LoanStatus::Borrowed,
                    e.occurred_at,
                );
                record.decided_by = e.decided_by;
                self.insert(tenant_id, record, seq);
            }
            LoanEvent::LoanDeleted(_) => {
                self.store.remove(tenant_id, &loan_id);
            }
            other => {
                let mut record = self
                    .store
                    .get(tenant_id, &loan_id)
                    .ok_or(LoanProjectionError::UnknownLoan(loan_id))?;
                evolve(&mut record, other);
                record.version = seq;
                self.store.upsert(tenant_id, loan_id, record);
            }
        }

        self.set_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Drop a tenant's directory and replay its history.
    pub fn rebuild(
        &self,
        tenant_id: TenantId,
        history: &[StoredEvent],
    ) -> Result<(), LoanProjectionError> {
        self.store.clear_tenant(tenant_id);
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
        if let Ok(mut owners) = self.owners.write() {
            owners.retain(|_, t| *t != tenant_id);
        }

        let mut ordered: Vec<_> = history.iter().filter(|e| e.tenant_id == tenant_id).collect();
        ordered.sort_by_key(|e| (e.aggregate_id, e.sequence_number));
        for stored in ordered {
            self.apply_stored(stored)?;
        }
        Ok(())
    }

    fn insert(&self, tenant_id: TenantId, mut record: LoanRecord, seq: u64) {
        let loan_id = record.loan_id;
        record.version = seq;
        self.store.upsert(tenant_id, loan_id, record);
        if let Ok(mut owners) = self.owners.write() {
            owners.insert(loan_id, tenant_id);
        }
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .copied()
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn set_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }
}

fn evolve(record: &mut LoanRecord, event: LoanEvent) {
    match event {
        LoanEvent::LoanApproved(e) => {
            record.status = LoanStatus::Borrowed;
            record.borrow_date = Some(e.occurred_at);
            record.decided_by = e.decided_by;
        }
        LoanEvent::LoanRejected(e) => {
            record.status = LoanStatus::Rejected;
            record.decided_by = e.decided_by;
            record.decision_note = e.reason;
        }
        LoanEvent::LoanReturned(e) => {
            record.status = LoanStatus::Returned;
            record.return_date = Some(e.occurred_at);
            record.fault = e.fault;
            record.evidence = e.evidence;
            record.decided_by = e.decided_by;
        }
        LoanEvent::ReturnSubmitted(e) => {
            record.status = LoanStatus::PendingApproval;
            record.return_date = Some(e.occurred_at);
            record.fault = e.fault;
            record.evidence = e.evidence;
            record.return_rejected = false;
        }
        LoanEvent::ReturnApproved(e) => {
            record.status = LoanStatus::Returned;
            record.decided_by = e.decided_by;
        }
        LoanEvent::ReturnRejected(e) => {
            record.status = LoanStatus::Borrowed;
            record.return_date = None;
            record.fault = None;
            record.evidence = None;
            record.decided_by = e.decided_by;
            record.decision_note = e.reason;
            record.return_rejected = true;
        }
        LoanEvent::LoanSigned(e) => {
            record.is_signed = true;
            record.signed_at = Some(e.occurred_at);
        }
        LoanEvent::LoanRequested(_) | LoanEvent::LoanBorrowed(_) | LoanEvent::LoanDeleted(_) => {}
    }
}
