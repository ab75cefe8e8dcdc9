//! Loans domain module (event-sourced).
//!
//! The lending state machine as pure, deterministic domain logic: commands
//! are decided against a [`Loan`], producing [`LoanEvent`]s. Inventory side
//! effects are described by [`LedgerEffect`] and carried out by the caller.

pub mod effect;
pub mod loan;

pub use effect::LedgerEffect;
pub use loan::{
    ApproveLoan, ApproveReturn, Borrower, BorrowLoan, DeleteLoan, Deposit, Evidence, FaultReport,
    ItemRef, Loan, LoanApproved, LoanBorrowed, LoanCommand, LoanDeleted, LoanEvent, LoanId,
    LoanRejected, LoanRequested, LoanReturned, LoanSigned, LoanStatus, LoanTerms, RejectLoan,
    RejectReturn, RequestLoan, ReturnApproved, ReturnLoan, ReturnRejected, ReturnSubmitted,
    SignLoan, SubmitReturn,
};
