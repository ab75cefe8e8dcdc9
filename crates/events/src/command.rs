use stationlend_core::AggregateId;

/// A command targets a specific aggregate stream.
///
/// Commands are caller intent ("approve this loan"); events are the facts that
/// result ("LoanApproved"). A command that cannot be accepted is rejected with
/// an error and produces no events.
///
/// The tenant is not part of this contract: the dispatcher receives it from
/// the request context and stamps it onto every envelope.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;

    /// Short intent name used in logs and error messages (e.g. "approve").
    fn intent(&self) -> &'static str;
}
