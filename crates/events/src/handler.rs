/// Execute an aggregate command in place (decide, then apply).
///
/// No persistence and no publication: the infra `TransitionDispatcher` is the
/// production path. This is what domain tests use to walk a loan through its
/// lifecycle.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stationlend_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
