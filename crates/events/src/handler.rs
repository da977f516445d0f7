/// Run one command against an aggregate, no IO and nothing async.
///
/// Decide-then-evolve in one step: calls `handle` for the events, then
/// `apply`s each one to the aggregate in place. This is the canonical
/// lifecycle without persistence or publication, which makes it the right
/// tool for unit tests and inline state evolution.
///
/// For the full pipeline (append with optimistic concurrency, publish to the
/// bus) use the command dispatcher in the infra crate instead.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: fleetforge_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
