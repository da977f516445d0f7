//! Aggregate contracts for the event-sourced domain crates.

/// Identity and stream position of an aggregate.
pub trait AggregateRoot {
    /// Newtype id of the aggregate.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied to reach the current state.
    ///
    /// The dispatcher pins appends to this value, so the counting must stay
    /// exact (+1 per applied event).
    fn version(&self) -> u64;
}

/// Pure decide/evolve split for an event-sourced aggregate.
///
/// `handle` looks at the current state and a command and decides events
/// without mutating anything; `apply` folds one event into state.
/// Rehydration replays `apply` over the stored stream, so both must stay
/// deterministic and free of IO. A command that changes nothing decides an
/// empty batch, which is how idempotent retries (a duplicate count
/// adjustment) stay silent.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Fold one event into the in-memory state.
    fn apply(&mut self, event: &Self::Event);

    /// Decide the events a command produces against the current state.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// What a writer expects the stream head to be at append time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No expectation; append wherever the stream currently sits.
    Any,
    /// The stream must sit exactly at this version or the append is refused.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == actual,
        }
    }
}
