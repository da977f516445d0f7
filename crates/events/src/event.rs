use chrono::{DateTime, Utc};

/// Contract every domain event satisfies.
///
/// An event is a fact: it happened, it never changes, and it carries the
/// business time at which it happened. `event_type` is the stable wire name
/// (`"parts.part.stock_received"`) used to label stored payloads; `version`
/// is the schema revision of the payload, bumped when its shape changes so
/// old streams stay readable.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable wire name of this event.
    fn event_type(&self) -> &'static str;

    /// Schema revision of the payload shape.
    fn version(&self) -> u32;

    /// Business time at which the fact occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}
