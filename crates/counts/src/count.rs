use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fleetforge_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, TenantId, ValueObject,
};
use fleetforge_events::Event;
use fleetforge_parts::{AdjustmentId, PartId};

/// Cycle count identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleCountId(pub AggregateId);

impl CycleCountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CycleCountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Human-readable count sheet number, e.g. `CC-000042`.
///
/// Allocated per tenant as a monotonic sequence by the scheduler; uniqueness
/// per tenant is the guarantee, gaps are acceptable. Deserialization runs
/// through `parse`, so a payload cannot smuggle in a tail the sequence
/// arithmetic cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountNumber(String);

impl CountNumber {
    pub const PREFIX: &'static str = "CC-";

    /// Format a sequence value, zero-padded to at least six digits.
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("{}{sequence:06}", Self::PREFIX))
    }

    /// Parse a raw string, enforcing the `CC-` prefix and a numeric tail
    /// that fits a `u64`, so `sequence` always reads back the allocated
    /// value.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let digits = raw
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| DomainError::validation("count number must start with CC-"))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(
                "count number must be CC- followed by digits",
            ));
        }
        if digits.parse::<u64>().is_err() {
            return Err(DomainError::validation(
                "count number sequence is out of range",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric tail, used to seed the next allocation.
    pub fn sequence(&self) -> u64 {
        self.0[Self::PREFIX.len()..].parse().unwrap_or(0)
    }
}

impl ValueObject for CountNumber {}

impl TryFrom<String> for CountNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountNumber> for String {
    fn from(value: CountNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for CountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cycle count status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl CountStatus {
    /// Open counts block the scheduler from creating another count for the
    /// same part.
    pub fn is_open(self) -> bool {
        matches!(self, CountStatus::Scheduled | CountStatus::InProgress)
    }
}

/// Aggregate root: CycleCount.
///
/// `expected_quantity` is the stock snapshot taken when the count was
/// scheduled; `variance = actual - expected` is computed exactly once, when
/// the count is recorded, and never recomputed. `is_reconciled` is an
/// orthogonal one-way flag settable only from `Completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCount {
    id: CycleCountId,
    tenant_id: Option<TenantId>,
    part_id: Option<PartId>,
    count_number: Option<CountNumber>,
    scheduled_for: Option<NaiveDate>,
    status: CountStatus,
    expected_quantity: i64,
    actual_quantity: Option<i64>,
    variance: Option<i64>,
    notes: Option<String>,
    is_reconciled: bool,
    adjustment_id: Option<AdjustmentId>,
    completed_at: Option<DateTime<Utc>>,
    reconciled_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl CycleCount {
    /// Blank instance to replay a stream into.
    pub fn empty(id: CycleCountId) -> Self {
        Self {
            id,
            tenant_id: None,
            part_id: None,
            count_number: None,
            scheduled_for: None,
            status: CountStatus::Scheduled,
            expected_quantity: 0,
            actual_quantity: None,
            variance: None,
            notes: None,
            is_reconciled: false,
            adjustment_id: None,
            completed_at: None,
            reconciled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CycleCountId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn part_id(&self) -> Option<PartId> {
        self.part_id
    }

    pub fn count_number(&self) -> Option<&CountNumber> {
        self.count_number.as_ref()
    }

    pub fn scheduled_for(&self) -> Option<NaiveDate> {
        self.scheduled_for
    }

    pub fn status(&self) -> CountStatus {
        self.status
    }

    pub fn expected_quantity(&self) -> i64 {
        self.expected_quantity
    }

    pub fn actual_quantity(&self) -> Option<i64> {
        self.actual_quantity
    }

    pub fn variance(&self) -> Option<i64> {
        self.variance
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_reconciled(&self) -> bool {
        self.is_reconciled
    }

    pub fn adjustment_id(&self) -> Option<AdjustmentId> {
        self.adjustment_id
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn reconciled_at(&self) -> Option<DateTime<Utc>> {
        self.reconciled_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for CycleCount {
    type Id = CycleCountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ScheduleCount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCount {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub part_id: PartId,
    pub count_number: CountNumber,
    pub scheduled_for: NaiveDate,
    pub expected_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartCount (optional step before recording).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCount {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCount (the physical count result).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub actual_quantity: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelCount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCount {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReconciled (issued by reconciliation after the stock
/// adjustment has been applied to the part).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReconciled {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub adjustment_id: AdjustmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleCountCommand {
    ScheduleCount(ScheduleCount),
    StartCount(StartCount),
    RecordCount(RecordCount),
    CancelCount(CancelCount),
    MarkReconciled(MarkReconciled),
}

/// Event: CountScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountScheduled {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub part_id: PartId,
    pub count_number: CountNumber,
    pub scheduled_for: NaiveDate,
    pub expected_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountStarted {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountRecorded.
///
/// Carries the variance computed against the scheduling-time snapshot. This
/// event deliberately has no effect on the part's stock; reconciliation is a
/// separate step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecorded {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub actual_quantity: i64,
    pub variance: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCancelled {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountReconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountReconciled {
    pub tenant_id: TenantId,
    pub count_id: CycleCountId,
    pub adjustment_id: AdjustmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleCountEvent {
    CountScheduled(CountScheduled),
    CountStarted(CountStarted),
    CountRecorded(CountRecorded),
    CountCancelled(CountCancelled),
    CountReconciled(CountReconciled),
}

impl Event for CycleCountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CycleCountEvent::CountScheduled(_) => "counts.count.scheduled",
            CycleCountEvent::CountStarted(_) => "counts.count.started",
            CycleCountEvent::CountRecorded(_) => "counts.count.recorded",
            CycleCountEvent::CountCancelled(_) => "counts.count.cancelled",
            CycleCountEvent::CountReconciled(_) => "counts.count.reconciled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CycleCountEvent::CountScheduled(e) => e.occurred_at,
            CycleCountEvent::CountStarted(e) => e.occurred_at,
            CycleCountEvent::CountRecorded(e) => e.occurred_at,
            CycleCountEvent::CountCancelled(e) => e.occurred_at,
            CycleCountEvent::CountReconciled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CycleCount {
    type Command = CycleCountCommand;
    type Event = CycleCountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CycleCountEvent::CountScheduled(e) => {
                self.id = e.count_id;
                self.tenant_id = Some(e.tenant_id);
                self.part_id = Some(e.part_id);
                self.count_number = Some(e.count_number.clone());
                self.scheduled_for = Some(e.scheduled_for);
                self.status = CountStatus::Scheduled;
                self.expected_quantity = e.expected_quantity;
                self.created = true;
            }
            CycleCountEvent::CountStarted(_) => {
                self.status = CountStatus::InProgress;
            }
            CycleCountEvent::CountRecorded(e) => {
                self.status = CountStatus::Completed;
                self.actual_quantity = Some(e.actual_quantity);
                self.variance = Some(e.variance);
                self.notes = e.notes.clone();
                self.completed_at = Some(e.occurred_at);
            }
            CycleCountEvent::CountCancelled(e) => {
                self.status = CountStatus::Cancelled;
                self.notes = e.reason.clone().or_else(|| self.notes.clone());
            }
            CycleCountEvent::CountReconciled(e) => {
                self.is_reconciled = true;
                self.adjustment_id = Some(e.adjustment_id);
                self.reconciled_at = Some(e.occurred_at);
            }
        }

        // One version step per applied event, no exceptions.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CycleCountCommand::ScheduleCount(cmd) => self.handle_schedule(cmd),
            CycleCountCommand::StartCount(cmd) => self.handle_start(cmd),
            CycleCountCommand::RecordCount(cmd) => self.handle_record(cmd),
            CycleCountCommand::CancelCount(cmd) => self.handle_cancel(cmd),
            CycleCountCommand::MarkReconciled(cmd) => self.handle_mark_reconciled(cmd),
        }
    }
}

impl CycleCount {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::validation("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_count_id(&self, count_id: CycleCountId) -> Result<(), DomainError> {
        if self.id != count_id {
            return Err(DomainError::validation("count_id mismatch"));
        }
        Ok(())
    }

    fn handle_schedule(&self, cmd: &ScheduleCount) -> Result<Vec<CycleCountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("cycle count already exists"));
        }
        if cmd.expected_quantity < 0 {
            return Err(DomainError::validation(
                "expected quantity cannot be negative",
            ));
        }

        Ok(vec![CycleCountEvent::CountScheduled(CountScheduled {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            part_id: cmd.part_id,
            count_number: cmd.count_number.clone(),
            scheduled_for: cmd.scheduled_for,
            expected_quantity: cmd.expected_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartCount) -> Result<Vec<CycleCountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;

        if self.status != CountStatus::Scheduled {
            return Err(DomainError::invalid_state(
                "only scheduled counts can be started",
            ));
        }

        Ok(vec![CycleCountEvent::CountStarted(CountStarted {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordCount) -> Result<Vec<CycleCountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;

        match self.status {
            CountStatus::Scheduled | CountStatus::InProgress => {}
            CountStatus::Completed => {
                return Err(DomainError::invalid_state("count is already completed"));
            }
            CountStatus::Cancelled => {
                return Err(DomainError::invalid_state("count is cancelled"));
            }
        }

        if cmd.actual_quantity < 0 {
            return Err(DomainError::validation(
                "actual quantity cannot be negative",
            ));
        }

        // The one place the variance is computed. It measures drift against
        // the scheduling-time snapshot and is immutable afterwards.
        let variance = cmd.actual_quantity - self.expected_quantity;

        Ok(vec![CycleCountEvent::CountRecorded(CountRecorded {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            actual_quantity: cmd.actual_quantity,
            variance,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelCount) -> Result<Vec<CycleCountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;

        match self.status {
            CountStatus::Scheduled | CountStatus::InProgress => {}
            CountStatus::Completed => {
                return Err(DomainError::invalid_state(
                    "completed counts cannot be cancelled",
                ));
            }
            CountStatus::Cancelled => {
                return Err(DomainError::invalid_state("count is already cancelled"));
            }
        }

        Ok(vec![CycleCountEvent::CountCancelled(CountCancelled {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_reconciled(
        &self,
        cmd: &MarkReconciled,
    ) -> Result<Vec<CycleCountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;

        if self.status != CountStatus::Completed {
            return Err(DomainError::invalid_state(
                "only completed counts can be reconciled",
            ));
        }
        if self.is_reconciled {
            return Err(DomainError::AlreadyReconciled);
        }

        Ok(vec![CycleCountEvent::CountReconciled(CountReconciled {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            adjustment_id: cmd.adjustment_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
