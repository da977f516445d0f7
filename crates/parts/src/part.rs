use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleetforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use fleetforge_events::Event;

/// Part identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(pub AggregateId);

impl PartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of one inventory adjustment transaction (the audit row a
/// reconciled count leaves behind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(pub Uuid);

impl AdjustmentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AdjustmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// ABC classification band.
///
/// `A` parts carry the most annual usage value and are counted most often;
/// `C` parts the least. Assigned by the classifier, stored on the part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbcClass {
    A,
    B,
    C,
}

/// Aggregate root: Part.
///
/// Stock rules:
/// - `quantity_on_hand` moves only by signed deltas and never goes negative.
/// - `usage_quantity` is a rolling tally of consumed units; the ABC
///   classifier reads it as the demand signal.
/// - A count adjustment is applied at most once per cycle count; the
///   aggregate remembers which counts it has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    id: PartId,
    tenant_id: Option<TenantId>,
    part_number: String,
    name: String,
    quantity_on_hand: i64,
    unit_cost_cents: i64,
    usage_quantity: i64,
    abc_class: Option<AbcClass>,
    active: bool,
    created_at: Option<DateTime<Utc>>,
    applied_counts: Vec<AggregateId>,
    version: u64,
    created: bool,
}

impl Part {
    /// Pre-creation shell that rehydration folds events into.
    pub fn empty(id: PartId) -> Self {
        Self {
            id,
            tenant_id: None,
            part_number: String::new(),
            name: String::new(),
            quantity_on_hand: 0,
            unit_cost_cents: 0,
            usage_quantity: 0,
            abc_class: None,
            active: false,
            created_at: None,
            applied_counts: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn part_number(&self) -> &str {
        &self.part_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn unit_cost_cents(&self) -> i64 {
        self.unit_cost_cents
    }

    pub fn usage_quantity(&self) -> i64 {
        self.usage_quantity
    }

    pub fn abc_class(&self) -> Option<AbcClass> {
        self.abc_class
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Whether the adjustment for the given cycle count has been applied.
    pub fn has_applied_count(&self, count_id: AggregateId) -> bool {
        self.applied_counts.contains(&count_id)
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Part {
    type Id = PartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePart {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub part_number: String,
    pub name: String,
    pub initial_quantity: i64,
    pub unit_cost_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (goods arriving from purchasing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeStock (issued to a work order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeStock {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetUnitCost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUnitCost {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub unit_cost_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reclassify (issued by the ABC classifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reclassify {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub class: AbcClass,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyCountAdjustment (issued by reconciliation).
///
/// `count_id` is the cycle count stream whose variance this settles; it is
/// the idempotency key. `delta` may be zero for a variance-free count, which
/// still leaves an audit row behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCountAdjustment {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub count_id: AggregateId,
    pub adjustment_id: AdjustmentId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivatePart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivatePart {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartCommand {
    CreatePart(CreatePart),
    ReceiveStock(ReceiveStock),
    ConsumeStock(ConsumeStock),
    SetUnitCost(SetUnitCost),
    Reclassify(Reclassify),
    ApplyCountAdjustment(ApplyCountAdjustment),
    DeactivatePart(DeactivatePart),
}

/// Event: PartCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCreated {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub part_number: String,
    pub name: String,
    pub initial_quantity: i64,
    pub unit_cost_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockConsumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConsumed {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitCostChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCostChanged {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub unit_cost_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartReclassified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReclassified {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub class: AbcClass,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountAdjustmentApplied.
///
/// The audit row materialized by the adjustment ledger. `quantity_after` is
/// carried for consumers; the aggregate itself evolves by `delta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAdjustmentApplied {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub count_id: AggregateId,
    pub adjustment_id: AdjustmentId,
    pub delta: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDeactivated {
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartEvent {
    PartCreated(PartCreated),
    StockReceived(StockReceived),
    StockConsumed(StockConsumed),
    UnitCostChanged(UnitCostChanged),
    PartReclassified(PartReclassified),
    CountAdjustmentApplied(CountAdjustmentApplied),
    PartDeactivated(PartDeactivated),
}

impl Event for PartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartEvent::PartCreated(_) => "parts.part.created",
            PartEvent::StockReceived(_) => "parts.part.stock_received",
            PartEvent::StockConsumed(_) => "parts.part.stock_consumed",
            PartEvent::UnitCostChanged(_) => "parts.part.unit_cost_changed",
            PartEvent::PartReclassified(_) => "parts.part.reclassified",
            PartEvent::CountAdjustmentApplied(_) => "parts.part.count_adjustment_applied",
            PartEvent::PartDeactivated(_) => "parts.part.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartEvent::PartCreated(e) => e.occurred_at,
            PartEvent::StockReceived(e) => e.occurred_at,
            PartEvent::StockConsumed(e) => e.occurred_at,
            PartEvent::UnitCostChanged(e) => e.occurred_at,
            PartEvent::PartReclassified(e) => e.occurred_at,
            PartEvent::CountAdjustmentApplied(e) => e.occurred_at,
            PartEvent::PartDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Part {
    type Command = PartCommand;
    type Event = PartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartEvent::PartCreated(e) => {
                self.id = e.part_id;
                self.tenant_id = Some(e.tenant_id);
                self.part_number = e.part_number.clone();
                self.name = e.name.clone();
                self.quantity_on_hand = e.initial_quantity;
                self.unit_cost_cents = e.unit_cost_cents;
                self.usage_quantity = 0;
                self.abc_class = None;
                self.active = true;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PartEvent::StockReceived(e) => {
                self.quantity_on_hand += e.quantity;
            }
            PartEvent::StockConsumed(e) => {
                self.quantity_on_hand -= e.quantity;
                self.usage_quantity += e.quantity;
            }
            PartEvent::UnitCostChanged(e) => {
                self.unit_cost_cents = e.unit_cost_cents;
            }
            PartEvent::PartReclassified(e) => {
                self.abc_class = Some(e.class);
            }
            PartEvent::CountAdjustmentApplied(e) => {
                // Delta, never an overwrite: interleaved receipts/consumption
                // since the count keep their effect.
                self.quantity_on_hand += e.delta;
                self.applied_counts.push(e.count_id);
            }
            PartEvent::PartDeactivated(_) => {
                self.active = false;
            }
        }

        // Replaying N events must land on version N.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartCommand::CreatePart(cmd) => self.handle_create(cmd),
            PartCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            PartCommand::ConsumeStock(cmd) => self.handle_consume(cmd),
            PartCommand::SetUnitCost(cmd) => self.handle_set_unit_cost(cmd),
            PartCommand::Reclassify(cmd) => self.handle_reclassify(cmd),
            PartCommand::ApplyCountAdjustment(cmd) => self.handle_count_adjustment(cmd),
            PartCommand::DeactivatePart(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl Part {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::validation("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_part_id(&self, part_id: PartId) -> Result<(), DomainError> {
        if self.id != part_id {
            return Err(DomainError::validation("part_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.active {
            return Err(DomainError::invalid_state("part is inactive"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePart) -> Result<Vec<PartEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("part already exists"));
        }
        if cmd.part_number.trim().is_empty() {
            return Err(DomainError::validation("part number cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("part name is required"));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial quantity cannot be negative"));
        }
        if cmd.unit_cost_cents < 0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        Ok(vec![PartEvent::PartCreated(PartCreated {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            part_number: cmd.part_number.clone(),
            name: cmd.name.clone(),
            initial_quantity: cmd.initial_quantity,
            unit_cost_cents: cmd.unit_cost_cents,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;
        self.ensure_active()?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("receipt quantity must be greater than zero"));
        }

        Ok(vec![PartEvent::StockReceived(StockReceived {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeStock) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;
        self.ensure_active()?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("consumption quantity must be greater than zero"));
        }
        if self.quantity_on_hand - cmd.quantity < 0 {
            return Err(DomainError::validation("quantity on hand cannot go negative"));
        }

        Ok(vec![PartEvent::StockConsumed(StockConsumed {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_unit_cost(&self, cmd: &SetUnitCost) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;

        if cmd.unit_cost_cents < 0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        if cmd.unit_cost_cents == self.unit_cost_cents {
            return Ok(vec![]);
        }

        Ok(vec![PartEvent::UnitCostChanged(UnitCostChanged {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            unit_cost_cents: cmd.unit_cost_cents,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reclassify(&self, cmd: &Reclassify) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;

        // Unchanged class decides nothing, which keeps classification runs
        // idempotent: re-running with the same inputs appends no events.
        if self.abc_class == Some(cmd.class) {
            return Ok(vec![]);
        }

        Ok(vec![PartEvent::PartReclassified(PartReclassified {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            class: cmd.class,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_count_adjustment(
        &self,
        cmd: &ApplyCountAdjustment,
    ) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;
        self.ensure_active()?;

        // Exactly-once per count: a duplicate decides nothing, so a retried
        // reconciliation cannot double-apply the variance.
        if self.applied_counts.contains(&cmd.count_id) {
            return Ok(vec![]);
        }

        let quantity_after = self.quantity_on_hand + cmd.delta;
        if quantity_after < 0 {
            return Err(DomainError::validation("quantity on hand cannot go negative"));
        }

        Ok(vec![PartEvent::CountAdjustmentApplied(CountAdjustmentApplied {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            count_id: cmd.count_id,
            adjustment_id: cmd.adjustment_id,
            delta: cmd.delta,
            quantity_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivatePart) -> Result<Vec<PartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_part_id(cmd.part_id)?;

        // Already inactive: nothing to decide.
        if !self.active {
            return Ok(vec![]);
        }

        Ok(vec![PartEvent::PartDeactivated(PartDeactivated {
            tenant_id: cmd.tenant_id,
            part_id: cmd.part_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetforge_core::AggregateId;
    use fleetforge_events::execute;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_part_id() -> PartId {
        PartId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_part(tenant_id: TenantId, part_id: PartId, initial_quantity: i64) -> Part {
        let mut part = Part::empty(part_id);
        let cmd = CreatePart {
            tenant_id,
            part_id,
            part_number: "FLT-1001".to_string(),
            name: "Oil filter".to_string(),
            initial_quantity,
            unit_cost_cents: 1250,
            occurred_at: test_time(),
        };
        execute(&mut part, &PartCommand::CreatePart(cmd)).unwrap();
        part
    }

    #[test]
    fn create_part_emits_part_created_event() {
        let part = Part::empty(test_part_id());
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();

        let cmd = CreatePart {
            tenant_id,
            part_id,
            part_number: "FLT-1001".to_string(),
            name: "Oil filter".to_string(),
            initial_quantity: 100,
            unit_cost_cents: 1250,
            occurred_at: test_time(),
        };

        let events = part.handle(&PartCommand::CreatePart(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            PartEvent::PartCreated(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.part_id, part_id);
                assert_eq!(e.part_number, "FLT-1001");
                assert_eq!(e.initial_quantity, 100);
            }
            _ => panic!("Expected PartCreated event"),
        }
    }

    #[test]
    fn create_rejects_blank_part_number() {
        let part = Part::empty(test_part_id());
        let cmd = CreatePart {
            tenant_id: test_tenant_id(),
            part_id: test_part_id(),
            part_number: "   ".to_string(),
            name: "Oil filter".to_string(),
            initial_quantity: 0,
            unit_cost_cents: 0,
            occurred_at: test_time(),
        };

        let err = part.handle(&PartCommand::CreatePart(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_negative_initial_quantity() {
        let part = Part::empty(test_part_id());
        let cmd = CreatePart {
            tenant_id: test_tenant_id(),
            part_id: test_part_id(),
            part_number: "FLT-1001".to_string(),
            name: "Oil filter".to_string(),
            initial_quantity: -1,
            unit_cost_cents: 0,
            occurred_at: test_time(),
        };

        let err = part.handle(&PartCommand::CreatePart(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn receive_and_consume_move_quantity_by_delta() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let mut part = created_part(tenant_id, part_id, 100);

        let receive = ReceiveStock {
            tenant_id,
            part_id,
            quantity: 25,
            occurred_at: test_time(),
        };
        execute(&mut part, &PartCommand::ReceiveStock(receive)).unwrap();
        assert_eq!(part.quantity_on_hand(), 125);

        let consume = ConsumeStock {
            tenant_id,
            part_id,
            quantity: 5,
            occurred_at: test_time(),
        };
        execute(&mut part, &PartCommand::ConsumeStock(consume)).unwrap();
        assert_eq!(part.quantity_on_hand(), 120);
        assert_eq!(part.usage_quantity(), 5);
    }

    #[test]
    fn consume_cannot_drive_quantity_negative() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let part = created_part(tenant_id, part_id, 3);

        let consume = ConsumeStock {
            tenant_id,
            part_id,
            quantity: 4,
            occurred_at: test_time(),
        };
        let err = part.handle(&PartCommand::ConsumeStock(consume)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reclassify_unchanged_class_decides_no_events() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let mut part = created_part(tenant_id, part_id, 10);

        let reclassify = Reclassify {
            tenant_id,
            part_id,
            class: AbcClass::A,
            occurred_at: test_time(),
        };
        let events = execute(&mut part, &PartCommand::Reclassify(reclassify.clone())).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(part.abc_class(), Some(AbcClass::A));
        let version_after_first = part.version();

        // Same class again: nothing decided, version untouched.
        let events = execute(&mut part, &PartCommand::Reclassify(reclassify)).unwrap();
        assert!(events.is_empty());
        assert_eq!(part.version(), version_after_first);
    }

    #[test]
    fn count_adjustment_applies_signed_delta() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let mut part = created_part(tenant_id, part_id, 110);

        let cmd = ApplyCountAdjustment {
            tenant_id,
            part_id,
            count_id: AggregateId::new(),
            adjustment_id: AdjustmentId::new(),
            delta: -3,
            occurred_at: test_time(),
        };
        let events = execute(&mut part, &PartCommand::ApplyCountAdjustment(cmd)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(part.quantity_on_hand(), 107);

        match &events[0] {
            PartEvent::CountAdjustmentApplied(e) => {
                assert_eq!(e.delta, -3);
                assert_eq!(e.quantity_after, 107);
            }
            _ => panic!("Expected CountAdjustmentApplied event"),
        }
    }

    #[test]
    fn count_adjustment_is_exactly_once_per_count() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let count_id = AggregateId::new();
        let mut part = created_part(tenant_id, part_id, 100);

        let cmd = ApplyCountAdjustment {
            tenant_id,
            part_id,
            count_id,
            adjustment_id: AdjustmentId::new(),
            delta: -3,
            occurred_at: test_time(),
        };
        execute(&mut part, &PartCommand::ApplyCountAdjustment(cmd.clone())).unwrap();
        assert_eq!(part.quantity_on_hand(), 97);
        assert!(part.has_applied_count(count_id));

        // Retry with the same count settles nothing further.
        let events = execute(&mut part, &PartCommand::ApplyCountAdjustment(cmd)).unwrap();
        assert!(events.is_empty());
        assert_eq!(part.quantity_on_hand(), 97);
    }

    #[test]
    fn count_adjustment_rejects_result_below_zero() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let part = created_part(tenant_id, part_id, 2);

        let cmd = ApplyCountAdjustment {
            tenant_id,
            part_id,
            count_id: AggregateId::new(),
            adjustment_id: AdjustmentId::new(),
            delta: -5,
            occurred_at: test_time(),
        };
        let err = part
            .handle(&PartCommand::ApplyCountAdjustment(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deactivated_part_rejects_stock_movements() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let mut part = created_part(tenant_id, part_id, 10);

        let deactivate = DeactivatePart {
            tenant_id,
            part_id,
            occurred_at: test_time(),
        };
        execute(&mut part, &PartCommand::DeactivatePart(deactivate)).unwrap();
        assert!(!part.is_active());

        let receive = ReceiveStock {
            tenant_id,
            part_id,
            quantity: 1,
            occurred_at: test_time(),
        };
        let err = part.handle(&PartCommand::ReceiveStock(receive)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn tenant_mismatch_is_rejected() {
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let part = created_part(tenant_id, part_id, 10);

        let receive = ReceiveStock {
            tenant_id: test_tenant_id(),
            part_id,
            quantity: 1,
            occurred_at: test_time(),
        };
        let err = part.handle(&PartCommand::ReceiveStock(receive)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: under any accepted sequence of receipts and consumption,
        /// quantity on hand stays non-negative and equals the running delta sum.
        #[test]
        fn stock_stays_non_negative_and_tracks_deltas(
            moves in prop::collection::vec((any::<bool>(), 1i64..500i64), 0..40)
        ) {
            let tenant_id = test_tenant_id();
            let part_id = test_part_id();
            let mut part = created_part(tenant_id, part_id, 1000);
            let mut expected = 1000i64;

            for (is_receive, quantity) in moves {
                let cmd = if is_receive {
                    PartCommand::ReceiveStock(ReceiveStock {
                        tenant_id,
                        part_id,
                        quantity,
                        occurred_at: test_time(),
                    })
                } else {
                    PartCommand::ConsumeStock(ConsumeStock {
                        tenant_id,
                        part_id,
                        quantity,
                        occurred_at: test_time(),
                    })
                };

                match execute(&mut part, &cmd) {
                    Ok(_) => {
                        expected += if is_receive { quantity } else { -quantity };
                    }
                    Err(DomainError::Validation(_)) => {
                        // Rejected moves leave state untouched.
                    }
                    Err(other) => panic!("unexpected error: {other:?}"),
                }

                prop_assert!(part.quantity_on_hand() >= 0);
                prop_assert_eq!(part.quantity_on_hand(), expected);
            }
        }

        /// Property: handle is deterministic for identical state and command.
        #[test]
        fn handle_is_deterministic(delta in -50i64..50i64) {
            let tenant_id = test_tenant_id();
            let part_id = test_part_id();
            let part = created_part(tenant_id, part_id, 100);
            let count_id = AggregateId::new();
            let adjustment_id = AdjustmentId::new();
            let at = test_time();

            let cmd = PartCommand::ApplyCountAdjustment(ApplyCountAdjustment {
                tenant_id,
                part_id,
                count_id,
                adjustment_id,
                delta,
                occurred_at: at,
            });

            let first = part.handle(&cmd);
            let second = part.handle(&cmd);
            prop_assert_eq!(first, second);
        }
    }
}
