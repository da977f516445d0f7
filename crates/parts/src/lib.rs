//! Parts domain module (event-sourced).
//!
//! This crate contains business rules for fleet parts held in stock,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Quantity on hand only ever moves by signed deltas; count
//! adjustments are applied exactly once per cycle count.

pub mod part;

pub use part::{
    AbcClass, AdjustmentId, ApplyCountAdjustment, ConsumeStock, CountAdjustmentApplied,
    CreatePart, DeactivatePart, Part, PartCommand, PartCreated, PartDeactivated, PartEvent,
    PartId, PartReclassified, Reclassify, ReceiveStock, SetUnitCost, StockConsumed,
    StockReceived, UnitCostChanged,
};
