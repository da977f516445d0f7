//! Read models folded from the published event streams.
//!
//! Each projection keeps per-stream cursors so duplicate delivery is a
//! no-op, partitions everything by tenant, and can be thrown away and
//! rebuilt from the streams at any time. Queries go to these rows; the
//! aggregates stay the only place decisions are made.

pub mod adjustment_ledger;
pub mod count_board;
pub mod part_catalog;

pub use adjustment_ledger::{AdjustmentLedgerError, AdjustmentLedgerProjection, AdjustmentRow};
pub use count_board::{CountBoardError, CountBoardProjection, CountBoardRow};
pub use part_catalog::{PartCatalogError, PartCatalogProjection, PartCatalogRow};
