//! ABC classification.
//!
//! Pareto split of the active parts by usage value (`unit_cost ×
//! usage_quantity`): the parts carrying the top share of total value count
//! most often. The math runs over the part-catalog read model; only parts
//! whose class actually changes get a `Reclassify` command.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use fleetforge_core::TenantId;
use fleetforge_infra::projections::PartCatalogRow;
use fleetforge_parts::{AbcClass, PartCommand, PartId, Reclassify};

use crate::config::AbcThresholds;
use crate::report::{ClassificationRun, RunFailure};
use crate::services::EngineServices;

/// One part's classification verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Verdict {
    part_id: PartId,
    current: Option<AbcClass>,
    target: AbcClass,
    flagged: bool,
}

/// Pure classification over catalog rows. Deterministic: identical inputs
/// produce identical verdicts regardless of input order.
fn classify_rows(rows: &[PartCatalogRow], thresholds: AbcThresholds) -> Vec<Verdict> {
    let mut valued: Vec<(i128, &PartCatalogRow, bool)> = rows
        .iter()
        .filter(|r| r.active)
        .map(|r| {
            // Invalid records (negative cost or usage) never abort the run:
            // they rank as value 0 and land in C, reported as flagged.
            let flagged = r.unit_cost_cents < 0 || r.usage_quantity < 0;
            let value = if flagged {
                0
            } else {
                i128::from(r.unit_cost_cents) * i128::from(r.usage_quantity)
            };
            (value, r, flagged)
        })
        .collect();

    // Value descending, ties by part number ascending.
    valued.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.part_number.cmp(&b.1.part_number)));

    let total: i128 = valued.iter().map(|(value, _, _)| *value).sum();

    let mut cumulative = 0i128;
    let mut verdicts = Vec::with_capacity(valued.len());
    for (value, row, flagged) in valued {
        let target = if value == 0 {
            // Zero-value parts sit in C, including the all-zero-total case.
            AbcClass::C
        } else {
            cumulative += value;
            // Integer cumulative-share comparison, inclusive at the cutoff:
            // cumulative/total ≤ cutoff/100 without division.
            if cumulative * 100 <= i128::from(thresholds.a_cutoff_pct) * total {
                AbcClass::A
            } else if cumulative * 100 <= i128::from(thresholds.b_cutoff_pct) * total {
                AbcClass::B
            } else {
                AbcClass::C
            }
        };
        verdicts.push(Verdict {
            part_id: row.part_id,
            current: row.abc_class,
            target,
            flagged,
        });
    }
    verdicts
}

/// Recomputes `abc_class` for every active part of a tenant.
#[derive(Clone)]
pub struct AbcClassifier {
    services: Arc<EngineServices>,
}

impl AbcClassifier {
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }

    /// Run one classification pass.
    ///
    /// Idempotent: unchanged inputs produce zero dispatches. Per-part
    /// dispatch failures are collected in the report, never aborting the
    /// rest of the run.
    pub fn recalculate(&self, tenant_id: TenantId, as_of: DateTime<Utc>) -> ClassificationRun {
        let rows = self.services.catalog.list(tenant_id);
        let verdicts = classify_rows(&rows, self.services.config.thresholds);

        let mut run = ClassificationRun {
            total: verdicts.len(),
            ..ClassificationRun::default()
        };

        for verdict in &verdicts {
            if verdict.flagged {
                run.flagged.push(verdict.part_id);
            }
            if verdict.current == Some(verdict.target) {
                continue;
            }

            let command = PartCommand::Reclassify(Reclassify {
                tenant_id,
                part_id: verdict.part_id,
                class: verdict.target,
                occurred_at: as_of,
            });
            match self.services.dispatch_part(tenant_id, verdict.part_id, command) {
                // An empty decide means the catalog row lagged behind the
                // stream and the aggregate already holds the target class.
                Ok(events) if events.is_empty() => {}
                Ok(_) => run.updated += 1,
                Err(e) => run.failures.push(RunFailure {
                    part_id: verdict.part_id,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            total = run.total,
            updated = run.updated,
            flagged = run.flagged.len(),
            failures = run.failures.len(),
            "abc classification run finished"
        );
        run
    }
}
