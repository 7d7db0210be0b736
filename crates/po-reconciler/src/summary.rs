//! Per-run reconciler summary (spec.md §4.8: "logs a per-run summary"),
//! grounded on the teacher's structured bench/run report style
//! (`everruns_durable::bench::report`).

use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct ReconcilerSummary {
    pub auto_fixed: u32,
    pub requeued: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl ReconcilerSummary {
    pub fn log(&self) {
        tracing::info!(
            auto_fixed = self.auto_fixed,
            requeued = self.requeued,
            skipped = self.skipped,
            failed = self.failed,
            "reconciler sweep complete"
        );
    }
}
