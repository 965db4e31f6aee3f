//! Singleton polling workers: each cycle waits for readiness, takes the named lease and
//! runs at most one unit of work under the unit deadline.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    application::{
        error::{PipelineError, UnitOutcome},
        lease::{LeaseDecision, LeaseManager, ReadinessGate},
        pipeline::{context::PipelineContext, units, with_deadline},
    },
    domain::types::WorkerName,
    infra::telemetry::{METRIC_LEASE_SKIPS_TOTAL, METRIC_UNIT_MS, METRIC_UNITS_TOTAL},
};

const TICKS_PER_INTERVAL: u32 = 4;
const MIN_TICK: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum CycleOutcome {
    /// The lease was not acquired; the body did not run.
    Skipped(LeaseDecision),
    Ran(UnitOutcome),
    /// The body (or the lease bookkeeping) failed; logged and absorbed.
    Failed(PipelineError),
}

/// Run the unit of work owned by `worker` once, without any lease.
pub async fn run_unit(
    ctx: &PipelineContext,
    worker: WorkerName,
) -> Result<UnitOutcome, PipelineError> {
    match worker {
        WorkerName::RowIngest => units::ingest_next_row(ctx).await,
        WorkerName::InvoiceIntake => units::intake_next_invoice(ctx).await,
        WorkerName::DocumentGenerate => units::generate_next_document(ctx).await,
        WorkerName::EmailDelivery => units::deliver_next_email(ctx).await,
    }
}

#[derive(Clone)]
pub struct PollingWorkers {
    ctx: PipelineContext,
    leases: LeaseManager,
    gate: ReadinessGate,
}

impl PollingWorkers {
    pub fn new(ctx: PipelineContext, leases: LeaseManager, gate: ReadinessGate) -> Self {
        Self { ctx, leases, gate }
    }

    /// One guarded cycle of `worker`.
    pub async fn run_cycle(&self, worker: WorkerName, interval: Duration) -> CycleOutcome {
        self.gate.wait().await;
        let name = worker.as_str();

        let decision = match self
            .leases
            .try_acquire(name, interval, OffsetDateTime::now_utc())
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    target = "application::pipeline::polling",
                    op = "run_cycle",
                    worker = name,
                    result = "lease_error",
                    error = %err,
                    "Failed to evaluate execution lease"
                );
                return CycleOutcome::Failed(err.into());
            }
        };
        if !decision.acquired() {
            counter!(METRIC_LEASE_SKIPS_TOTAL, "worker" => name, "reason" => decision.as_str())
                .increment(1);
            debug!(
                target = "application::pipeline::polling",
                op = "run_cycle",
                worker = name,
                result = decision.as_str(),
                "Cycle skipped"
            );
            return CycleOutcome::Skipped(decision);
        }

        let started_at = Instant::now();
        let result =
            with_deadline(self.ctx.options.unit_deadline, run_unit(&self.ctx, worker)).await;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_UNIT_MS, "worker" => name).record(elapsed_ms);

        if let Err(err) = self.leases.complete(name).await {
            warn!(
                target = "application::pipeline::polling",
                op = "run_cycle",
                worker = name,
                error = %err,
                "Failed to record lease execution"
            );
        }

        match result {
            Ok(outcome) => {
                counter!(METRIC_UNITS_TOTAL, "worker" => name, "result" => outcome.as_str())
                    .increment(1);
                if matches!(outcome, UnitOutcome::NoWork) {
                    debug!(
                        target = "application::pipeline::polling",
                        op = "run_cycle",
                        worker = name,
                        result = outcome.as_str(),
                        "No eligible work"
                    );
                } else {
                    info!(
                        target = "application::pipeline::polling",
                        op = "run_cycle",
                        worker = name,
                        result = outcome.as_str(),
                        outcome = ?outcome,
                        elapsed_ms = elapsed_ms as u64,
                        "Unit of work finished"
                    );
                }
                CycleOutcome::Ran(outcome)
            }
            Err(err) => {
                counter!(METRIC_UNITS_TOTAL, "worker" => name, "result" => "error").increment(1);
                warn!(
                    target = "application::pipeline::polling",
                    op = "run_cycle",
                    worker = name,
                    result = "error",
                    error_code = err.code(),
                    transient = err.is_transient(),
                    error = %err,
                    elapsed_ms = elapsed_ms as u64,
                    "Unit of work failed; will retry on a later cycle"
                );
                CycleOutcome::Failed(err)
            }
        }
    }

    /// Drive `worker` forever. The ticker runs faster than `interval`; the lease decides
    /// which ticks actually do work.
    pub fn spawn(&self, worker: WorkerName, interval: Duration) -> JoinHandle<()> {
        let workers = self.clone();
        let tick = (interval / TICKS_PER_INTERVAL).max(MIN_TICK);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                target = "application::pipeline::polling",
                worker = worker.as_str(),
                interval_ms = interval.as_millis() as u64,
                "Polling worker started"
            );
            loop {
                ticker.tick().await;
                workers.run_cycle(worker, interval).await;
            }
        })
    }
}
