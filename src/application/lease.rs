//! Distributed execution lease over the shared relational store, plus the readiness gate
//! that holds polling workers back until the schema is migrated.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::debug;

use crate::application::repos::{LeasesRepo, RepoError};

/// Why a worker does not run this cycle, or that it may.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDecision {
    Acquired { previous: OffsetDateTime },
    /// The interval since the last execution has not elapsed yet.
    TooSoon { last_executed_at: OffsetDateTime },
    /// Another instance advanced the lease between our read and our update.
    LostRace,
}

impl LeaseDecision {
    pub fn acquired(&self) -> bool {
        matches!(self, LeaseDecision::Acquired { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseDecision::Acquired { .. } => "acquired",
            LeaseDecision::TooSoon { .. } => "too_soon",
            LeaseDecision::LostRace => "lost_race",
        }
    }
}

#[derive(Clone)]
pub struct LeaseManager {
    repo: Arc<dyn LeasesRepo>,
}

impl LeaseManager {
    pub fn new(repo: Arc<dyn LeasesRepo>) -> Self {
        Self { repo }
    }

    /// Read-then-conditionally-update the named lease.
    pub async fn try_acquire(
        &self,
        worker_name: &str,
        interval: Duration,
        now: OffsetDateTime,
    ) -> Result<LeaseDecision, RepoError> {
        let lease = self.repo.load_lease(worker_name).await?;
        let elapsed = now - lease.last_executed_at;
        let interval_span = time::Duration::try_from(interval).unwrap_or(time::Duration::MAX);

        if elapsed < interval_span {
            debug!(
                target = "application::lease",
                worker = worker_name,
                result = "too_soon",
                elapsed_ms = elapsed.whole_milliseconds() as i64,
                interval_ms = interval.as_millis() as u64,
                "Lease interval has not elapsed"
            );
            return Ok(LeaseDecision::TooSoon {
                last_executed_at: lease.last_executed_at,
            });
        }

        let won = self
            .repo
            .try_advance_lease(worker_name, lease.last_executed_at, now)
            .await?;

        if won {
            Ok(LeaseDecision::Acquired {
                previous: lease.last_executed_at,
            })
        } else {
            debug!(
                target = "application::lease",
                worker = worker_name,
                result = "lost_race",
                "Another instance advanced the lease first"
            );
            Ok(LeaseDecision::LostRace)
        }
    }

    /// Bump the execution counter after the guarded body ran.
    pub async fn complete(&self, worker_name: &str) -> Result<(), RepoError> {
        self.repo.record_execution(worker_name).await
    }
}

/// One-shot gate opened when an asynchronous prerequisite finishes.
#[derive(Clone)]
pub struct ReadinessGate {
    sender: Arc<watch::Sender<bool>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A gate that is already open.
    pub fn opened() -> Self {
        let gate = Self::new();
        gate.open();
        gate
    }

    pub fn open(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once the gate has been opened; returns immediately if it already is.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
