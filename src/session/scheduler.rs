//! Timeout trigger: force a task boundary when speech runs on too long.
//!
//! [`CommitClock`] is the pure decision logic and lives inside the engine
//! state, so a voice-boundary reset and a timeout check can never interleave.
//! [`TriggerScheduler`] is the recurring task that polls it and, when it
//! fires, commits the remote audio buffer and requests a response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::engine::SessionEngine;
use super::shutdown::ShutdownSignal;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// CommitClock
// ---------------------------------------------------------------------------

/// What a scheduler tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The interval has not elapsed since the last commit.
    Waiting,
    /// The interval elapsed with no audio sent; the timer was reset.
    Idle,
    /// The interval elapsed with `units` of audio pending; the timer and
    /// counter were reset and a forced commit is due.
    Fire { units: u64 },
}

#[derive(Debug, Clone)]
pub struct CommitClock {
    interval: Duration,
    last_commit: Instant,
    sent_since_commit: u64,
}

impl CommitClock {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_commit: now,
            sent_since_commit: 0,
        }
    }

    /// Count one audio unit sent to the transport.
    pub fn record_sent(&mut self) {
        self.sent_since_commit += 1;
    }

    /// A commit happened (natural or forced): restart the interval.
    pub fn reset(&mut self, now: Instant) {
        self.last_commit = now;
        self.sent_since_commit = 0;
    }

    pub fn pending_units(&self) -> u64 {
        self.sent_since_commit
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn poll(&mut self, now: Instant) -> TickOutcome {
        if now.saturating_duration_since(self.last_commit) < self.interval {
            return TickOutcome::Waiting;
        }
        let units = self.sent_since_commit;
        self.reset(now);
        if units == 0 {
            TickOutcome::Idle
        } else {
            TickOutcome::Fire { units }
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerScheduler
// ---------------------------------------------------------------------------

/// Recurring force-commit check.
pub struct TriggerScheduler {
    engine: SessionEngine,
    transport: Arc<dyn Transport>,
    period: Duration,
}

impl TriggerScheduler {
    /// Check every `period`; the engine decides whether the interval elapsed.
    pub fn new(engine: SessionEngine, transport: Arc<dyn Transport>, period: Duration) -> Self {
        Self {
            engine,
            transport,
            period,
        }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        log::info!("scheduler: force-commit check every {:?}", self.period);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => self.tick(Instant::now()).await,
            }
        }

        log::info!("scheduler: stopped");
    }

    async fn tick(&self, now: Instant) {
        let Some(task) = self.engine.poll_force_commit(now) else {
            return;
        };
        if let Err(e) = self.transport.commit_and_respond().await {
            log::warn!("scheduler: forced commit for task {task} not sent: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
