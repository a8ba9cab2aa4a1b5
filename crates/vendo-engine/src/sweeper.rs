//! # Expiry Sweeper
//!
//! Background task that closes unpaid orders and undecided top-ups once
//! their window has passed, and retries deliveries that never reported
//! back.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  loop {                                                      │
//! │    select! {                                                 │
//! │      interval.tick()  → sweep_once()                         │
//! │      shutdown_rx      → break                                │
//! │    }                                                         │
//! │  }                                                           │
//! │                                                              │
//! │  sweep_once():                                               │
//! │    for order in expirable(now)   → OrderMachine::expire      │
//! │    settled, undelivered too long → OrderMachine::redeliver   │
//! │    pending top-ups ≤ now - window → TopUpDesk::expire_stale  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Expiry is a compare-and-swap, so a sweep racing an approval or a second
//! sweep is harmless.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::OrderSettings;
use crate::error::{EngineError, EngineResult};
use crate::orders::{OrderMachine, TransitionOutcome};
use crate::topup::TopUpDesk;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub orders_expired: usize,
    /// Orders another actor resolved between listing and expiring.
    pub orders_skipped: usize,
    /// Stuck settlements handed to delivery again.
    pub orders_redelivered: usize,
    pub topups_expired: usize,
}

pub struct ExpirySweeper {
    orders: OrderMachine,
    topups: TopUpDesk,
    settings: OrderSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the sweeper.
#[derive(Clone)]
pub struct ExpirySweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ExpirySweeperHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

impl ExpirySweeper {
    pub(crate) fn new(
        orders: OrderMachine,
        topups: TopUpDesk,
        settings: OrderSettings,
    ) -> (Self, ExpirySweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = ExpirySweeper {
            orders,
            topups,
            settings,
            shutdown_rx,
        };

        (sweeper, ExpirySweeperHandle { shutdown_tx })
    }

    /// Runs the sweep loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.sweep_interval_secs,
            expiry_minutes = self.settings.expiry_minutes,
            "Expiry sweeper starting"
        );

        let mut interval = tokio::time::interval(self.settings.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report == SweepReport::default() => debug!("Nothing to expire"),
                        Ok(report) => info!(?report, "Sweep finished"),
                        Err(e) => error!(?e, "Sweep failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    /// One pass over everything past its window.
    pub async fn sweep_once(&self) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = self.orders.now();

        for order in self.orders.expirable(now).await? {
            match self.orders.expire(order.id).await? {
                TransitionOutcome::Applied(_) => report.orders_expired += 1,
                TransitionOutcome::AlreadyResolved { .. } | TransitionOutcome::NotDue { .. } => {
                    report.orders_skipped += 1
                }
            }
        }

        let stale_cutoff = now - self.settings.redelivery_after();
        for order in self.orders.stale_settlements(stale_cutoff).await? {
            match self.orders.redeliver(order.id).await? {
                TransitionOutcome::Applied(_) => report.orders_redelivered += 1,
                TransitionOutcome::AlreadyResolved { .. } | TransitionOutcome::NotDue { .. } => {
                    report.orders_skipped += 1
                }
            }
        }

        report.topups_expired = self
            .topups
            .expire_stale(now - self.settings.expiry())
            .await?;

        Ok(report)
    }
}
