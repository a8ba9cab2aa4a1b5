//! Shared fixtures for the service tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::OwnedMutexGuard;

use vendo_core::{AccountId, Money, Order};
use vendo_db::{Database, DbConfig};

use crate::clock::{Clock, ManualClock};
use crate::config::ShopConfig;
use crate::delivery::{Delivery, DeliveryError};
use crate::engine::{Engine, EngineBuilder};
use crate::notify::{Notification, Notifier};
use crate::orders::PurchaseRequest;

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(crate) fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn low_stock(&self) -> Vec<(String, i64)> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::LowStock { pool, remaining } => Some((pool, remaining)),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

#[derive(Default)]
pub(crate) struct RecordingDelivery {
    fail: AtomicBool,
    attempts: AtomicUsize,
    gate: Arc<tokio::sync::Mutex<()>>,
    held: Mutex<Option<OwnedMutexGuard<()>>>,
    delivered: Mutex<Vec<(i64, Vec<String>)>>,
}

impl RecordingDelivery {
    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn delivered(&self) -> Vec<(i64, Vec<String>)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Makes every delivery wait until [`release`](Self::release).
    pub(crate) fn hold(&self) {
        let guard = self.gate.clone().try_lock_owned().unwrap();
        *self.held.lock().unwrap() = Some(guard);
    }

    pub(crate) fn release(&self) {
        self.held.lock().unwrap().take();
    }

    /// Calls that entered `deliver`, finished or not.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_attempts(&self, count: usize) {
        for _ in 0..5_000 {
            if self.attempts() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        panic!("delivery never reached {} attempts", count);
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(
        &self,
        _account_id: AccountId,
        order_id: i64,
        units: &[String],
    ) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let _open = self.gate.lock().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::new("chat unreachable"));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((order_id, units.to_vec()));
        Ok(())
    }
}

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub(crate) struct Harness {
    pub(crate) engine: Engine,
    pub(crate) db: Database,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) delivery: Arc<RecordingDelivery>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));
        let notifier = Arc::new(RecordingNotifier::default());
        let delivery = Arc::new(RecordingDelivery::default());

        let engine = EngineBuilder::new(ShopConfig::default())
            .with_database(db.clone())
            .with_clock(clock.clone())
            .with_notifier(notifier.clone())
            .with_delivery(delivery.clone())
            .build()
            .unwrap();

        Harness {
            engine,
            db,
            clock,
            notifier,
            delivery,
        }
    }

    /// Fills `pool` with `count` numbered units.
    pub(crate) async fn stock(&self, pool: &str, count: usize) {
        let units: Vec<String> = (0..count).map(|i| format!("{}-{}", pool, i)).collect();
        self.engine.inventory().replenish(pool, &units).await.unwrap();
    }

    pub(crate) async fn fund(&self, account_id: AccountId, amount: i64) {
        self.engine
            .ledger()
            .credit(account_id, Money::new(amount))
            .await
            .unwrap();
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Places an order while delivery is held and drops the placing task
    /// once it waits on delivery. Returns the order as it was left.
    pub(crate) async fn abandon_delivery(&self, request: PurchaseRequest) -> Order {
        let account_id = request.account_id;
        let before = self.delivery.attempts();
        let orders = self.engine.orders();
        let task = tokio::spawn(async move { orders.place_order(request).await });

        self.delivery.wait_for_attempts(before + 1).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        self.engine
            .orders()
            .orders_for(account_id, 1)
            .await
            .unwrap()
            .remove(0)
    }
}
