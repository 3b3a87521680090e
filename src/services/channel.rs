// src/services/channel.rs
use async_trait::async_trait;
use firebase_rs::Firebase;
use futures::stream::BoxStream;
use futures::StreamExt;
use nanoid::nanoid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing;
use uuid::Uuid;

use crate::models::driver::NearbyDriver;
use crate::models::order::{AssignedDriver, Order, OrderPatch, OrderStatus};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("order create failed: {0}")]
    Create(String),

    #[error("order subscription failed: {0}")]
    Subscribe(String),

    #[error("order patch failed: {0}")]
    Patch(String),

    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

pub type OrderUpdates = BoxStream<'static, Result<Order, ChannelError>>;
pub type DriverUpdates = BoxStream<'static, Result<Vec<NearbyDriver>, ChannelError>>;

/// The remote live-updated store of authoritative order state. Delivery is
/// at-least-once per status change; consumers must tolerate duplicates.
#[async_trait]
pub trait OrderChannel: Send + Sync {
    /// Stores a new order document and returns its authoritative id.
    async fn create(&self, order: &Order) -> Result<String, ChannelError>;

    /// Streams the order document on every observed change. The stream ends
    /// when dropped; an Err item means the subscription is broken.
    async fn subscribe(&self, order_id: &str) -> Result<OrderUpdates, ChannelError>;

    /// Writes a single field back to an existing order.
    async fn patch(&self, order_id: &str, patch: OrderPatch) -> Result<(), ChannelError>;

    /// Streams snapshots of the available drivers around the city.
    async fn nearby_drivers(&self) -> Result<DriverUpdates, ChannelError>;
}

/// Firebase-backed channel. The realtime database has no Firestore-style
/// snapshot listener in this client crate, so subscriptions poll the node
/// and emit only when the watched fields change.
pub struct FirebaseOrderChannel {
    firebase: Firebase,
    poll_interval: Duration,
}

impl FirebaseOrderChannel {
    pub fn new(url: &str) -> Result<Self, ChannelError> {
        let firebase = Firebase::new(url).map_err(|e| ChannelError::Subscribe(e.to_string()))?;
        Ok(Self {
            firebase,
            poll_interval: Duration::from_secs(2),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl OrderChannel for FirebaseOrderChannel {
    async fn create(&self, order: &Order) -> Result<String, ChannelError> {
        let mut doc = order.clone();
        if doc.id.is_empty() {
            doc.id = Uuid::new_v4().to_string();
        }

        tracing::info!("Creating remote order document: {}", doc.id);
        self.firebase
            .at("orders")
            .at(&doc.id)
            .set(&doc)
            .await
            .map_err(|e| ChannelError::Create(e.to_string()))?;

        Ok(doc.id)
    }

    async fn subscribe(&self, order_id: &str) -> Result<OrderUpdates, ChannelError> {
        tracing::debug!("Subscribing to remote order: {}", order_id);
        let node = self.firebase.at("orders").at(order_id);
        let interval = self.poll_interval;

        let stream = futures::stream::unfold((node, None::<Order>), move |(node, last)| {
            async move {
                let mut last = last;
                loop {
                    match node.get::<Order>().await {
                        Ok(order) => {
                            let changed = last.as_ref().map_or(true, |prev| {
                                prev.status != order.status
                                    || prev.rating != order.rating
                                    || prev.driver != order.driver
                            });
                            if changed {
                                last = Some(order.clone());
                                return Some((Ok(order), (node, last)));
                            }
                        }
                        Err(err) => {
                            return Some((
                                Err(ChannelError::Subscribe(err.to_string())),
                                (node, last),
                            ));
                        }
                    }
                    tokio::time::sleep(interval).await;
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn patch(&self, order_id: &str, patch: OrderPatch) -> Result<(), ChannelError> {
        let body = match patch {
            OrderPatch::Status(status) => serde_json::json!({ "status": status }),
            OrderPatch::Rating(rating) => serde_json::json!({ "rating": rating }),
        };

        tracing::debug!("Patching remote order {}: {:?}", order_id, patch);
        self.firebase
            .at("orders")
            .at(order_id)
            .update(&body)
            .await
            .map_err(|e| ChannelError::Patch(e.to_string()))?;

        Ok(())
    }

    async fn nearby_drivers(&self) -> Result<DriverUpdates, ChannelError> {
        let node = self.firebase.at("drivers");
        let interval = self.poll_interval;

        let stream = futures::stream::unfold(
            (node, None::<Vec<NearbyDriver>>),
            move |(node, last)| async move {
                let mut last = last;
                loop {
                    match node.get::<HashMap<String, NearbyDriver>>().await {
                        Ok(map) => {
                            let mut drivers: Vec<NearbyDriver> =
                                map.into_values().filter(|d| d.is_available).collect();
                            drivers.sort_by(|a, b| a.id.cmp(&b.id));
                            if last.as_ref() != Some(&drivers) {
                                last = Some(drivers.clone());
                                return Some((Ok(drivers), (node, last)));
                            }
                        }
                        Err(err) => {
                            return Some((
                                Err(ChannelError::Subscribe(err.to_string())),
                                (node, last),
                            ));
                        }
                    }
                    tokio::time::sleep(interval).await;
                }
            },
        );

        Ok(stream.boxed())
    }
}

/// In-memory channel for development and testing. Each order gets a
/// broadcast topic; subscribers replay the current document first, then
/// receive every patched version.
pub struct MockOrderChannel {
    orders: Mutex<HashMap<String, Order>>,
    topics: Mutex<HashMap<String, broadcast::Sender<Order>>>,
    drivers: Mutex<Vec<NearbyDriver>>,
    create_delay: Option<Duration>,
    fail_create: AtomicBool,
}

impl MockOrderChannel {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            drivers: Mutex::new(Vec::new()),
            create_delay: None,
            fail_create: AtomicBool::new(false),
        }
    }

    /// Makes create() take a while, for exercising in-flight cancellation.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn set_create_failure(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub async fn seed_drivers(&self, drivers: Vec<NearbyDriver>) {
        *self.drivers.lock().await = drivers;
    }

    /// The stored document, as the dispatcher side would see it.
    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.lock().await.get(order_id).cloned()
    }

    /// Every stored document, for test assertions.
    pub async fn all_orders(&self) -> Vec<Order> {
        self.orders.lock().await.values().cloned().collect()
    }

    /// Dispatcher-side mutation: moves the order to a new status, optionally
    /// attaching driver details, and notifies subscribers.
    pub async fn simulate_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        driver: Option<AssignedDriver>,
    ) -> Result<(), ChannelError> {
        let updated = {
            let mut orders = self.orders.lock().await;
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| ChannelError::UnknownOrder(order_id.to_string()))?;
            order.status = status;
            if driver.is_some() {
                order.driver = driver;
            }
            order.clone()
        };
        let _ = self.topic(order_id).await.send(updated);
        Ok(())
    }

    async fn topic(&self, order_id: &str) -> broadcast::Sender<Order> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(order_id.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }
}

impl Default for MockOrderChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderChannel for MockOrderChannel {
    async fn create(&self, order: &Order) -> Result<String, ChannelError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ChannelError::Create("simulated create failure".to_string()));
        }

        let mut doc = order.clone();
        if doc.id.is_empty() {
            doc.id = nanoid!();
        }
        let id = doc.id.clone();
        self.orders.lock().await.insert(id.clone(), doc);

        tracing::debug!("[MOCK] Stored order {}", id);
        Ok(id)
    }

    async fn subscribe(&self, order_id: &str) -> Result<OrderUpdates, ChannelError> {
        let snapshot = self.orders.lock().await.get(order_id).cloned();
        let rx = self.topic(order_id).await.subscribe();

        let live = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(order) => return Some((Ok(order), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("[MOCK] Order stream lagged, skipped {} updates", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        let stream = futures::stream::iter(snapshot.into_iter().map(Ok)).chain(live);
        Ok(stream.boxed())
    }

    async fn patch(&self, order_id: &str, patch: OrderPatch) -> Result<(), ChannelError> {
        let updated = {
            let mut orders = self.orders.lock().await;
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| ChannelError::UnknownOrder(order_id.to_string()))?;
            match patch {
                OrderPatch::Status(status) => order.status = status,
                OrderPatch::Rating(rating) => order.rating = rating,
            }
            order.clone()
        };
        let _ = self.topic(order_id).await.send(updated);
        Ok(())
    }

    async fn nearby_drivers(&self) -> Result<DriverUpdates, ChannelError> {
        let drivers = self.drivers.lock().await.clone();
        let stream = futures::stream::iter(vec![Ok(drivers)]).chain(futures::stream::pending());
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geo::Coordinate;
    use crate::models::order::{PaymentMethod, Tariff};
    use chrono::Utc;

    fn sample_order() -> Order {
        Order {
            id: String::new(),
            user_id: "usr-260807-aaaaaa".to_string(),
            pickup_address: "Lenina 1".to_string(),
            pickup_point: Coordinate::new(58.1387, 52.6584),
            dropoff_address: "Kirova 20".to_string(),
            dropoff_point: Coordinate::new(58.1400, 52.6700),
            tariff: Tariff::Economy,
            payment_method: PaymentMethod::Cash,
            estimated_price: 117,
            distance_km: 0.7,
            status: OrderStatus::Searching,
            driver: None,
            rating: 0,
            tip: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_when_missing() {
        let channel = MockOrderChannel::new();
        let id = channel.create(&sample_order()).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(channel.order(&id).await.unwrap().status, OrderStatus::Searching);
    }

    #[tokio::test]
    async fn test_subscribe_replays_snapshot_then_patches() {
        let channel = MockOrderChannel::new();
        let id = channel.create(&sample_order()).await.unwrap();

        let mut updates = channel.subscribe(&id).await.unwrap();
        let first = updates.next().await.unwrap().unwrap();
        assert_eq!(first.status, OrderStatus::Searching);

        channel
            .patch(&id, OrderPatch::Status(OrderStatus::Accepted))
            .await
            .unwrap();
        let second = updates.next().await.unwrap().unwrap();
        assert_eq!(second.status, OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn test_patch_unknown_order_fails() {
        let channel = MockOrderChannel::new();
        let err = channel
            .patch("missing", OrderPatch::Rating(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownOrder(_)));
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let channel = MockOrderChannel::new();
        channel.set_create_failure(true);
        assert!(channel.create(&sample_order()).await.is_err());
    }
}
