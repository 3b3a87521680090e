// src/services/lifecycle.rs
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing;

use crate::errors::{KestrelError, KestrelResult};
use crate::models::geo::Coordinate;
use crate::models::history::RideHistoryRecord;
use crate::models::order::{Order, OrderPatch, OrderStatus, PaymentMethod, Tariff};
use crate::services::channel::OrderChannel;
use crate::services::draft::OrderDraft;
use crate::services::store::HistoryStore;

/// Lifecycle of a placed order. One tagged union, one transition point; the
/// UI observes it through a watch channel instead of mutating it.
#[derive(Debug, Clone, PartialEq)]
pub enum RideState {
    Idle,
    Submitting,
    Searching { order_id: String },
    DriverFound { order: Order },
    InProgress { order: Order },
    Completed { order: Order },
    Error { message: String },
}

impl RideState {
    pub fn label(&self) -> &'static str {
        match self {
            RideState::Idle => "Idle",
            RideState::Submitting => "Submitting",
            RideState::Searching { .. } => "Searching",
            RideState::DriverFound { .. } => "DriverFound",
            RideState::InProgress { .. } => "InProgress",
            RideState::Completed { .. } => "Completed",
            RideState::Error { .. } => "Error",
        }
    }

    /// True while the given order is live on the remote side. Remote
    /// deliveries for any other order id, or outside this chain, are stale.
    fn tracks(&self, order_id: &str) -> bool {
        match self {
            RideState::Searching { order_id: id } => id == order_id,
            RideState::DriverFound { order } | RideState::InProgress { order } => {
                order.id == order_id
            }
            _ => false,
        }
    }
}

struct FlowInner {
    state: RideState,
    /// Bumped on every submit and cancel. In-flight work holding an older
    /// epoch finds out it has been superseded and stands down.
    epoch: u64,
    /// Duration estimate captured at submit time, written into the history
    /// record on completion (the remote document carries no duration).
    pending_duration_min: i64,
    subscription: Option<JoinHandle<()>>,
}

struct FlowShared {
    channel: Arc<dyn OrderChannel>,
    history: Arc<dyn HistoryStore>,
    user_id: String,
    /// Separate lock from `inner` so address editing never waits on an
    /// in-flight submission.
    draft: Mutex<OrderDraft>,
    inner: Mutex<FlowInner>,
    state_tx: watch::Sender<RideState>,
}

impl FlowShared {
    fn set_state(&self, inner: &mut FlowInner, next: RideState) {
        if inner.state == next {
            // Duplicate delivery of the same status; nothing to notify.
            return;
        }
        tracing::info!("Ride state: {} -> {}", inner.state.label(), next.label());
        inner.state = next.clone();
        let _ = self.state_tx.send(next);
    }

    fn release_subscription(inner: &mut FlowInner) {
        if let Some(handle) = inner.subscription.take() {
            handle.abort();
        }
    }

    /// Applies one remote delivery. Returns false once the order has left
    /// the live chain and the subscription should wind down.
    async fn apply_remote(self: &Arc<Self>, order: Order, epoch: u64) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch || !inner.state.tracks(&order.id) {
            // Stale: a cancelled or superseded order must not resurrect.
            tracing::debug!("Ignoring stale update for order {}", order.id);
            return false;
        }

        match order.status {
            OrderStatus::Searching => true, // still waiting for a driver
            OrderStatus::Accepted | OrderStatus::Arriving => {
                self.set_state(&mut inner, RideState::DriverFound { order });
                true
            }
            OrderStatus::InProgress => {
                self.set_state(&mut inner, RideState::InProgress { order });
                true
            }
            OrderStatus::Completed => {
                // Archive before the transition returns; the rating screen
                // is optional and must not gate this.
                let record = RideHistoryRecord::from_order(&order, inner.pending_duration_min);
                if let Err(err) = self.history.insert_or_replace(&record).await {
                    tracing::error!("Failed to archive ride {}: {}", order.id, err);
                }
                inner.subscription = None;
                self.set_state(&mut inner, RideState::Completed { order });
                false
            }
            OrderStatus::Cancelled => {
                // Terminated on the dispatcher side.
                inner.subscription = None;
                self.set_state(&mut inner, RideState::Idle);
                false
            }
        }
    }

    async fn fail(self: &Arc<Self>, epoch: u64, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return;
        }
        tracing::error!("Ride flow failed: {}", message);
        Self::release_subscription(&mut inner);
        self.set_state(&mut inner, RideState::Error { message });
    }

    fn spawn_subscription(self: &Arc<Self>, order_id: String, epoch: u64) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let mut updates = match shared.channel.subscribe(&order_id).await {
                Ok(updates) => updates,
                Err(err) => {
                    shared
                        .fail(epoch, format!("order subscription failed: {}", err))
                        .await;
                    return;
                }
            };
            while let Some(update) = updates.next().await {
                match update {
                    Ok(order) => {
                        if !shared.apply_remote(order, epoch).await {
                            break;
                        }
                    }
                    Err(err) => {
                        shared.fail(epoch, format!("order channel error: {}", err)).await;
                        break;
                    }
                }
            }
        })
    }
}

/// The client-side owner of order state: accumulates the draft, submits it,
/// follows the remote order through its lifecycle and archives the ride on
/// completion. All mutations are serialized through one lock.
#[derive(Clone)]
pub struct RideFlow {
    shared: Arc<FlowShared>,
}

impl RideFlow {
    pub fn new(
        channel: Arc<dyn OrderChannel>,
        history: Arc<dyn HistoryStore>,
        user_id: impl Into<String>,
        fallback_point: Coordinate,
    ) -> Self {
        let (state_tx, _) = watch::channel(RideState::Idle);
        Self {
            shared: Arc::new(FlowShared {
                channel,
                history,
                user_id: user_id.into(),
                draft: Mutex::new(OrderDraft::new(fallback_point)),
                inner: Mutex::new(FlowInner {
                    state: RideState::Idle,
                    epoch: 0,
                    pending_duration_min: 0,
                    subscription: None,
                }),
                state_tx,
            }),
        }
    }

    /// Current state, for one-off reads.
    pub fn state(&self) -> RideState {
        self.shared.state_tx.borrow().clone()
    }

    /// Subscribe/notify contract for UI binding.
    pub fn watch_state(&self) -> watch::Receiver<RideState> {
        self.shared.state_tx.subscribe()
    }

    // ----- draft editing -------------------------------------------------

    pub async fn set_pickup(&self, address: impl Into<String>, point: Option<Coordinate>) {
        self.shared.draft.lock().await.set_pickup(address, point);
    }

    pub async fn set_dropoff(&self, address: impl Into<String>, point: Option<Coordinate>) {
        self.shared.draft.lock().await.set_dropoff(address, point);
    }

    pub async fn clear_pickup(&self) {
        self.shared.draft.lock().await.clear_pickup();
    }

    pub async fn clear_dropoff(&self) {
        self.shared.draft.lock().await.clear_dropoff();
    }

    pub async fn set_tariff(&self, tariff: Tariff) {
        self.shared.draft.lock().await.set_tariff(tariff);
    }

    pub async fn set_payment_method(&self, method: PaymentMethod) {
        self.shared.draft.lock().await.set_payment_method(method);
    }

    /// Snapshot of the draft, estimates included.
    pub async fn draft(&self) -> OrderDraft {
        self.shared.draft.lock().await.clone()
    }

    // ----- lifecycle commands --------------------------------------------

    /// Submits the drafted order and starts following it. Returns the
    /// authoritative order id once the remote create resolves.
    pub async fn submit(&self) -> KestrelResult<String> {
        // Validation failures surface in place; the lifecycle is untouched.
        let (order, duration_min) = {
            let draft = self.shared.draft.lock().await;
            let order = draft.build_order(&self.shared.user_id)?;
            (order, draft.estimated_duration_min())
        };

        let epoch = {
            let mut inner = self.shared.inner.lock().await;
            if !matches!(inner.state, RideState::Idle | RideState::Error { .. }) {
                return Err(KestrelError::Submission(format!(
                    "an order is already active ({})",
                    inner.state.label()
                )));
            }
            inner.epoch += 1;
            inner.pending_duration_min = duration_min;
            self.shared.set_state(&mut inner, RideState::Submitting);
            inner.epoch
        };

        tracing::info!("Submitting order for user {}", self.shared.user_id);
        let created = self.shared.channel.create(&order).await;

        let mut inner = self.shared.inner.lock().await;
        if inner.epoch != epoch {
            // Cancelled while the create call was in flight. Local state is
            // already back at Idle; undo the remote side best-effort.
            if let Ok(order_id) = created {
                let channel = Arc::clone(&self.shared.channel);
                tokio::spawn(async move {
                    if let Err(err) = channel
                        .patch(&order_id, OrderPatch::Status(OrderStatus::Cancelled))
                        .await
                    {
                        tracing::warn!("Failed to cancel abandoned order {}: {}", order_id, err);
                    }
                });
            }
            return Err(KestrelError::Submission(
                "order submission was cancelled".to_string(),
            ));
        }

        match created {
            Ok(order_id) => {
                self.shared.set_state(
                    &mut inner,
                    RideState::Searching {
                        order_id: order_id.clone(),
                    },
                );
                inner.subscription =
                    Some(self.shared.spawn_subscription(order_id.clone(), epoch));
                drop(inner);

                self.shared.draft.lock().await.reset();
                Ok(order_id)
            }
            Err(err) => {
                let message = err.to_string();
                self.shared.set_state(
                    &mut inner,
                    RideState::Error {
                        message: message.clone(),
                    },
                );
                Err(KestrelError::Submission(message))
            }
        }
    }

    /// Cancels the active order. The local state flips to Idle immediately;
    /// the remote write is best-effort and its failure does not revert it.
    pub async fn cancel(&self) -> KestrelResult<()> {
        let order_id = {
            let mut inner = self.shared.inner.lock().await;
            let order_id = match &inner.state {
                RideState::Submitting => {
                    // The create call has not resolved yet; bumping the
                    // epoch makes submit() abandon and undo its result.
                    inner.epoch += 1;
                    self.shared.set_state(&mut inner, RideState::Idle);
                    None
                }
                RideState::Searching { order_id } => Some(order_id.clone()),
                RideState::DriverFound { order } => Some(order.id.clone()),
                _ => {
                    return Err(KestrelError::Cancel(format!(
                        "no cancellable order ({})",
                        inner.state.label()
                    )));
                }
            };
            if let Some(id) = &order_id {
                tracing::info!("Cancelling order {}", id);
                inner.epoch += 1;
                Self::release_subscription_inner(&mut inner);
                self.shared.set_state(&mut inner, RideState::Idle);
            }
            order_id
        };

        self.shared.draft.lock().await.reset();

        if let Some(order_id) = order_id {
            if let Err(err) = self
                .shared
                .channel
                .patch(&order_id, OrderPatch::Status(OrderStatus::Cancelled))
                .await
            {
                tracing::warn!("Remote cancel for {} failed: {}", order_id, err);
                return Err(KestrelError::Cancel(err.to_string()));
            }
        }
        Ok(())
    }

    /// Rates the completed ride (1-5) and returns to Idle. The ride is
    /// already archived; the rating write is a best-effort addendum.
    pub async fn rate(&self, rating: u8) -> KestrelResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(KestrelError::InvalidRating(rating));
        }

        let order_id = {
            let mut inner = self.shared.inner.lock().await;
            let order_id = match &inner.state {
                RideState::Completed { order } => order.id.clone(),
                other => {
                    return Err(KestrelError::Rate(format!(
                        "no completed order awaiting a rating ({})",
                        other.label()
                    )));
                }
            };
            self.shared.set_state(&mut inner, RideState::Idle);
            order_id
        };

        self.shared.draft.lock().await.reset();

        if let Err(err) = self
            .shared
            .channel
            .patch(&order_id, OrderPatch::Rating(rating))
            .await
        {
            tracing::warn!("Failed to store rating for {}: {}", order_id, err);
            return Err(KestrelError::Rate(err.to_string()));
        }
        Ok(())
    }

    /// Dismisses an error state; the user may then submit again.
    pub async fn clear_error(&self) {
        let mut inner = self.shared.inner.lock().await;
        if matches!(inner.state, RideState::Error { .. }) {
            self.shared.set_state(&mut inner, RideState::Idle);
        }
    }

    fn release_subscription_inner(inner: &mut FlowInner) {
        FlowShared::release_subscription(inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::AssignedDriver;
    use crate::services::channel::MockOrderChannel;
    use crate::services::store::MemoryHistoryStore;
    use std::time::Duration;
    use tokio::time::timeout;

    const PICKUP: Coordinate = Coordinate::new(58.1387, 52.6584);
    const DROPOFF: Coordinate = Coordinate::new(58.1400, 52.6700);
    const USER: &str = "usr-260807-aaaaaa";

    fn driver() -> AssignedDriver {
        AssignedDriver {
            name: "Ivan K.".to_string(),
            phone: "+79120000001".to_string(),
            car_model: "Lada Vesta".to_string(),
            car_plate: "A123BC18".to_string(),
        }
    }

    fn flow_with(
        channel: Arc<MockOrderChannel>,
    ) -> (RideFlow, Arc<MemoryHistoryStore>) {
        let history = Arc::new(MemoryHistoryStore::new());
        let flow = RideFlow::new(
            channel,
            history.clone(),
            USER,
            crate::models::geo::CITY_CENTER,
        );
        (flow, history)
    }

    async fn compose(flow: &RideFlow) {
        flow.set_pickup("Lenina 1", Some(PICKUP)).await;
        flow.set_dropoff("Kirova 20", Some(DROPOFF)).await;
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<RideState>, pred: F) -> RideState
    where
        F: Fn(&RideState) -> bool,
    {
        timeout(Duration::from_secs(1), async {
            loop {
                {
                    let state = rx.borrow_and_update().clone();
                    if pred(&state) {
                        return state;
                    }
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("timed out waiting for ride state")
    }

    #[tokio::test]
    async fn test_blank_address_leaves_lifecycle_idle() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, _) = flow_with(channel);
        flow.set_pickup("Lenina 1", Some(PICKUP)).await;

        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, KestrelError::IncompleteAddress(_)));
        assert_eq!(flow.state(), RideState::Idle);
    }

    #[tokio::test]
    async fn test_full_ride_archives_once_and_rates() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, history) = flow_with(channel.clone());
        compose(&flow).await;

        let order_id = flow.submit().await.unwrap();
        assert!(matches!(flow.state(), RideState::Searching { .. }));
        // The draft is handed off and cleared.
        assert!(flow.draft().await.pickup_address().is_empty());

        let mut rx = flow.watch_state();
        channel
            .simulate_status(&order_id, OrderStatus::Accepted, Some(driver()))
            .await
            .unwrap();
        let state = wait_for(&mut rx, |s| matches!(s, RideState::DriverFound { .. })).await;
        if let RideState::DriverFound { order } = state {
            assert_eq!(order.driver.as_ref().unwrap().name, "Ivan K.");
        }

        channel
            .simulate_status(&order_id, OrderStatus::InProgress, None)
            .await
            .unwrap();
        wait_for(&mut rx, |s| matches!(s, RideState::InProgress { .. })).await;

        channel
            .simulate_status(&order_id, OrderStatus::Completed, None)
            .await
            .unwrap();
        wait_for(&mut rx, |s| matches!(s, RideState::Completed { .. })).await;

        let records = history.all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, order_id);
        assert_eq!(records[0].duration_min, 5);

        // A duplicate Completed delivery must not add a second record.
        channel
            .simulate_status(&order_id, OrderStatus::Completed, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(history.count().await.unwrap(), 1);
        assert!(matches!(flow.state(), RideState::Completed { .. }));

        flow.rate(5).await.unwrap();
        assert_eq!(flow.state(), RideState::Idle);
        assert_eq!(channel.order(&order_id).await.unwrap().rating, 5);
    }

    #[tokio::test]
    async fn test_status_skip_goes_straight_to_in_progress() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, _) = flow_with(channel.clone());
        compose(&flow).await;

        let order_id = flow.submit().await.unwrap();
        let mut rx = flow.watch_state();

        // Transitions are level-triggered on the status value; skipping
        // Accepted is fine.
        channel
            .simulate_status(&order_id, OrderStatus::InProgress, None)
            .await
            .unwrap();
        wait_for(&mut rx, |s| matches!(s, RideState::InProgress { .. })).await;
    }

    #[tokio::test]
    async fn test_cancel_while_searching_ignores_stale_accept() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, _) = flow_with(channel.clone());
        compose(&flow).await;

        let order_id = flow.submit().await.unwrap();
        flow.cancel().await.unwrap();
        assert_eq!(flow.state(), RideState::Idle);
        assert_eq!(
            channel.order(&order_id).await.unwrap().status,
            OrderStatus::Cancelled
        );

        // A late Accepted for the cancelled order must not resurrect it.
        channel
            .simulate_status(&order_id, OrderStatus::Accepted, Some(driver()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(flow.state(), RideState::Idle);
    }

    #[tokio::test]
    async fn test_remote_cancel_returns_to_idle() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, _) = flow_with(channel.clone());
        compose(&flow).await;

        let order_id = flow.submit().await.unwrap();
        let mut rx = flow.watch_state();
        channel
            .simulate_status(&order_id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        wait_for(&mut rx, |s| matches!(s, RideState::Idle)).await;
    }

    #[tokio::test]
    async fn test_create_failure_surfaces_as_error_state() {
        let channel = Arc::new(MockOrderChannel::new());
        channel.set_create_failure(true);
        let (flow, _) = flow_with(channel.clone());
        compose(&flow).await;

        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, KestrelError::Submission(_)));
        assert!(matches!(flow.state(), RideState::Error { .. }));

        // Recoverable: dismiss and retry.
        flow.clear_error().await;
        assert_eq!(flow.state(), RideState::Idle);
        channel.set_create_failure(false);
        compose(&flow).await;
        flow.submit().await.unwrap();
        assert!(matches!(flow.state(), RideState::Searching { .. }));
    }

    #[tokio::test]
    async fn test_cancel_during_submission_abandons_order() {
        let channel = Arc::new(
            MockOrderChannel::new().with_create_delay(Duration::from_millis(100)),
        );
        let (flow, _) = flow_with(channel.clone());
        compose(&flow).await;

        let submitting = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.submit().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(flow.state(), RideState::Submitting);

        flow.cancel().await.unwrap();
        assert_eq!(flow.state(), RideState::Idle);

        let result = submitting.await.unwrap();
        assert!(matches!(result, Err(KestrelError::Submission(_))));
        assert_eq!(flow.state(), RideState::Idle);

        // The abandoned remote document ends up cancelled, best-effort.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let orders = channel.all_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_rating_requires_completed_state() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, _) = flow_with(channel);

        assert!(matches!(
            flow.rate(4).await.unwrap_err(),
            KestrelError::Rate(_)
        ));
        assert!(matches!(
            flow.rate(0).await.unwrap_err(),
            KestrelError::InvalidRating(0)
        ));
        assert!(matches!(
            flow.rate(6).await.unwrap_err(),
            KestrelError::InvalidRating(6)
        ));
    }

    #[tokio::test]
    async fn test_second_submission_while_active_is_rejected() {
        let channel = Arc::new(MockOrderChannel::new());
        let (flow, _) = flow_with(channel);
        compose(&flow).await;
        flow.submit().await.unwrap();

        compose(&flow).await;
        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, KestrelError::Submission(_)));
    }
}
