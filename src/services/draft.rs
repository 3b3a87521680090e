// src/services/draft.rs
use chrono::Utc;
use uuid::Uuid;

use crate::errors::{KestrelError, KestrelResult};
use crate::models::geo::Coordinate;
use crate::models::order::{Order, OrderStatus, PaymentMethod, Tariff};
use crate::utils::geo;

/// The in-progress order being composed, owned by one session at a time.
/// The derived price/distance/duration always equal a recomputation from the
/// current coordinates and tariff; they are zero whenever either coordinate
/// is missing.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pickup_address: String,
    pickup_point: Option<Coordinate>,
    dropoff_address: String,
    dropoff_point: Option<Coordinate>,
    tariff: Tariff,
    payment_method: PaymentMethod,
    estimated_distance_km: f64,
    estimated_duration_min: i64,
    estimated_price: i64,
    /// Used in place of an unresolved coordinate when the order is built.
    fallback_point: Coordinate,
}

impl OrderDraft {
    pub fn new(fallback_point: Coordinate) -> Self {
        Self {
            pickup_address: String::new(),
            pickup_point: None,
            dropoff_address: String::new(),
            dropoff_point: None,
            tariff: Tariff::default(),
            payment_method: PaymentMethod::default(),
            estimated_distance_km: 0.0,
            estimated_duration_min: 0,
            estimated_price: 0,
            fallback_point,
        }
    }

    /// Updates the pickup address text; the coordinate is only touched when
    /// one is provided, so free-typing does not erase a resolved point.
    pub fn set_pickup(&mut self, address: impl Into<String>, point: Option<Coordinate>) {
        self.pickup_address = address.into();
        if let Some(point) = point {
            self.pickup_point = Some(point);
        }
        self.recompute();
    }

    pub fn set_dropoff(&mut self, address: impl Into<String>, point: Option<Coordinate>) {
        self.dropoff_address = address.into();
        if let Some(point) = point {
            self.dropoff_point = Some(point);
        }
        self.recompute();
    }

    /// Explicitly discards the pickup side, text and coordinate both.
    pub fn clear_pickup(&mut self) {
        self.pickup_address.clear();
        self.pickup_point = None;
        self.recompute();
    }

    pub fn clear_dropoff(&mut self) {
        self.dropoff_address.clear();
        self.dropoff_point = None;
        self.recompute();
    }

    pub fn set_tariff(&mut self, tariff: Tariff) {
        self.tariff = tariff;
        self.recompute();
    }

    // Payment method does not affect the price; no recomputation needed.
    pub fn set_payment_method(&mut self, method: PaymentMethod) {
        self.payment_method = method;
    }

    pub fn pickup_address(&self) -> &str {
        &self.pickup_address
    }

    pub fn dropoff_address(&self) -> &str {
        &self.dropoff_address
    }

    pub fn tariff(&self) -> Tariff {
        self.tariff
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn estimated_distance_km(&self) -> f64 {
        self.estimated_distance_km
    }

    pub fn estimated_duration_min(&self) -> i64 {
        self.estimated_duration_min
    }

    pub fn estimated_price(&self) -> i64 {
        self.estimated_price
    }

    fn recompute(&mut self) {
        let (Some(from), Some(to)) = (self.pickup_point, self.dropoff_point) else {
            self.estimated_distance_km = 0.0;
            self.estimated_duration_min = 0;
            self.estimated_price = 0;
            return;
        };
        let distance = geo::distance_km(from, to);
        self.estimated_distance_km = distance;
        self.estimated_duration_min = geo::estimate_duration_min(distance);
        self.estimated_price = geo::estimate_price(distance, self.tariff);
    }

    /// Builds the order record for submission. Blank address text is a
    /// validation failure; a missing coordinate is not, and falls back to
    /// the configured city center.
    pub fn build_order(&self, user_id: &str) -> KestrelResult<Order> {
        if self.pickup_address.trim().is_empty() {
            return Err(KestrelError::incomplete_address("pickup address is empty"));
        }
        if self.dropoff_address.trim().is_empty() {
            return Err(KestrelError::incomplete_address("dropoff address is empty"));
        }

        Ok(Order {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            pickup_address: self.pickup_address.clone(),
            pickup_point: self.pickup_point.unwrap_or(self.fallback_point),
            dropoff_address: self.dropoff_address.clone(),
            dropoff_point: self.dropoff_point.unwrap_or(self.fallback_point),
            tariff: self.tariff,
            payment_method: self.payment_method,
            estimated_price: self.estimated_price,
            distance_km: self.estimated_distance_km,
            status: OrderStatus::Searching,
            driver: None,
            rating: 0,
            tip: None,
            created_at: Utc::now(),
        })
    }

    /// Back to the initial empty state. Called after a successful
    /// submission, after cancellation and after rating.
    pub fn reset(&mut self) {
        *self = Self::new(self.fallback_point);
    }
}
