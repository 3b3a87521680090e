// src/models/history.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::geo::Coordinate;
use crate::models::order::{AssignedDriver, Order, OrderStatus, PaymentMethod, Tariff};
use crate::utils::ids::{IdGenerator, IdType};

/// Archival copy of a terminated order, written once when the ride leaves
/// the live lifecycle. Identified by the originating order id, so re-saving
/// the same ride replaces the record instead of duplicating it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RideHistoryRecord {
    pub id: String,
    pub pickup_address: String,
    pub pickup_point: Coordinate,
    pub dropoff_address: String,
    pub dropoff_point: Coordinate,
    pub tariff: Tariff,
    pub payment_method: PaymentMethod,
    pub price: i64,
    pub distance_km: f64,
    pub duration_min: i64,
    pub status: OrderStatus,
    pub rating: u8,
    pub driver: Option<AssignedDriver>,
    pub timestamp: DateTime<Utc>,
}

impl RideHistoryRecord {
    /// The realized duration is the estimate captured when the order was
    /// submitted; the remote document does not carry one.
    pub fn from_order(order: &Order, duration_min: i64) -> Self {
        Self {
            id: order.id.clone(),
            pickup_address: order.pickup_address.clone(),
            pickup_point: order.pickup_point,
            dropoff_address: order.dropoff_address.clone(),
            dropoff_point: order.dropoff_point,
            tariff: order.tariff,
            payment_method: order.payment_method,
            price: order.estimated_price,
            distance_km: order.distance_km,
            duration_min,
            status: order.status,
            rating: order.rating,
            driver: order.driver.clone(),
            timestamp: order.created_at,
        }
    }
}

/// A user-curated label for a place, e.g. "Home". Independent of orders.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FavoriteAddress {
    pub id: String,
    pub label: String,
    pub address: String,
    pub point: Coordinate,
}

impl FavoriteAddress {
    pub fn new(label: impl Into<String>, address: impl Into<String>, point: Coordinate) -> Self {
        Self {
            id: IdGenerator::generate(IdType::Favorite),
            label: label.into(),
            address: address.into(),
            point,
        }
    }
}
