// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::geo::Coordinate;

/// Pricing tiers. Base prices and per-kilometer rates are fixed at compile
/// time in whole currency units; display names belong to the UI layer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tariff {
    Economy,
    Comfort,
    Business,
}

impl Tariff {
    pub fn base_price(&self) -> i64 {
        match self {
            Tariff::Economy => 100,
            Tariff::Comfort => 150,
            Tariff::Business => 250,
        }
    }

    pub fn per_km_rate(&self) -> i64 {
        match self {
            Tariff::Economy => 25,
            Tariff::Comfort => 35,
            Tariff::Business => 50,
        }
    }
}

impl Default for Tariff {
    fn default() -> Self {
        Tariff::Economy
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    SbpTransfer, // bank transfer via the fast payment system
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

/// Status vocabulary of the remote order document. The dispatcher side moves
/// an order through these values; the client only ever writes `Cancelled`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Searching,  // created, waiting for a driver to take the order
    Accepted,   // a driver took the order
    Arriving,   // the driver is on the way to the pickup point
    InProgress, // ride underway
    Completed,  // ride finished
    Cancelled,  // terminated by either side
}

/// Driver details filled in by the dispatcher once a driver accepts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssignedDriver {
    pub name: String,
    pub phone: String,
    pub car_model: String,
    pub car_plate: String,
}

/// A single ride request. Created by the client from a draft, owned
/// authoritatively by the remote order channel afterwards; the client keeps
/// a read-mostly mirror updated through its subscription.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub pickup_address: String,
    pub pickup_point: Coordinate,
    pub dropoff_address: String,
    pub dropoff_point: Coordinate,
    pub tariff: Tariff,
    pub payment_method: PaymentMethod,
    pub estimated_price: i64,
    pub distance_km: f64,
    pub status: OrderStatus,
    pub driver: Option<AssignedDriver>,
    /// 0 until the user rates the ride, then 1-5.
    pub rating: u8,
    pub tip: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// The only two fields the client ever writes back to an existing order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderPatch {
    Status(OrderStatus),
    Rating(u8),
}
