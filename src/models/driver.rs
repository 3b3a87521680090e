// src/models/driver.rs
use serde::{Deserialize, Serialize};

use crate::models::geo::Coordinate;
use crate::models::order::Tariff;

/// Snapshot of an available driver pushed by the remote channel for map
/// display. Ephemeral: never persisted, replaced wholesale on every update.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NearbyDriver {
    pub id: String,
    pub name: String,
    pub car_model: String,
    pub car_plate: String,
    pub position: Coordinate,
    pub tariff: Tariff,
    pub rating: f64,
    pub is_available: bool,
}
