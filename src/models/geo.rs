// src/models/geo.rs
use serde::{Deserialize, Serialize};

/// A point in WGS84 degrees. Plain value type, freely copied.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Central square of Glazov (Lenina avenue). Used as the fallback point when
/// an address has no resolved coordinate.
pub const CITY_CENTER: Coordinate = Coordinate::new(58.1387, 52.6584);

/// City districts, matched by coordinate bounding boxes. Business fields
/// only; display names live in the UI layer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum District {
    Center,
    Goncharka,
    Mashzavod,
    Torfozavod,
    Oktyabrsky,
    Zvezdny,
    Sloboda,
    Other,
}

impl District {
    pub fn containing(point: Coordinate) -> District {
        let Coordinate { lat, lng } = point;
        match (lat, lng) {
            _ if (58.135..=58.145).contains(&lat) && (52.650..=52.670).contains(&lng) => {
                District::Center
            }
            _ if (58.125..=58.135).contains(&lat) && (52.640..=52.660).contains(&lng) => {
                District::Goncharka
            }
            _ if (58.145..=58.160).contains(&lat) && (52.670..=52.700).contains(&lng) => {
                District::Mashzavod
            }
            _ if (58.120..=58.130).contains(&lat) && (52.620..=52.640).contains(&lng) => {
                District::Torfozavod
            }
            _ if (58.130..=58.140).contains(&lat) && (52.680..=52.710).contains(&lng) => {
                District::Oktyabrsky
            }
            _ if (58.150..=58.165).contains(&lat) && (52.640..=52.660).contains(&lng) => {
                District::Zvezdny
            }
            _ if (58.110..=58.125).contains(&lat) && (52.650..=52.670).contains(&lng) => {
                District::Sloboda
            }
            _ => District::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_center_is_in_center_district() {
        assert_eq!(District::containing(CITY_CENTER), District::Center);
    }

    #[test]
    fn test_far_away_point_is_other() {
        let moscow = Coordinate::new(55.7558, 37.6173);
        assert_eq!(District::containing(moscow), District::Other);
    }
}
