// src/services/map.rs
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing;

use crate::models::driver::NearbyDriver;
use crate::models::geo::{Coordinate, District, CITY_CENTER};
use crate::services::channel::OrderChannel;

/// Rendering contract for whatever draws the map. The core pushes a center
/// point and driver markers and receives tapped coordinates; everything else
/// about rendering is the surface's business.
pub trait MapSurface: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn set_center(&self, center: Coordinate);
    fn render_drivers(&self, drivers: &[NearbyDriver]);
}

/// Owns an injected surface handle with an explicit start/stop lifecycle and
/// feeds it the nearby-driver stream while started. Taps reported by the
/// surface integration are re-broadcast to whoever composes addresses.
pub struct MapController {
    surface: Arc<dyn MapSurface>,
    channel: Arc<dyn OrderChannel>,
    center: Mutex<Coordinate>,
    feed: Mutex<Option<JoinHandle<()>>>,
    tap_tx: broadcast::Sender<Coordinate>,
}

impl MapController {
    pub fn new(surface: Arc<dyn MapSurface>, channel: Arc<dyn OrderChannel>) -> Self {
        let (tap_tx, _) = broadcast::channel(16);
        Self {
            surface,
            channel,
            center: Mutex::new(CITY_CENTER),
            feed: Mutex::new(None),
            tap_tx,
        }
    }

    pub async fn start(&self) {
        let mut feed = self.feed.lock().await;
        if feed.is_some() {
            return;
        }

        self.surface.start();
        self.surface.set_center(*self.center.lock().await);

        let surface = Arc::clone(&self.surface);
        let channel = Arc::clone(&self.channel);
        *feed = Some(tokio::spawn(async move {
            let mut updates = match channel.nearby_drivers().await {
                Ok(updates) => updates,
                Err(err) => {
                    tracing::warn!("Nearby-driver feed unavailable: {}", err);
                    return;
                }
            };
            while let Some(update) = updates.next().await {
                match update {
                    Ok(drivers) => surface.render_drivers(&drivers),
                    Err(err) => {
                        tracing::warn!("Nearby-driver feed broke: {}", err);
                        break;
                    }
                }
            }
        }));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.feed.lock().await.take() {
            handle.abort();
        }
        self.surface.stop();
    }

    pub async fn set_center(&self, center: Coordinate) {
        *self.center.lock().await = center;
        self.surface.set_center(center);
    }

    pub async fn center(&self) -> Coordinate {
        *self.center.lock().await
    }

    pub async fn center_district(&self) -> District {
        District::containing(*self.center.lock().await)
    }

    /// Called by the surface integration when the user taps the map.
    pub fn report_tap(&self, point: Coordinate) {
        let _ = self.tap_tx.send(point);
    }

    pub fn taps(&self) -> broadcast::Receiver<Coordinate> {
        self.tap_tx.subscribe()
    }
}

/// Surface that only logs, for headless runs.
pub struct LoggingMapSurface;

impl MapSurface for LoggingMapSurface {
    fn start(&self) {
        tracing::info!("[MAP] surface started");
    }

    fn stop(&self) {
        tracing::info!("[MAP] surface stopped");
    }

    fn set_center(&self, center: Coordinate) {
        tracing::debug!("[MAP] center moved to {:.4}, {:.4}", center.lat, center.lng);
    }

    fn render_drivers(&self, drivers: &[NearbyDriver]) {
        tracing::debug!("[MAP] rendering {} drivers", drivers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::Tariff;
    use crate::services::channel::MockOrderChannel;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSurface {
        started: StdMutex<bool>,
        rendered: StdMutex<Vec<Vec<NearbyDriver>>>,
        centers: StdMutex<Vec<Coordinate>>,
    }

    impl MapSurface for RecordingSurface {
        fn start(&self) {
            *self.started.lock().unwrap() = true;
        }

        fn stop(&self) {
            *self.started.lock().unwrap() = false;
        }

        fn set_center(&self, center: Coordinate) {
            self.centers.lock().unwrap().push(center);
        }

        fn render_drivers(&self, drivers: &[NearbyDriver]) {
            self.rendered.lock().unwrap().push(drivers.to_vec());
        }
    }

    fn sample_driver() -> NearbyDriver {
        NearbyDriver {
            id: "drv-260807-aaaaaa".to_string(),
            name: "Ivan K.".to_string(),
            car_model: "Lada Vesta".to_string(),
            car_plate: "A123BC18".to_string(),
            position: Coordinate::new(58.1400, 52.6600),
            tariff: Tariff::Economy,
            rating: 4.8,
            is_available: true,
        }
    }

    #[tokio::test]
    async fn test_feed_renders_seeded_drivers() {
        let channel = Arc::new(MockOrderChannel::new());
        channel.seed_drivers(vec![sample_driver()]).await;
        let surface = Arc::new(RecordingSurface::default());
        let controller = MapController::new(surface.clone(), channel);

        controller.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(*surface.started.lock().unwrap());
        let rendered = surface.rendered.lock().unwrap().clone();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0][0].name, "Ivan K.");

        controller.stop().await;
        assert!(!*surface.started.lock().unwrap());
    }

    #[tokio::test]
    async fn test_taps_reach_subscribers() {
        let channel = Arc::new(MockOrderChannel::new());
        let surface = Arc::new(RecordingSurface::default());
        let controller = MapController::new(surface, channel);

        let mut taps = controller.taps();
        let point = Coordinate::new(58.1395, 52.6612);
        controller.report_tap(point);
        assert_eq!(taps.recv().await.unwrap(), point);
    }

    #[tokio::test]
    async fn test_center_district_tracks_center() {
        let channel = Arc::new(MockOrderChannel::new());
        let surface = Arc::new(RecordingSurface::default());
        let controller = MapController::new(surface, channel);

        assert_eq!(controller.center_district().await, District::Center);
        controller
            .set_center(Coordinate::new(58.155, 52.680))
            .await;
        assert_eq!(controller.center_district().await, District::Mashzavod);
    }
}
