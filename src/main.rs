use std::sync::Arc;
use std::time::Duration;

use kestrel_ride::models::driver::NearbyDriver;
use kestrel_ride::models::geo::{Coordinate, CITY_CENTER};
use kestrel_ride::models::history::FavoriteAddress;
use kestrel_ride::models::order::{AssignedDriver, OrderStatus, Tariff};
use kestrel_ride::services::channel::MockOrderChannel;
use kestrel_ride::services::map::{LoggingMapSurface, MapController};
use kestrel_ride::state::{AppConfig, AppState};
use kestrel_ride::utils::ids::{IdGenerator, IdType};
use kestrel_ride::RideState;

/// Drives one simulated ride end to end against the in-memory collaborators:
/// compose a draft, submit, follow the dispatcher's status updates through
/// completion, rate, then print the archived history.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();
    let channel = Arc::new(MockOrderChannel::new());
    channel.seed_drivers(demo_drivers()).await;

    let state = AppState::with_channel(channel.clone(), config).unwrap();

    let map = MapController::new(Arc::new(LoggingMapSurface), channel.clone());
    map.start().await;

    state
        .favorites
        .insert_or_replace(&FavoriteAddress::new("Home", "pr. Lenina 1", CITY_CENTER))
        .await
        .unwrap();

    let flow = &state.flow;
    flow.set_pickup("pr. Lenina 1", Some(Coordinate::new(58.1387, 52.6584)))
        .await;
    flow.set_dropoff("ul. Kirova 20", Some(Coordinate::new(58.1400, 52.6700)))
        .await;
    flow.set_tariff(Tariff::Comfort).await;

    let draft = flow.draft().await;
    println!(
        "Estimate: {} rub for {:.2} km, ~{} min",
        draft.estimated_price(),
        draft.estimated_distance_km(),
        draft.estimated_duration_min()
    );

    let order_id = flow.submit().await.unwrap();

    // Simulated dispatcher: a driver takes the order and runs the ride.
    {
        let channel = channel.clone();
        let order_id = order_id.clone();
        tokio::spawn(async move {
            let driver = AssignedDriver {
                name: "Ivan K.".to_string(),
                phone: "+79120000001".to_string(),
                car_model: "Lada Vesta".to_string(),
                car_plate: "A123BC18".to_string(),
            };
            for (delay_ms, status, driver) in [
                (300, OrderStatus::Accepted, Some(driver)),
                (300, OrderStatus::Arriving, None),
                (300, OrderStatus::InProgress, None),
                (500, OrderStatus::Completed, None),
            ] {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                channel
                    .simulate_status(&order_id, status, driver)
                    .await
                    .unwrap();
            }
        });
    }

    let mut states = flow.watch_state();
    loop {
        states.changed().await.unwrap();
        let current = states.borrow().clone();
        if matches!(current, RideState::Completed { .. }) {
            break;
        }
    }

    flow.rate(5).await.unwrap();
    map.stop().await;

    println!("Ride history:");
    for ride in state.history.all().await.unwrap() {
        println!(
            "  {} -> {} | {} rub, {:.2} km, {} min",
            ride.pickup_address, ride.dropoff_address, ride.price, ride.distance_km,
            ride.duration_min
        );
    }
}

fn demo_drivers() -> Vec<NearbyDriver> {
    [
        ("Ivan K.", "Lada Vesta", "A123BC18", 58.1400, 52.6600, Tariff::Economy, 4.8),
        ("Sergey M.", "Kia Rio", "B456UD18", 58.1370, 52.6550, Tariff::Comfort, 4.9),
        ("Alexey P.", "Toyota Camry", "C789EA18", 58.1420, 52.6520, Tariff::Business, 5.0),
        ("Nikolay R.", "Lada Granta", "E321KM18", 58.1360, 52.6610, Tariff::Economy, 4.7),
    ]
    .into_iter()
    .map(|(name, car_model, car_plate, lat, lng, tariff, rating)| NearbyDriver {
        id: IdGenerator::generate(IdType::Driver),
        name: name.to_string(),
        car_model: car_model.to_string(),
        car_plate: car_plate.to_string(),
        position: Coordinate::new(lat, lng),
        tariff,
        rating,
        is_available: true,
    })
    .collect()
}
