// src/state.rs
use std::sync::Arc;
use tracing;

use crate::errors::KestrelResult;
use crate::models::geo::{Coordinate, CITY_CENTER};
use crate::services::channel::{FirebaseOrderChannel, MockOrderChannel, OrderChannel};
use crate::services::lifecycle::RideFlow;
use crate::services::store::{
    FavoritesStore, HistoryStore, MemoryFavoritesStore, MemoryHistoryStore, RedisStore,
};
use crate::utils::ids::{IdGenerator, IdType};

#[derive(Clone)]
pub struct AppConfig {
    pub firebase_url: Option<String>,
    pub redis_url: Option<String>,
    pub user_id: String,
    pub city_center: Coordinate,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            firebase_url: std::env::var("FIREBASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            user_id: std::env::var("KESTREL_USER_ID")
                .unwrap_or_else(|_| IdGenerator::generate(IdType::User)),
            city_center: CITY_CENTER,
        }
    }
}

pub struct AppState {
    pub channel: Arc<dyn OrderChannel>,
    pub history: Arc<dyn HistoryStore>,
    pub favorites: Arc<dyn FavoritesStore>,
    pub flow: RideFlow,
    pub config: AppConfig,
}

impl AppState {
    pub async fn new(config: AppConfig) -> KestrelResult<Self> {
        let channel: Arc<dyn OrderChannel> = match &config.firebase_url {
            Some(url) => Arc::new(FirebaseOrderChannel::new(url)?),
            None => {
                tracing::warn!("FIREBASE_URL not set, using in-memory order channel");
                Arc::new(MockOrderChannel::new())
            }
        };
        Self::with_channel(channel, config)
    }

    /// Wiring entry point for callers that bring their own channel (tests,
    /// the demo binary).
    pub fn with_channel(channel: Arc<dyn OrderChannel>, config: AppConfig) -> KestrelResult<Self> {
        let history: Arc<dyn HistoryStore>;
        let favorites: Arc<dyn FavoritesStore>;
        match &config.redis_url {
            Some(url) => {
                let store = Arc::new(RedisStore::new(url)?);
                history = store.clone();
                favorites = store;
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory stores");
                history = Arc::new(MemoryHistoryStore::new());
                favorites = Arc::new(MemoryFavoritesStore::new());
            }
        }

        let flow = RideFlow::new(
            channel.clone(),
            history.clone(),
            config.user_id.clone(),
            config.city_center,
        );

        Ok(Self {
            channel,
            history,
            favorites,
            flow,
            config,
        })
    }
}
