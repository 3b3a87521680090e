// src/services/store.rs
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing;

use crate::models::history::{FavoriteAddress, RideHistoryRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store query error: {0}")]
    Query(String),

    #[error("store serialization error: {0}")]
    Serialization(String),
}

/// Ride history: an append-style log of terminated orders, keyed by order id
/// with insert-or-replace semantics and newest-first reads.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert_or_replace(&self, record: &RideHistoryRecord) -> Result<(), StoreError>;
    async fn all(&self) -> Result<Vec<RideHistoryRecord>, StoreError>;
    async fn recent(&self, limit: usize) -> Result<Vec<RideHistoryRecord>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<RideHistoryRecord>, StoreError>;
    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Favorite addresses: unique by id, listed in label order.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn insert_or_replace(&self, address: &FavoriteAddress) -> Result<(), StoreError>;
    async fn all(&self) -> Result<Vec<FavoriteAddress>, StoreError>;
    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
}

const HISTORY_KEY: &str = "ride_history";
const FAVORITES_KEY: &str = "favorite_addresses";

/// Redis-backed persistence. Records live as JSON values in one hash per
/// store; ordering is applied on read (the data sets are per-user small).
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, StoreError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn hash_insert<T: serde::Serialize>(
        &self,
        key: &str,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("HSET")
            .arg(key)
            .arg(id)
            .arg(json)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn hash_values<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = redis::cmd("HVALS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        raw.iter()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn hash_get<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(id)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn hash_delete(&self, key: &str, id: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("HDEL")
            .arg(key)
            .arg(id)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn hash_len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("HLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl HistoryStore for RedisStore {
    async fn insert_or_replace(&self, record: &RideHistoryRecord) -> Result<(), StoreError> {
        tracing::debug!("Archiving ride {} to redis", record.id);
        self.hash_insert(HISTORY_KEY, &record.id, record).await
    }

    async fn all(&self) -> Result<Vec<RideHistoryRecord>, StoreError> {
        let mut records: Vec<RideHistoryRecord> = self.hash_values(HISTORY_KEY).await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RideHistoryRecord>, StoreError> {
        let mut records = HistoryStore::all(self).await?;
        records.truncate(limit);
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<RideHistoryRecord>, StoreError> {
        self.hash_get(HISTORY_KEY, id).await
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.hash_delete(HISTORY_KEY, id).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.hash_len(HISTORY_KEY).await
    }
}

#[async_trait]
impl FavoritesStore for RedisStore {
    async fn insert_or_replace(&self, address: &FavoriteAddress) -> Result<(), StoreError> {
        self.hash_insert(FAVORITES_KEY, &address.id, address).await
    }

    async fn all(&self) -> Result<Vec<FavoriteAddress>, StoreError> {
        let mut addresses: Vec<FavoriteAddress> = self.hash_values(FAVORITES_KEY).await?;
        addresses.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(addresses)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.hash_delete(FAVORITES_KEY, id).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.hash_len(FAVORITES_KEY).await
    }
}

/// Memory store for development and testing.
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<String, RideHistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert_or_replace(&self, record: &RideHistoryRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<RideHistoryRecord>, StoreError> {
        let mut records: Vec<RideHistoryRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RideHistoryRecord>, StoreError> {
        let mut records = self.all().await?;
        records.truncate(limit);
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<RideHistoryRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.len())
    }
}

pub struct MemoryFavoritesStore {
    addresses: RwLock<HashMap<String, FavoriteAddress>>,
}

impl MemoryFavoritesStore {
    pub fn new() -> Self {
        Self {
            addresses: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryFavoritesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FavoritesStore for MemoryFavoritesStore {
    async fn insert_or_replace(&self, address: &FavoriteAddress) -> Result<(), StoreError> {
        self.addresses
            .write()
            .await
            .insert(address.id.clone(), address.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<FavoriteAddress>, StoreError> {
        let mut addresses: Vec<FavoriteAddress> =
            self.addresses.read().await.values().cloned().collect();
        addresses.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(addresses)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.addresses.write().await.remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.addresses.read().await.len())
    }
}
