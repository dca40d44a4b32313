// src/storage.rs
//
// Durable store behind the registry, driver service and location store.
// The core only needs a key-value map and a per-key append log; both a
// Redis backend and an in-memory backend (tests, local dev) live behind
// the same enum and are selected by configuration.
use async_trait::async_trait;
use redis::Client;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::RideLinkError;
use crate::models::driver::Driver;
use crate::models::feedback::FeedbackRecord;
use crate::models::location::LocationFix;
use crate::models::trip::Trip;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for RideLinkError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Connection(msg) => RideLinkError::StoreConnection(msg),
            StoreError::Operation(msg) => RideLinkError::StoreQuery(msg),
            StoreError::Serialization(msg) => RideLinkError::StoreSerialization(msg),
        }
    }
}

// ------------------------------
// Traits (key-value / append-log)
// ------------------------------

#[async_trait]
pub trait KeyValueOps: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait AppendLogOps: Send + Sync {
    async fn append(&self, key: &str, entry: String) -> Result<(), StoreError>;
    async fn entries(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

// Enum to wrap the two backends
pub enum Store {
    Redis(RedisStore),
    Memory(MemoryStore),
}

// ------------------------------
// Redis backend
// ------------------------------

pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, StoreError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KeyValueOps for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let data: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(data)
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(keys)
    }
}

#[async_trait]
impl AppendLogOps for RedisStore {
    async fn append(&self, key: &str, entry: String) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("RPUSH")
            .arg(key)
            .arg(entry)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn entries(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(entries)
    }
}

// ------------------------------
// In-memory backend
// ------------------------------

#[derive(Default)]
pub struct MemoryStore {
    kv: RwLock<HashMap<String, String>>,
    logs: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueOps for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.kv.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.kv.write().await.remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .kv
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AppendLogOps for MemoryStore {
    async fn append(&self, key: &str, entry: String) -> Result<(), StoreError> {
        self.logs
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn entries(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.logs.read().await.get(key).cloned().unwrap_or_default())
    }
}

// ------------------------------
// Enum delegations
// ------------------------------

#[async_trait]
impl KeyValueOps for Store {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Store::Redis(store) => store.get_raw(key).await,
            Store::Memory(store) => store.get_raw(key).await,
        }
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        match self {
            Store::Redis(store) => store.set_raw(key, value).await,
            Store::Memory(store) => store.set_raw(key, value).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Store::Redis(store) => store.delete(key).await,
            Store::Memory(store) => store.delete(key).await,
        }
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Store::Redis(store) => store.scan(prefix).await,
            Store::Memory(store) => store.scan(prefix).await,
        }
    }
}

#[async_trait]
impl AppendLogOps for Store {
    async fn append(&self, key: &str, entry: String) -> Result<(), StoreError> {
        match self {
            Store::Redis(store) => store.append(key, entry).await,
            Store::Memory(store) => store.append(key, entry).await,
        }
    }

    async fn entries(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Store::Redis(store) => store.entries(key).await,
            Store::Memory(store) => store.entries(key).await,
        }
    }
}

// Key builders for the persisted tables
pub struct StoreKeys;

impl StoreKeys {
    pub fn trip(trip_id: &str) -> String {
        format!("trip:{}", trip_id)
    }

    pub fn trip_prefix() -> &'static str {
        "trip:"
    }

    pub fn driver(driver_id: &str) -> String {
        format!("driver:id:{}", driver_id)
    }

    pub fn driver_prefix() -> &'static str {
        "driver:id:"
    }

    pub fn driver_by_mobile(mobile: &str) -> String {
        format!("driver:mobile:{}", mobile)
    }

    pub fn location_history(driver_id: &str) -> String {
        format!("loc:hist:{}", driver_id)
    }

    pub fn current_fix(driver_id: &str) -> String {
        format!("loc:cur:{}", driver_id)
    }

    pub fn feedback(trip_id: &str) -> String {
        format!("feedback:{}", trip_id)
    }
}

// ------------------------------
// Typed wrapper used by services
// ------------------------------

pub struct StorageService {
    store: Store,
}

impl StorageService {
    pub fn redis(redis_url: &str) -> Result<Self, RideLinkError> {
        Ok(Self { store: Store::Redis(RedisStore::new(redis_url)?) })
    }

    pub fn memory() -> Self {
        Self { store: Store::Memory(MemoryStore::new()) }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RideLinkError> {
        match self.store.get_raw(key).await? {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), RideLinkError> {
        let json = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.set_raw(key, json).await?;
        Ok(())
    }

    // Trips table
    pub async fn put_trip(&self, trip: &Trip) -> Result<(), RideLinkError> {
        self.set_json(&StoreKeys::trip(&trip.id), trip).await
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>, RideLinkError> {
        self.get_json(&StoreKeys::trip(trip_id)).await
    }

    pub async fn all_trips(&self) -> Result<Vec<Trip>, RideLinkError> {
        let keys = self.store.scan(StoreKeys::trip_prefix()).await?;
        let mut trips = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(trip) = self.get_json::<Trip>(&key).await? {
                trips.push(trip);
            }
        }
        Ok(trips)
    }

    // Drivers table plus mobile-number secondary index
    pub async fn put_driver(&self, driver: &Driver) -> Result<(), RideLinkError> {
        self.set_json(&StoreKeys::driver(&driver.id), driver).await?;
        self.store
            .set_raw(&StoreKeys::driver_by_mobile(&driver.mobile_number), driver.id.clone())
            .await?;
        Ok(())
    }

    pub async fn get_driver(&self, driver_id: &str) -> Result<Option<Driver>, RideLinkError> {
        self.get_json(&StoreKeys::driver(driver_id)).await
    }

    pub async fn driver_id_by_mobile(
        &self,
        mobile: &str,
    ) -> Result<Option<String>, RideLinkError> {
        Ok(self.store.get_raw(&StoreKeys::driver_by_mobile(mobile)).await?)
    }

    pub async fn delete_driver(&self, driver: &Driver) -> Result<(), RideLinkError> {
        self.store.delete(&StoreKeys::driver(&driver.id)).await?;
        self.store
            .delete(&StoreKeys::driver_by_mobile(&driver.mobile_number))
            .await?;
        Ok(())
    }

    pub async fn drop_mobile_index(&self, mobile: &str) -> Result<(), RideLinkError> {
        self.store.delete(&StoreKeys::driver_by_mobile(mobile)).await?;
        Ok(())
    }

    pub async fn all_drivers(&self) -> Result<Vec<Driver>, RideLinkError> {
        let keys = self.store.scan(StoreKeys::driver_prefix()).await?;
        let mut drivers = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(driver) = self.get_json::<Driver>(&key).await? {
                drivers.push(driver);
            }
        }
        Ok(drivers)
    }

    // Location history append-log and current-fix side table
    pub async fn append_fix(&self, fix: &LocationFix) -> Result<(), RideLinkError> {
        let json = serde_json::to_string(fix)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .append(&StoreKeys::location_history(&fix.driver_id), json)
            .await?;
        Ok(())
    }

    pub async fn fix_history(&self, driver_id: &str) -> Result<Vec<LocationFix>, RideLinkError> {
        let entries = self
            .store
            .entries(&StoreKeys::location_history(driver_id))
            .await?;
        let mut fixes = Vec::with_capacity(entries.len());
        for entry in entries {
            let fix = serde_json::from_str(&entry)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            fixes.push(fix);
        }
        Ok(fixes)
    }

    pub async fn put_current_fix(&self, fix: &LocationFix) -> Result<(), RideLinkError> {
        self.set_json(&StoreKeys::current_fix(&fix.driver_id), fix).await
    }

    // Feedback table
    pub async fn put_feedback(&self, record: &FeedbackRecord) -> Result<(), RideLinkError> {
        self.set_json(&StoreKeys::feedback(&record.trip_id), record).await
    }

    pub async fn get_feedback(
        &self,
        trip_id: &str,
    ) -> Result<Option<FeedbackRecord>, RideLinkError> {
        self.get_json(&StoreKeys::feedback(trip_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_kv_roundtrip() {
        let store = MemoryStore::new();
        store.set_raw("trip:a", "1".to_string()).await.unwrap();
        store.set_raw("trip:b", "2".to_string()).await.unwrap();
        store.set_raw("driver:c", "3".to_string()).await.unwrap();

        assert_eq!(store.get_raw("trip:a").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get_raw("missing").await.unwrap(), None);

        let mut keys = store.scan("trip:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["trip:a".to_string(), "trip:b".to_string()]);

        store.delete("trip:a").await.unwrap();
        assert_eq!(store.get_raw("trip:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_append_log_preserves_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.append("loc:hist:drv-1", format!("fix-{}", i)).await.unwrap();
        }
        let entries = store.entries("loc:hist:drv-1").await.unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], "fix-0");
        assert_eq!(entries[4], "fix-4");
    }
}
