// src/services/registry.rs
//
// Authoritative in-memory index over trips, backed by the durable store.
// Every accepted transition is written to the store before it is committed
// to the index, so a crash never acknowledges state it cannot recover.
// Locking is per trip; cross-trip operations never serialize on each other.
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing;

use crate::errors::RideLinkError;
use crate::models::trip::{Page, PageRequest, Stop, Trip, TripFilter, TripState};
use crate::services::lifecycle::{self, TripEvent};
use crate::storage::StorageService;
use crate::utils::id_generator::{IdGenerator, IdType};

#[derive(Default)]
struct Indexes {
    trips: HashMap<String, Trip>,
    active_by_rider: HashMap<String, String>,
    active_by_driver: HashMap<String, String>,
}

pub struct TripRegistry {
    storage: Arc<StorageService>,
    // Index guards are scoped tightly and never held across the durable
    // write; per-trip mutexes order concurrent applies on one trip.
    indexes: RwLock<Indexes>,
    trip_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TripRegistry {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self {
            storage,
            indexes: RwLock::new(Indexes::default()),
            trip_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the in-memory indexes from the trips table after a restart.
    pub async fn load_from_store(&self) -> Result<usize, RideLinkError> {
        let trips = self.storage.all_trips().await?;
        let count = trips.len();
        let mut indexes = self.indexes.write().await;
        for trip in trips {
            if trip.is_active() {
                indexes.active_by_rider.insert(trip.rider_id.clone(), trip.id.clone());
                if let Some(driver_id) = &trip.driver_id {
                    indexes.active_by_driver.insert(driver_id.clone(), trip.id.clone());
                }
            }
            indexes.trips.insert(trip.id.clone(), trip);
        }
        tracing::info!("Recovered {} trips from store", count);
        Ok(count)
    }

    async fn trip_lock(&self, trip_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.trip_locks.lock().await;
        locks.entry(trip_id.to_string()).or_default().clone()
    }

    /// Create a Requested trip. Exactly one concurrent create per rider can
    /// win: the rider slot is reserved under the index write lock before the
    /// durable write happens.
    pub async fn create(&self, rider_id: &str, stops: Vec<Stop>) -> Result<Trip, RideLinkError> {
        if rider_id.is_empty() {
            return Err(RideLinkError::validation_error("rider_id", "must not be empty"));
        }
        if stops.len() < 2 {
            return Err(RideLinkError::validation_error(
                "stops",
                "a trip needs at least a pickup and a dropoff",
            ));
        }

        let now = Utc::now();
        let trip = Trip {
            id: IdGenerator::generate(IdType::Trip),
            rider_id: rider_id.to_string(),
            driver_id: None,
            state: TripState::Requested,
            stops,
            requested_at: now,
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            fare: None,
            rating: None,
            cancel_reason: None,
            updated_at: now,
        };

        // Reserve the rider slot before the durable write.
        {
            let mut indexes = self.indexes.write().await;
            if let Some(existing) = indexes.active_by_rider.get(rider_id) {
                return Err(RideLinkError::conflict(format!(
                    "rider {} already has active trip {}",
                    rider_id, existing
                )));
            }
            indexes.active_by_rider.insert(rider_id.to_string(), trip.id.clone());
        }

        if let Err(err) = self.storage.put_trip(&trip).await {
            self.indexes.write().await.active_by_rider.remove(rider_id);
            return Err(err);
        }

        self.indexes.write().await.trips.insert(trip.id.clone(), trip.clone());

        tracing::info!("Trip created: {} for rider {}", trip.id, trip.rider_id);
        Ok(trip)
    }

    pub async fn get(&self, trip_id: &str) -> Option<Trip> {
        self.indexes.read().await.trips.get(trip_id).cloned()
    }

    pub async fn active_for_rider(&self, rider_id: &str) -> Option<Trip> {
        let indexes = self.indexes.read().await;
        let trip_id = indexes.active_by_rider.get(rider_id)?;
        indexes.trips.get(trip_id).cloned()
    }

    pub async fn active_for_driver(&self, driver_id: &str) -> Option<Trip> {
        let indexes = self.indexes.read().await;
        let trip_id = indexes.active_by_driver.get(driver_id)?;
        indexes.trips.get(trip_id).cloned()
    }

    /// Validate and apply one lifecycle event, persisting the result before
    /// it becomes visible. Returns the updated trip.
    pub async fn apply(&self, trip_id: &str, event: TripEvent) -> Result<Trip, RideLinkError> {
        let lock = self.trip_lock(trip_id).await;
        let _guard = lock.lock().await;

        let mut trip = self
            .get(trip_id)
            .await
            .ok_or_else(|| RideLinkError::trip_not_found(trip_id))?;
        let now = Utc::now();

        lifecycle::apply_event(&mut trip, &event, now)?;

        // Accept must also hold the single-active-trip invariant for the
        // driver; the slot is reserved before the durable write.
        let mut reserved_driver: Option<String> = None;
        if let TripEvent::Accept { driver_id } = &event {
            let mut indexes = self.indexes.write().await;
            match indexes.active_by_driver.get(driver_id) {
                Some(existing) if existing != trip_id => {
                    return Err(RideLinkError::invalid_transition(
                        TripState::Requested,
                        format!("Accept: driver {} already on trip {}", driver_id, existing),
                    ));
                }
                _ => {
                    indexes.active_by_driver.insert(driver_id.clone(), trip_id.to_string());
                    reserved_driver = Some(driver_id.clone());
                }
            }
        }

        if let Err(err) = self.storage.put_trip(&trip).await {
            if let Some(driver_id) = reserved_driver {
                self.indexes.write().await.active_by_driver.remove(&driver_id);
            }
            tracing::error!("Durable write failed for trip {}: {}", trip_id, err);
            return Err(err);
        }

        {
            let mut indexes = self.indexes.write().await;
            if trip.state.is_terminal() {
                if indexes.active_by_rider.get(&trip.rider_id).map(String::as_str)
                    == Some(trip_id)
                {
                    indexes.active_by_rider.remove(&trip.rider_id);
                }
                if let Some(driver_id) = &trip.driver_id {
                    if indexes.active_by_driver.get(driver_id).map(String::as_str)
                        == Some(trip_id)
                    {
                        indexes.active_by_driver.remove(driver_id);
                    }
                }
            }
            indexes.trips.insert(trip.id.clone(), trip.clone());
        }

        tracing::info!("Trip {} -> {:?} ({})", trip_id, trip.state, event.name());
        Ok(trip)
    }

    /// Attach post-trip feedback to the trip record. Not a lifecycle
    /// transition; the feedback service owns the validation.
    pub async fn record_rating(&self, trip_id: &str, rating: u8) -> Result<Trip, RideLinkError> {
        let lock = self.trip_lock(trip_id).await;
        let _guard = lock.lock().await;

        let mut trip = self
            .get(trip_id)
            .await
            .ok_or_else(|| RideLinkError::trip_not_found(trip_id))?;
        trip.rating = Some(rating);
        trip.updated_at = Utc::now();

        self.storage.put_trip(&trip).await?;

        self.indexes.write().await.trips.insert(trip.id.clone(), trip.clone());
        Ok(trip)
    }

    pub async fn list(&self, filter: &TripFilter, page: PageRequest) -> Page<Trip> {
        let indexes = self.indexes.read().await;
        let mut matched: Vec<&Trip> = indexes
            .trips
            .values()
            .filter(|trip| {
                if let Some(rider_id) = &filter.rider_id {
                    if &trip.rider_id != rider_id {
                        return false;
                    }
                }
                if let Some(driver_id) = &filter.driver_id {
                    if trip.driver_id.as_ref() != Some(driver_id) {
                        return false;
                    }
                }
                if let Some(state) = filter.state {
                    if trip.state != state {
                        return false;
                    }
                }
                if filter.active_only && !trip.is_active() {
                    return false;
                }
                true
            })
            .collect();

        // Newest first; dashboards read the head of the list.
        matched.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();

        Page { items, offset: page.offset, limit: page.limit, total }
    }

    pub async fn list_active(&self, page: PageRequest) -> Page<Trip> {
        self.list(&TripFilter { active_only: true, ..Default::default() }, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{CancelReason, Fare};

    fn stops() -> Vec<Stop> {
        vec![
            Stop { latitude: 1.0, longitude: 1.0, address: "Pickup".to_string() },
            Stop { latitude: 2.0, longitude: 2.0, address: "Dropoff".to_string() },
        ]
    }

    fn registry() -> TripRegistry {
        TripRegistry::new(Arc::new(StorageService::memory()))
    }

    #[tokio::test]
    async fn test_create_rejects_second_active_trip_for_rider() {
        let registry = registry();
        let first = registry.create("rid-1", stops()).await.unwrap();
        assert_eq!(first.state, TripState::Requested);

        let second = registry.create("rid-1", stops()).await;
        assert!(matches!(second, Err(RideLinkError::Conflict(_))));

        // A terminal trip frees the rider slot.
        registry
            .apply(&first.id, TripEvent::Cancel { reason: CancelReason::RiderRequest })
            .await
            .unwrap();
        assert!(registry.create("rid-1", stops()).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_creates_exactly_one_wins() {
        let registry = Arc::new(registry());
        let a = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.create("rid-42", stops()).await })
        };
        let b = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.create("rid-42", stops()).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|result| result.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|result| matches!(result, Err(RideLinkError::Conflict(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn test_accept_assigns_driver_and_indexes_it() {
        let registry = registry();
        let trip = registry.create("rid-42", stops()).await.unwrap();

        let accepted = registry
            .apply(&trip.id, TripEvent::Accept { driver_id: "drv-7".to_string() })
            .await
            .unwrap();
        assert_eq!(accepted.state, TripState::Accepted);
        assert_eq!(accepted.driver_id.as_deref(), Some("drv-7"));

        let active = registry.active_for_driver("drv-7").await.unwrap();
        assert_eq!(active.id, trip.id);
    }

    #[tokio::test]
    async fn test_second_accept_on_same_trip_fails() {
        let registry = registry();
        let trip = registry.create("rid-42", stops()).await.unwrap();
        registry
            .apply(&trip.id, TripEvent::Accept { driver_id: "drv-7".to_string() })
            .await
            .unwrap();

        let second = registry
            .apply(&trip.id, TripEvent::Accept { driver_id: "drv-9".to_string() })
            .await;
        assert!(matches!(second, Err(RideLinkError::InvalidTransition { .. })));

        // The losing driver never entered the active index.
        assert!(registry.active_for_driver("drv-9").await.is_none());
    }

    #[tokio::test]
    async fn test_driver_with_active_trip_cannot_accept_another() {
        let registry = registry();
        let first = registry.create("rid-1", stops()).await.unwrap();
        let second = registry.create("rid-2", stops()).await.unwrap();

        registry
            .apply(&first.id, TripEvent::Accept { driver_id: "drv-7".to_string() })
            .await
            .unwrap();

        let result = registry
            .apply(&second.id, TripEvent::Accept { driver_id: "drv-7".to_string() })
            .await;
        assert!(matches!(result, Err(RideLinkError::InvalidTransition { .. })));

        // The second trip is untouched.
        assert_eq!(registry.get(&second.id).await.unwrap().state, TripState::Requested);
    }

    #[tokio::test]
    async fn test_terminal_state_clears_active_indexes() {
        let registry = registry();
        let trip = registry.create("rid-42", stops()).await.unwrap();
        registry
            .apply(&trip.id, TripEvent::Accept { driver_id: "drv-7".to_string() })
            .await
            .unwrap();
        registry.apply(&trip.id, TripEvent::MarkArrived).await.unwrap();
        registry.apply(&trip.id, TripEvent::StartTrip).await.unwrap();
        registry
            .apply(
                &trip.id,
                TripEvent::EndTrip { fare: Fare { amount: 12.5, currency: "USD".to_string() } },
            )
            .await
            .unwrap();

        assert!(registry.active_for_rider("rid-42").await.is_none());
        assert!(registry.active_for_driver("drv-7").await.is_none());
        // History is retained.
        assert_eq!(registry.get(&trip.id).await.unwrap().state, TripState::Ended);
    }

    #[tokio::test]
    async fn test_recovery_rebuilds_active_indexes() {
        let storage = Arc::new(StorageService::memory());
        let registry = TripRegistry::new(Arc::clone(&storage));
        let trip = registry.create("rid-42", stops()).await.unwrap();
        registry
            .apply(&trip.id, TripEvent::Accept { driver_id: "drv-7".to_string() })
            .await
            .unwrap();

        // Fresh registry over the same store, as after a crash.
        let recovered = TripRegistry::new(storage);
        let count = recovered.load_from_store().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(recovered.active_for_rider("rid-42").await.unwrap().id, trip.id);
        assert_eq!(recovered.active_for_driver("drv-7").await.unwrap().id, trip.id);
    }

    #[tokio::test]
    async fn test_list_pagination_bounds() {
        let registry = registry();
        for i in 0..5 {
            registry.create(&format!("rid-{}", i), stops()).await.unwrap();
        }

        let page = registry.list_active(PageRequest { offset: 0, limit: 2 }).await;
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);

        let tail = registry.list_active(PageRequest { offset: 4, limit: 2 }).await;
        assert_eq!(tail.items.len(), 1);
    }
}
