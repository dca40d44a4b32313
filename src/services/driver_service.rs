// src/services/driver_service.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;

use crate::errors::RideLinkError;
use crate::models::driver::{
    Driver, DriverRegistration, DriverResponse, DriverState, DriverUpdate,
};
use crate::models::trip::{Page, PageRequest};
use crate::services::location_store::LocationStore;
use crate::services::matching::AssignmentCandidate;
use crate::services::registry::TripRegistry;
use crate::storage::StorageService;
use crate::utils::id_generator::{IdGenerator, IdType};

#[async_trait]
pub trait DriverOperations: Send + Sync {
    async fn register_driver(
        &self,
        registration: DriverRegistration,
    ) -> Result<DriverResponse, RideLinkError>;
    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverResponse>, RideLinkError>;
    async fn get_driver_by_mobile(
        &self,
        mobile: &str,
    ) -> Result<Option<DriverResponse>, RideLinkError>;
    async fn update_driver(
        &self,
        driver_id: &str,
        update: DriverUpdate,
    ) -> Result<DriverResponse, RideLinkError>;
    async fn delete_driver(&self, driver_id: &str) -> Result<(), RideLinkError>;
    async fn list_drivers(&self, page: PageRequest) -> Result<Page<DriverResponse>, RideLinkError>;
}

pub struct DriverService {
    storage: Arc<StorageService>,
    registry: Arc<TripRegistry>,
    locations: Arc<LocationStore>,
    // Connection lifecycle reported by the driver's own streams.
    connected: RwLock<HashMap<String, bool>>,
}

impl DriverService {
    pub fn new(
        storage: Arc<StorageService>,
        registry: Arc<TripRegistry>,
        locations: Arc<LocationStore>,
    ) -> Self {
        Self { storage, registry, locations, connected: RwLock::new(HashMap::new()) }
    }

    /// Called by the session layer when a driver's stream opens or closes.
    pub async fn set_connected(&self, driver_id: &str, connected: bool) {
        self.connected.write().await.insert(driver_id.to_string(), connected);
    }

    /// Derived state: OnTrip wins, then the connection lifecycle decides
    /// between Available (idle), Inactive (suspended) and Offline.
    pub async fn resolve_state(&self, driver: &Driver) -> DriverState {
        if self.registry.active_for_driver(&driver.id).await.is_some() {
            return DriverState::OnTrip;
        }
        let connected = self
            .connected
            .read()
            .await
            .get(&driver.id)
            .copied()
            .unwrap_or(false);
        match (connected, driver.suspended) {
            (true, false) => DriverState::Available,
            (true, true) => DriverState::Inactive,
            (false, _) => DriverState::Offline,
        }
    }

    async fn to_response(&self, driver: Driver) -> DriverResponse {
        let state = self.resolve_state(&driver).await;
        let current_location = self.locations.current_for(&driver.id).await;
        DriverResponse {
            id: driver.id,
            first_name: driver.first_name,
            last_name: driver.last_name,
            mobile_number: driver.mobile_number,
            vehicle_plate: driver.vehicle_plate,
            state,
            rating: driver.rating,
            total_trips: driver.total_trips,
            current_location,
        }
    }

    /// Everything the assignment policy needs to propose a driver.
    pub async fn assignment_candidates(&self) -> Result<Vec<AssignmentCandidate>, RideLinkError> {
        let drivers = self.storage.all_drivers().await?;
        let mut candidates = Vec::new();
        for driver in drivers {
            let Some(fix) = self.locations.current_for(&driver.id).await else {
                continue;
            };
            let state = self.resolve_state(&driver).await;
            candidates.push(AssignmentCandidate { driver_id: driver.id, fix, state });
        }
        Ok(candidates)
    }
}

#[async_trait]
impl DriverOperations for DriverService {
    async fn register_driver(
        &self,
        registration: DriverRegistration,
    ) -> Result<DriverResponse, RideLinkError> {
        if registration.mobile_number.is_empty() {
            return Err(RideLinkError::validation_error("mobile_number", "must not be empty"));
        }
        if registration.first_name.is_empty() {
            return Err(RideLinkError::validation_error("first_name", "must not be empty"));
        }

        if self
            .storage
            .driver_id_by_mobile(&registration.mobile_number)
            .await?
            .is_some()
        {
            return Err(RideLinkError::conflict(format!(
                "driver already registered with mobile {}",
                registration.mobile_number
            )));
        }

        let now = Utc::now();
        let driver = Driver {
            id: IdGenerator::generate(IdType::Driver),
            first_name: registration.first_name,
            last_name: registration.last_name,
            mobile_number: registration.mobile_number,
            vehicle_plate: registration.vehicle_plate,
            rating: 0.0,
            total_trips: 0,
            suspended: false,
            created_at: now,
            updated_at: now,
        };

        self.storage.put_driver(&driver).await?;
        tracing::info!("Driver registered: {}", driver.id);
        Ok(self.to_response(driver).await)
    }

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverResponse>, RideLinkError> {
        if !IdGenerator::validate_id(driver_id, Some(IdType::Driver)) {
            tracing::warn!("Invalid driver ID format: {}", driver_id);
            return Ok(None);
        }
        match self.storage.get_driver(driver_id).await? {
            Some(driver) => Ok(Some(self.to_response(driver).await)),
            None => Ok(None),
        }
    }

    async fn get_driver_by_mobile(
        &self,
        mobile: &str,
    ) -> Result<Option<DriverResponse>, RideLinkError> {
        let Some(driver_id) = self.storage.driver_id_by_mobile(mobile).await? else {
            return Ok(None);
        };
        match self.storage.get_driver(&driver_id).await? {
            Some(driver) => Ok(Some(self.to_response(driver).await)),
            None => Ok(None),
        }
    }

    async fn update_driver(
        &self,
        driver_id: &str,
        update: DriverUpdate,
    ) -> Result<DriverResponse, RideLinkError> {
        let mut driver = self
            .storage
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| RideLinkError::driver_not_found(driver_id))?;

        if let Some(mobile) = &update.mobile_number {
            if mobile != &driver.mobile_number {
                if self.storage.driver_id_by_mobile(mobile).await?.is_some() {
                    return Err(RideLinkError::conflict(format!(
                        "mobile {} already in use",
                        mobile
                    )));
                }
                self.storage.drop_mobile_index(&driver.mobile_number).await?;
                driver.mobile_number = mobile.clone();
            }
        }
        if let Some(first_name) = update.first_name {
            driver.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            driver.last_name = last_name;
        }
        if let Some(vehicle_plate) = update.vehicle_plate {
            driver.vehicle_plate = vehicle_plate;
        }
        if let Some(suspended) = update.suspended {
            driver.suspended = suspended;
        }
        driver.updated_at = Utc::now();

        self.storage.put_driver(&driver).await?;
        tracing::debug!("Driver updated: {}", driver.id);
        Ok(self.to_response(driver).await)
    }

    async fn delete_driver(&self, driver_id: &str) -> Result<(), RideLinkError> {
        let driver = self
            .storage
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| RideLinkError::driver_not_found(driver_id))?;

        if self.registry.active_for_driver(driver_id).await.is_some() {
            return Err(RideLinkError::conflict(format!(
                "driver {} has an active trip",
                driver_id
            )));
        }

        self.storage.delete_driver(&driver).await?;
        self.connected.write().await.remove(driver_id);
        tracing::info!("Driver deleted: {}", driver_id);
        Ok(())
    }

    async fn list_drivers(&self, page: PageRequest) -> Result<Page<DriverResponse>, RideLinkError> {
        let mut drivers = self.storage.all_drivers().await?;
        drivers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = drivers.len();
        let mut items = Vec::new();
        for driver in drivers.into_iter().skip(page.offset).take(page.limit) {
            items.push(self.to_response(driver).await);
        }
        Ok(Page { items, offset: page.offset, limit: page.limit, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::Stop;
    use crate::services::lifecycle::TripEvent;

    fn registration(mobile: &str) -> DriverRegistration {
        DriverRegistration {
            first_name: "Ama".to_string(),
            last_name: "Mensah".to_string(),
            mobile_number: mobile.to_string(),
            vehicle_plate: "GR-1234-20".to_string(),
        }
    }

    fn service() -> DriverService {
        let storage = Arc::new(StorageService::memory());
        let registry = Arc::new(TripRegistry::new(Arc::clone(&storage)));
        let locations = Arc::new(LocationStore::new(Arc::clone(&storage)));
        DriverService::new(storage, registry, locations)
    }

    #[tokio::test]
    async fn test_register_and_lookup_by_mobile() {
        let service = service();
        let created = service.register_driver(registration("+233201234567")).await.unwrap();
        assert!(created.id.starts_with("drv-"));

        let by_mobile = service.get_driver_by_mobile("+233201234567").await.unwrap().unwrap();
        assert_eq!(by_mobile.id, created.id);

        let duplicate = service.register_driver(registration("+233201234567")).await;
        assert!(matches!(duplicate, Err(RideLinkError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_moves_mobile_index() {
        let service = service();
        let created = service.register_driver(registration("+233200000001")).await.unwrap();

        service
            .update_driver(
                &created.id,
                DriverUpdate {
                    mobile_number: Some("+233200000002".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(service.get_driver_by_mobile("+233200000001").await.unwrap().is_none());
        assert!(service.get_driver_by_mobile("+233200000002").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_derived_state_follows_connection_and_trips() {
        let storage = Arc::new(StorageService::memory());
        let registry = Arc::new(TripRegistry::new(Arc::clone(&storage)));
        let locations = Arc::new(LocationStore::new(Arc::clone(&storage)));
        let service =
            DriverService::new(storage, Arc::clone(&registry), locations);

        let created = service.register_driver(registration("+233200000003")).await.unwrap();
        let driver = service.storage.get_driver(&created.id).await.unwrap().unwrap();

        assert_eq!(service.resolve_state(&driver).await, DriverState::Offline);

        service.set_connected(&created.id, true).await;
        assert_eq!(service.resolve_state(&driver).await, DriverState::Available);

        // A non-terminal trip overrides the connection state.
        let trip = registry
            .create(
                "rid-1",
                vec![
                    Stop { latitude: 1.0, longitude: 1.0, address: "A".to_string() },
                    Stop { latitude: 2.0, longitude: 2.0, address: "B".to_string() },
                ],
            )
            .await
            .unwrap();
        registry
            .apply(&trip.id, TripEvent::Accept { driver_id: created.id.clone() })
            .await
            .unwrap();
        assert_eq!(service.resolve_state(&driver).await, DriverState::OnTrip);

        service.set_connected(&created.id, false).await;
        // Still on the trip even while disconnected.
        assert_eq!(service.resolve_state(&driver).await, DriverState::OnTrip);
    }

    #[tokio::test]
    async fn test_suspended_driver_is_inactive_when_connected() {
        let service = service();
        let created = service.register_driver(registration("+233200000004")).await.unwrap();
        service
            .update_driver(
                &created.id,
                DriverUpdate { suspended: Some(true), ..Default::default() },
            )
            .await
            .unwrap();

        service.set_connected(&created.id, true).await;
        let driver = service.storage.get_driver(&created.id).await.unwrap().unwrap();
        assert_eq!(service.resolve_state(&driver).await, DriverState::Inactive);
    }
}
