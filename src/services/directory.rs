// src/services/directory.rs
//
// Read-only fan-out over the registry, location store and driver service
// for dashboards and client listings. No snapshot stability is promised
// across pages; this surface never feeds the relay.
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::RideLinkError;
use crate::models::location::LocationFix;
use crate::models::trip::{Page, PageRequest, Trip, TripFilter, TripResponse};
use crate::services::location_store::LocationStore;
use crate::services::matching::AssignmentPolicy;
use crate::services::driver_service::DriverService;
use crate::services::registry::TripRegistry;

pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

pub struct DirectoryService {
    registry: Arc<TripRegistry>,
    locations: Arc<LocationStore>,
    drivers: Arc<DriverService>,
    assignment: Arc<dyn AssignmentPolicy>,
    max_page_size: usize,
}

impl DirectoryService {
    pub fn new(
        registry: Arc<TripRegistry>,
        locations: Arc<LocationStore>,
        drivers: Arc<DriverService>,
        assignment: Arc<dyn AssignmentPolicy>,
        max_page_size: usize,
    ) -> Self {
        Self { registry, locations, drivers, assignment, max_page_size }
    }

    /// Limits are clamped, never rejected; a zero limit falls back to the
    /// default page size.
    pub fn clamp(&self, page: PageRequest) -> PageRequest {
        let limit = if page.limit == 0 {
            PageRequest::default().limit
        } else {
            page.limit.min(self.max_page_size)
        };
        PageRequest { offset: page.offset, limit }
    }

    fn to_page(page: Page<Trip>) -> Page<TripResponse> {
        Page {
            items: page.items.into_iter().map(TripResponse::from).collect(),
            offset: page.offset,
            limit: page.limit,
            total: page.total,
        }
    }

    pub async fn all_trips(&self, page: PageRequest) -> Page<TripResponse> {
        let page = self.clamp(page);
        Self::to_page(self.registry.list(&TripFilter::default(), page).await)
    }

    pub async fn active_trips(&self, page: PageRequest) -> Page<TripResponse> {
        let page = self.clamp(page);
        Self::to_page(self.registry.list_active(page).await)
    }

    pub async fn trips_for_rider(&self, rider_id: &str, page: PageRequest) -> Page<TripResponse> {
        let page = self.clamp(page);
        let filter = TripFilter { rider_id: Some(rider_id.to_string()), ..Default::default() };
        Self::to_page(self.registry.list(&filter, page).await)
    }

    pub async fn trips_for_driver(&self, driver_id: &str, page: PageRequest) -> Page<TripResponse> {
        let page = self.clamp(page);
        let filter = TripFilter { driver_id: Some(driver_id.to_string()), ..Default::default() };
        Self::to_page(self.registry.list(&filter, page).await)
    }

    pub async fn trip(&self, trip_id: &str) -> Result<TripResponse, RideLinkError> {
        self.registry
            .get(trip_id)
            .await
            .map(TripResponse::from)
            .ok_or_else(|| RideLinkError::trip_not_found(trip_id))
    }

    pub async fn active_trip_for_rider(&self, rider_id: &str) -> Option<TripResponse> {
        self.registry.active_for_rider(rider_id).await.map(TripResponse::from)
    }

    pub async fn active_trip_for_driver(&self, driver_id: &str) -> Option<TripResponse> {
        self.registry.active_for_driver(driver_id).await.map(TripResponse::from)
    }

    pub async fn driver_locations(&self) -> HashMap<String, LocationFix> {
        self.locations.current_all().await
    }

    pub async fn driver_history(
        &self,
        driver_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<LocationFix> {
        self.locations.history(driver_id, from, to).await
    }

    /// Dispatch aid: run the injected assignment policy against a requested
    /// trip. Purely advisory; acceptance stays driver-initiated.
    pub async fn candidate_for_trip(
        &self,
        trip_id: &str,
    ) -> Result<Option<String>, RideLinkError> {
        let trip = self
            .registry
            .get(trip_id)
            .await
            .ok_or_else(|| RideLinkError::trip_not_found(trip_id))?;
        let candidates = self.drivers.assignment_candidates().await?;
        Ok(self.assignment.propose(&trip, &candidates))
    }
}
