// src/services/location_store.rs
//
// Live and historical driver positions. Ingestion volume is one fix every
// few seconds per active driver, so the map is split into fixed shards
// keyed by driver-id hash; writers for distinct drivers contend only when
// they land on the same shard, never on a store-wide lock.
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;

use crate::models::location::LocationFix;
use crate::storage::StorageService;

const SHARD_COUNT: usize = 16;

#[derive(Default)]
struct DriverTrack {
    current: Option<LocationFix>,
    // Kept ordered by recorded_at; in-order arrival appends at the tail.
    history: Vec<LocationFix>,
}

pub struct LocationStore {
    shards: Vec<RwLock<HashMap<String, DriverTrack>>>,
    storage: Arc<StorageService>,
}

impl LocationStore {
    pub fn new(storage: Arc<StorageService>) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, storage }
    }

    fn shard_for(&self, driver_id: &str) -> &RwLock<HashMap<String, DriverTrack>> {
        let mut hasher = DefaultHasher::new();
        driver_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Ingest one fix. Never fails on a valid fix; a fix outside lat/lng
    /// bounds is logged and discarded. Returns whether the fix was stored.
    ///
    /// History is append-only. The current-fix pointer only moves forward:
    /// a fix older than the one already held goes to history but does not
    /// become current.
    pub async fn ingest(&self, fix: LocationFix) -> bool {
        if !fix.in_bounds() {
            tracing::warn!(
                "Discarding out-of-range fix for driver {}: ({}, {})",
                fix.driver_id,
                fix.latitude,
                fix.longitude
            );
            return false;
        }

        let became_current;
        {
            let mut shard = self.shard_for(&fix.driver_id).write().await;
            let track = shard.entry(fix.driver_id.clone()).or_default();

            // In-order arrival is the hot path: plain push. Late fixes are
            // placed by binary search to keep the history sorted.
            match track.history.last() {
                Some(last) if last.recorded_at > fix.recorded_at => {
                    let index = track
                        .history
                        .partition_point(|entry| entry.recorded_at <= fix.recorded_at);
                    track.history.insert(index, fix.clone());
                }
                _ => track.history.push(fix.clone()),
            }

            became_current = match &track.current {
                Some(current) => fix.recorded_at >= current.recorded_at,
                None => true,
            };
            if became_current {
                track.current = Some(fix.clone());
            }
        }

        // Write-behind to the durable tables; ingestion is fire-and-forget,
        // so a store hiccup is logged rather than surfaced to the driver.
        if let Err(err) = self.storage.append_fix(&fix).await {
            tracing::warn!("Failed to persist fix history for {}: {}", fix.driver_id, err);
        }
        if became_current {
            if let Err(err) = self.storage.put_current_fix(&fix).await {
                tracing::warn!("Failed to persist current fix for {}: {}", fix.driver_id, err);
            }
        }

        true
    }

    /// Last known position of every driver that has ever reported one.
    pub async fn current_all(&self) -> HashMap<String, LocationFix> {
        let mut all = HashMap::new();
        for shard in &self.shards {
            let shard = shard.read().await;
            for (driver_id, track) in shard.iter() {
                if let Some(fix) = &track.current {
                    all.insert(driver_id.clone(), fix.clone());
                }
            }
        }
        all
    }

    pub async fn current_for(&self, driver_id: &str) -> Option<LocationFix> {
        let shard = self.shard_for(driver_id).read().await;
        shard.get(driver_id).and_then(|track| track.current.clone())
    }

    /// Fixes with `from <= recorded_at <= to`, ascending, regardless of the
    /// order they were ingested in. Pure query; callers may re-run it.
    pub async fn history(
        &self,
        driver_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<LocationFix> {
        let shard = self.shard_for(driver_id).read().await;
        match shard.get(driver_id) {
            Some(track) => track
                .history
                .iter()
                .filter(|fix| fix.recorded_at >= from && fix.recorded_at <= to)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}
