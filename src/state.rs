// src/state.rs
use std::sync::Arc;
use std::time::Duration;

use crate::errors::RideLinkError;
use crate::services::directory::{DEFAULT_MAX_PAGE_SIZE, DirectoryService};
use crate::services::driver_service::DriverService;
use crate::services::feedback_service::FeedbackService;
use crate::services::location_store::LocationStore;
use crate::services::matching::{AssignmentPolicy, NearestAvailable};
use crate::services::notifier::{MockNotifier, Notifier, WebhookNotifier};
use crate::services::registry::TripRegistry;
use crate::services::relay::{RelayConfig, SessionRelay};
use crate::storage::StorageService;

pub struct AppState {
    pub registry: Arc<TripRegistry>,
    pub locations: Arc<LocationStore>,
    pub relay: SessionRelay,
    pub drivers: Arc<DriverService>,
    pub directory: Arc<DirectoryService>,
    pub feedback: Arc<FeedbackService>,
    pub notifier: Arc<dyn Notifier>,
    pub config: AppConfig,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// None selects the in-memory store (dev and tests).
    pub redis_url: Option<String>,
    /// None selects the mock notifier.
    pub notify_webhook_url: Option<String>,
    pub grace_window_secs: u64,
    pub forward_timeout_ms: u64,
    pub relay_queue_bound: usize,
    pub max_page_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            redis_url: None,
            notify_webhook_url: None,
            grace_window_secs: 60,
            forward_timeout_ms: 250,
            relay_queue_bound: 32,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("RIDELINK_BIND_ADDR").unwrap_or(defaults.bind_addr),
            redis_url: std::env::var("RIDELINK_REDIS_URL").ok(),
            notify_webhook_url: std::env::var("RIDELINK_NOTIFY_WEBHOOK_URL").ok(),
            grace_window_secs: env_number("RIDELINK_GRACE_WINDOW_SECS", defaults.grace_window_secs),
            forward_timeout_ms: env_number("RIDELINK_FORWARD_TIMEOUT_MS", defaults.forward_timeout_ms),
            relay_queue_bound: env_number("RIDELINK_RELAY_QUEUE_BOUND", defaults.relay_queue_bound),
            max_page_size: env_number("RIDELINK_MAX_PAGE_SIZE", defaults.max_page_size),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            grace_window: Duration::from_secs(self.grace_window_secs),
            forward_timeout: Duration::from_millis(self.forward_timeout_ms),
            queue_bound: self.relay_queue_bound,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, RideLinkError> {
        let storage = match &config.redis_url {
            Some(url) => Arc::new(StorageService::redis(url)?),
            None => {
                tracing::warn!("RIDELINK_REDIS_URL not set, using in-memory store");
                Arc::new(StorageService::memory())
            }
        };

        let registry = Arc::new(TripRegistry::new(Arc::clone(&storage)));
        registry.load_from_store().await?;

        let locations = Arc::new(LocationStore::new(Arc::clone(&storage)));

        let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => {
                tracing::warn!("RIDELINK_NOTIFY_WEBHOOK_URL not set, using mock notifier");
                Arc::new(MockNotifier::new())
            }
        };

        let relay = SessionRelay::new(
            Arc::clone(&registry),
            Arc::clone(&locations),
            Arc::clone(&notifier),
            config.relay_config(),
        );

        let drivers = Arc::new(DriverService::new(
            Arc::clone(&storage),
            Arc::clone(&registry),
            Arc::clone(&locations),
        ));

        let assignment: Arc<dyn AssignmentPolicy> = Arc::new(NearestAvailable);
        let directory = Arc::new(DirectoryService::new(
            Arc::clone(&registry),
            Arc::clone(&locations),
            Arc::clone(&drivers),
            assignment,
            config.max_page_size,
        ));

        let feedback = Arc::new(FeedbackService::new(Arc::clone(&registry), storage));

        Ok(Self {
            registry,
            locations,
            relay,
            drivers,
            directory,
            feedback,
            notifier,
            config,
        })
    }
}
