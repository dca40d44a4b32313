// src/services/notifier.rs
//
// Out-of-band delivery channel for rider notifications. In-session
// delivery is the relay's job; implementations here cover the externally
// configured channel (webhook) and the mock used in development and tests.
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing;

use crate::errors::RideLinkError;
use crate::models::notification::TripNotification;
use crate::models::trip::Trip;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_rider(
        &self,
        trip: &Trip,
        notification: &TripNotification,
    ) -> Result<(), RideLinkError>;
}

/// POSTs the notification payload to a configured endpoint. Delivery is
/// best-effort; the relay does not retry on failure.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self { client: reqwest::Client::new(), url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_rider(
        &self,
        trip: &Trip,
        notification: &TripNotification,
    ) -> Result<(), RideLinkError> {
        tracing::debug!("Posting notification {} for trip {}", notification.id, trip.id);

        let body = json!({
            "rider_id": trip.rider_id,
            "notification": notification,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Notification webhook returned {}", status);
            return Err(RideLinkError::HttpClient(format!(
                "webhook returned {}",
                status
            )));
        }

        Ok(())
    }
}

/// Mock notifier for development and testing; records everything it is
/// asked to deliver.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(String, TripNotification)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, TripNotification)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify_rider(
        &self,
        trip: &Trip,
        notification: &TripNotification,
    ) -> Result<(), RideLinkError> {
        tracing::info!(
            "[MOCK] Would notify rider {}: {} - {}",
            trip.rider_id,
            notification.title,
            notification.message
        );
        self.sent
            .lock()
            .await
            .push((trip.rider_id.clone(), notification.clone()));
        Ok(())
    }
}
