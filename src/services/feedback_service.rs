// src/services/feedback_service.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing;

use crate::errors::RideLinkError;
use crate::models::feedback::{Feedback, FeedbackRecord, MAX_RATING, MIN_RATING};
use crate::services::registry::TripRegistry;
use crate::storage::StorageService;

#[async_trait]
pub trait FeedbackOperations: Send + Sync {
    async fn provide_feedback(&self, feedback: Feedback) -> Result<FeedbackRecord, RideLinkError>;
    async fn feedback_for_trip(
        &self,
        trip_id: &str,
    ) -> Result<Option<FeedbackRecord>, RideLinkError>;
}

pub struct FeedbackService {
    registry: Arc<TripRegistry>,
    storage: Arc<StorageService>,
}

impl FeedbackService {
    pub fn new(registry: Arc<TripRegistry>, storage: Arc<StorageService>) -> Self {
        Self { registry, storage }
    }
}

#[async_trait]
impl FeedbackOperations for FeedbackService {
    /// Record feedback for an ended trip. Idempotent per trip: resubmitting
    /// identical content succeeds without a second record; different
    /// content against an already-rated trip is a Conflict.
    async fn provide_feedback(&self, feedback: Feedback) -> Result<FeedbackRecord, RideLinkError> {
        if !feedback.rating_in_bounds() {
            return Err(RideLinkError::validation_error(
                "rating",
                format!("must be between {} and {}", MIN_RATING, MAX_RATING),
            ));
        }

        let trip = self
            .registry
            .get(&feedback.trip_id)
            .await
            .ok_or_else(|| RideLinkError::trip_not_found(&feedback.trip_id))?;

        if !trip.state.is_terminal() {
            return Err(RideLinkError::invalid_transition(trip.state, "ProvideFeedback"));
        }

        if let Some(existing) = self.storage.get_feedback(&feedback.trip_id).await? {
            if existing.matches(&feedback) {
                tracing::debug!("Duplicate feedback for trip {}, no-op", feedback.trip_id);
                return Ok(existing);
            }
            return Err(RideLinkError::conflict(format!(
                "trip {} already has feedback",
                feedback.trip_id
            )));
        }

        let record = FeedbackRecord {
            trip_id: feedback.trip_id.clone(),
            rating: feedback.rating,
            comment: feedback.comment.clone(),
            recorded_at: Utc::now(),
        };
        self.storage.put_feedback(&record).await?;
        self.registry.record_rating(&feedback.trip_id, feedback.rating).await?;

        tracing::info!("Feedback recorded for trip {}: {}", record.trip_id, record.rating);
        Ok(record)
    }

    async fn feedback_for_trip(
        &self,
        trip_id: &str,
    ) -> Result<Option<FeedbackRecord>, RideLinkError> {
        self.storage.get_feedback(trip_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{CancelReason, Stop};
    use crate::services::lifecycle::TripEvent;

    fn stops() -> Vec<Stop> {
        vec![
            Stop { latitude: 1.0, longitude: 1.0, address: "A".to_string() },
            Stop { latitude: 2.0, longitude: 2.0, address: "B".to_string() },
        ]
    }

    async fn ended_trip(registry: &TripRegistry) -> String {
        let trip = registry.create("rid-42", stops()).await.unwrap();
        registry
            .apply(&trip.id, TripEvent::Cancel { reason: CancelReason::RiderRequest })
            .await
            .unwrap();
        trip.id
    }

    fn service() -> (Arc<TripRegistry>, FeedbackService) {
        let storage = Arc::new(StorageService::memory());
        let registry = Arc::new(TripRegistry::new(Arc::clone(&storage)));
        (Arc::clone(&registry), FeedbackService::new(registry, storage))
    }

    #[tokio::test]
    async fn test_duplicate_feedback_is_idempotent() {
        let (registry, service) = service();
        let trip_id = ended_trip(&registry).await;

        let feedback = Feedback {
            trip_id: trip_id.clone(),
            rating: 5,
            comment: Some("great ride".to_string()),
        };

        let first = service.provide_feedback(feedback.clone()).await.unwrap();
        let second = service.provide_feedback(feedback).await.unwrap();
        assert_eq!(first, second);

        // Trip carries the rating exactly once.
        assert_eq!(registry.get(&trip_id).await.unwrap().rating, Some(5));
    }

    #[tokio::test]
    async fn test_different_content_conflicts() {
        let (registry, service) = service();
        let trip_id = ended_trip(&registry).await;

        service
            .provide_feedback(Feedback { trip_id: trip_id.clone(), rating: 5, comment: None })
            .await
            .unwrap();

        let changed = service
            .provide_feedback(Feedback { trip_id, rating: 2, comment: None })
            .await;
        assert!(matches!(changed, Err(RideLinkError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_feedback_requires_terminal_trip() {
        let (registry, service) = service();
        let trip = registry.create("rid-42", stops()).await.unwrap();

        let result = service
            .provide_feedback(Feedback { trip_id: trip.id, rating: 4, comment: None })
            .await;
        assert!(matches!(result, Err(RideLinkError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_rating_bounds() {
        let (registry, service) = service();
        let trip_id = ended_trip(&registry).await;

        for rating in [0u8, 6] {
            let result = service
                .provide_feedback(Feedback { trip_id: trip_id.clone(), rating, comment: None })
                .await;
            assert!(matches!(result, Err(RideLinkError::ValidationFailed(_))));
        }
    }
}
