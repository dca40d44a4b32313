// src/models/feedback.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Post-trip feedback. One record per trip; an exact duplicate submission is
/// accepted as a no-op so client retries stay harmless.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Feedback {
    pub trip_id: String,
    pub rating: u8,
    pub comment: Option<String>,
}

impl Feedback {
    pub fn rating_in_bounds(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}

/// Stored form, stamped when first recorded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub trip_id: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn matches(&self, feedback: &Feedback) -> bool {
        self.rating == feedback.rating && self.comment == feedback.comment
    }
}
