//! Help request domain type.
//!
//! Mirrors `models.py`'s `RequestType`/`RequestPriority` enums and
//! `HelpRequest` model, with constructor-time validation in place of
//! `pydantic` validators.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::geo::GeoLocation;

const TITLE_LEN: std::ops::Range<usize> = 5..100;
const DESCRIPTION_LEN: std::ops::Range<usize> = 10..1000;
const TTL_SECONDS_RANGE: std::ops::RangeInclusive<u64> = 60..=86_400;

/// Category of assistance being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Medical,
    Rescue,
    Shelter,
    FoodWater,
    Transport,
    Info,
}

/// Urgency of a [`HelpRequest`], ordered low to high. Defaults to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RequestPriority {
    fn default() -> Self {
        RequestPriority::Medium
    }
}

/// A single help request gossiped through the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub location: GeoLocation,
    pub request_type: RequestType,
    pub priority: RequestPriority,
    pub title: String,
    pub description: String,
    pub contact_info: Option<String>,
    pub sender_id: String,
    pub hop_count: u32,
    /// Opaque to the core; a real deployment fills this from the
    /// out-of-scope wallet/signing layer.
    pub signature: Option<Vec<u8>>,
}

impl HelpRequest {
    /// Validate and construct a new `HelpRequest`, stamping `timestamp` with
    /// the current time and `hop_count` at zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_type: RequestType,
        priority: RequestPriority,
        title: String,
        description: String,
        location: GeoLocation,
        contact_info: Option<String>,
        ttl_seconds: u64,
        sender_id: String,
    ) -> Result<Self, ValidationError> {
        if !TITLE_LEN.contains(&title.chars().count()) {
            return Err(ValidationError::TitleLength(title.chars().count()));
        }
        if !DESCRIPTION_LEN.contains(&description.chars().count()) {
            return Err(ValidationError::DescriptionLength(
                description.chars().count(),
            ));
        }
        if !TTL_SECONDS_RANGE.contains(&ttl_seconds) {
            return Err(ValidationError::TtlOutOfRange(ttl_seconds));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            ttl_seconds,
            location,
            request_type,
            priority,
            title,
            description,
            contact_info,
            sender_id,
            hop_count: 0,
            signature: None,
        })
    }

    /// `now_utc - timestamp > ttl_seconds`.
    pub fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.timestamp);
        age > Duration::seconds(self.ttl_seconds as i64)
    }

    /// Return a copy with `hop_count` incremented by one. Every other field
    /// is carried through verbatim — the core never mutates a received
    /// request beyond this.
    pub fn with_incremented_hop(&self) -> Self {
        let mut next = self.clone();
        next.hop_count += 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> GeoLocation {
        GeoLocation::new(41.0082, 28.9784, None, None).unwrap()
    }

    fn build(title: &str, description: &str, ttl: u64) -> Result<HelpRequest, ValidationError> {
        HelpRequest::new(
            RequestType::Medical,
            RequestPriority::High,
            title.to_string(),
            description.to_string(),
            location(),
            None,
            ttl,
            "node-a".to_string(),
        )
    }

    #[test]
    fn rejects_short_title() {
        assert_eq!(
            build("hi", "a valid description here", 3600),
            Err(ValidationError::TitleLength(2))
        );
    }

    #[test]
    fn rejects_short_description() {
        assert_eq!(
            build("Need water", "short", 3600),
            Err(ValidationError::DescriptionLength(5))
        );
    }

    #[test]
    fn rejects_out_of_range_ttl() {
        assert_eq!(
            build("Need water", "a valid description here", 10),
            Err(ValidationError::TtlOutOfRange(10))
        );
    }

    #[test]
    fn accepts_valid_fields() {
        let req = build("Need water", "a valid description here", 3600).unwrap();
        assert_eq!(req.hop_count, 0);
        assert!(!req.is_expired());
    }

    #[test]
    fn with_incremented_hop_bumps_only_hop_count() {
        let req = build("Need water", "a valid description here", 3600).unwrap();
        let next = req.with_incremented_hop();
        assert_eq!(next.hop_count, 1);
        assert_eq!(next.id, req.id);
        assert_eq!(next.sender_id, req.sender_id);
    }

    #[test]
    fn priority_ordering() {
        assert!(RequestPriority::Critical > RequestPriority::High);
        assert!(RequestPriority::High > RequestPriority::Medium);
        assert!(RequestPriority::Medium > RequestPriority::Low);
    }

    #[test]
    fn default_priority_is_medium() {
        assert_eq!(RequestPriority::default(), RequestPriority::Medium);
    }
}
