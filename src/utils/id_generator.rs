// src/utils/id_generator.rs
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Trip,
    Driver,
    Rider,
    Notification,
    Feedback,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Trip => "trp",
            IdType::Driver => "drv",
            IdType::Rider => "rid",
            IdType::Notification => "ntf",
            IdType::Feedback => "fbk",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// Generate a unique ID with format: {prefix}-{date}-{random_suffix}
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    /// Generate ID with a specific timestamp (useful for testing)
    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string(); // YYMMDD format
        let random_suffix = Self::generate_random_suffix();

        format!("{}-{}-{}", id_type.to_prefix(), date_part, random_suffix)
    }

    /// Six lowercase alphanumeric characters.
    fn generate_random_suffix() -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        use rand::Rng;

        let mut rng = rand::rng();
        (0..6)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }

    /// Parse an ID to extract its components
    pub fn parse_id(id: &str) -> Option<ParsedId> {
        let parts: Vec<&str> = id.split('-').collect();
        if parts.len() != 3 {
            return None;
        }

        let prefix = parts[0];
        let date_part = parts[1];
        let random_suffix = parts[2];

        if date_part.len() != 6 || random_suffix.len() != 6 {
            return None;
        }

        let id_type = match prefix {
            "trp" => IdType::Trip,
            "drv" => IdType::Driver,
            "rid" => IdType::Rider,
            "ntf" => IdType::Notification,
            "fbk" => IdType::Feedback,
            _ => return None,
        };

        // Parse date (YYMMDD format)
        let year = format!("20{}", &date_part[0..2]).parse::<i32>().ok()?;
        let month = date_part[2..4].parse::<u32>().ok()?;
        let day = date_part[4..6].parse::<u32>().ok()?;

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }

        Some(ParsedId {
            id_type,
            year,
            month,
            day,
            random_suffix: random_suffix.to_string(),
        })
    }

    /// Validate if an ID matches the expected format and type
    pub fn validate_id(id: &str, expected_type: Option<IdType>) -> bool {
        match Self::parse_id(id) {
            Some(parsed) => match expected_type {
                Some(expected) => parsed.id_type == expected,
                None => true,
            },
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedId {
    pub id_type: IdType,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub random_suffix: String,
}

impl ParsedId {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, 0, 0, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let trip_id = IdGenerator::generate(IdType::Trip);
        assert!(trip_id.starts_with("trp-"));
        assert_eq!(trip_id.split('-').count(), 3);

        let driver_id = IdGenerator::generate(IdType::Driver);
        assert!(driver_id.starts_with("drv-"));
    }

    #[test]
    fn test_id_parsing() {
        let test_date = Utc.with_ymd_and_hms(2026, 8, 7, 0, 0, 0).unwrap();
        let id = IdGenerator::generate_with_timestamp(IdType::Driver, test_date);

        let parsed = IdGenerator::parse_id(&id).unwrap();
        assert_eq!(parsed.id_type, IdType::Driver);
        assert_eq!(parsed.year, 2026);
        assert_eq!(parsed.month, 8);
        assert_eq!(parsed.day, 7);
        assert_eq!(parsed.random_suffix.len(), 6);
    }

    #[test]
    fn test_validation() {
        let valid_id = "trp-260807-a1b2c3";
        assert!(IdGenerator::validate_id(valid_id, Some(IdType::Trip)));
        assert!(!IdGenerator::validate_id(valid_id, Some(IdType::Driver)));

        assert!(!IdGenerator::validate_id("invalid-format", None));
        assert!(!IdGenerator::validate_id("trp-269999-a1b2c3", None));
    }
}
