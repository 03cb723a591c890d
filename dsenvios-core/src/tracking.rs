//! Tracking numbers (`numero_guia`)
//!
//! Opaque, immutable once issued. Generated numbers follow the
//! `DS` + `YYMMDD` + four random digits layout printed on labels.

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Maximum length for tracking numbers
const MAX_TRACKING_LEN: usize = 32;

/// Uppercase alphanumerics and hyphens, starting with an alphanumeric.
static TRACKING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9][A-Z0-9-]{2,31}$").expect("invalid tracking number regex")
});

/// Validated tracking number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Parse a tracking number typed by a user.
    ///
    /// Input is trimmed and uppercased, so `" trk-1001 "` becomes `TRK-1001`.
    ///
    /// # Example
    /// ```
    /// use dsenvios_core::TrackingNumber;
    ///
    /// assert_eq!(TrackingNumber::new("trk-1001").unwrap().as_str(), "TRK-1001");
    /// assert!(TrackingNumber::new("no spaces").is_err());
    /// assert!(TrackingNumber::new("-leading").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let normalized = s.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(ValidationError::Empty {
                field: "numero_guia",
            });
        }

        if normalized.len() > MAX_TRACKING_LEN {
            return Err(ValidationError::TooLong {
                field: "numero_guia",
                max: MAX_TRACKING_LEN,
            });
        }

        if !TRACKING_RE.is_match(&normalized) {
            return Err(ValidationError::InvalidFormat {
                field: "numero_guia",
                reason: "must be 3-32 letters, digits or hyphens, starting with a letter or digit",
            });
        }

        Ok(Self(normalized))
    }

    /// Issue a fresh number for today.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now(), &mut rand::thread_rng())
    }

    /// Issue a number for the given instant using the supplied RNG.
    pub fn generate_at<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: u16 = rng.gen_range(0..10_000);
        Self(format!("DS{}{:04}", now.format("%y%m%d"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackingNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<TrackingNumber> for String {
    fn from(value: TrackingNumber) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn normalizes_case_and_whitespace() {
        let n = TrackingNumber::new("  ds2401150042 ").unwrap();
        assert_eq!(n.as_str(), "DS2401150042");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            TrackingNumber::new(""),
            Err(ValidationError::Empty { .. })
        ));
        assert!(matches!(
            TrackingNumber::new(&"A".repeat(40)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(TrackingNumber::new("AB").is_err());
        assert!(TrackingNumber::new("TRK_1001").is_err());
    }

    #[test]
    fn generated_numbers_follow_label_layout() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = TrackingNumber::generate_at(now, &mut rng);

        assert!(n.as_str().starts_with("DS240115"), "{n}");
        assert_eq!(n.as_str().len(), 12);
        assert!(TrackingNumber::new(n.as_str()).is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let ok: TrackingNumber = serde_json::from_str("\"trk-1001\"").unwrap();
        assert_eq!(ok.as_str(), "TRK-1001");
        assert!(serde_json::from_str::<TrackingNumber>("\"bad number\"").is_err());
    }
}
