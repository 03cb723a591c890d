//! Document collection names
//!
//! Collection names are stored as a column value and bound as a parameter,
//! never interpolated as an identifier.

use once_cell::sync::Lazy;
use regex::Regex;

use dsenvios_core::ValidationError;

/// Maximum length for collection names
const MAX_COLLECTION_LEN: usize = 63;

/// Lowercase identifier: letter first, then letters, digits, underscores
static COLLECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("invalid collection regex")
});

/// Validated collection name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// # Example
    /// ```
    /// use dsenvios_server::models::CollectionName;
    ///
    /// assert!(CollectionName::new("bodegas").is_ok());
    /// assert!(CollectionName::new("Bodegas").is_err());
    /// assert!(CollectionName::new("1st").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "collection" });
        }

        if s.len() > MAX_COLLECTION_LEN {
            return Err(ValidationError::TooLong {
                field: "collection",
                max: MAX_COLLECTION_LEN,
            });
        }

        if !COLLECTION_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "collection",
                reason: "must be lowercase letters, digits or underscores, starting with a letter",
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
