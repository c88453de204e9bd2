/*!
 * Core data types for Alpaca Barn.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a configured driver, unique within its device category.
///
/// Identifiers order lexicographically; the protocol's device numbers are
/// positions in that ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DriverId(String);

impl DriverId {
    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DriverId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for DriverId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DriverId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_sort_lexicographically() {
        let mut ids: Vec<DriverId> = vec!["roof".into(), "cloud".into(), "rain".into()];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(DriverId::as_str).collect();
        assert_eq!(names, ["cloud", "rain", "roof"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(DriverId::from("roof").to_string(), "roof");
    }
}
