use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for customer contact data that masks its value in Debug and Display output.
///
/// Serialization writes the real value: API responses and the reservation store need it,
/// log macros like `tracing::info!("{:?}", booking)` must not.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_masked_but_serialization_is_not() {
        let email = Masked::from("ana@example.com");
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"ana@example.com\"");
    }

    #[test]
    fn test_deserializes_transparently() {
        let phone: Masked<String> = serde_json::from_str("\"+351912345678\"").unwrap();
        assert_eq!(phone.expose(), "+351912345678");
    }
}
