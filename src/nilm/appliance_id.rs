use std::fmt;

/// Opaque identifier for one appliance (one sub-metered channel).
///
/// Compared by value, so the same label always refers to the same appliance
/// across training and disaggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplianceId(String);

impl ApplianceId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplianceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplianceId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for ApplianceId {
    fn from(label: String) -> Self {
        Self(label)
    }
}
