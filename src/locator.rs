use std::str::FromStr;

use crate::error_code::ErrorCode;

/// Where a published video lives, persisted as `{container},{key}`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Locator {
    container: String,
    key: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum LocatorError {
    #[error("Stored locator {0:?} isn't of the form container,key")]
    Malformed(String),
}

impl LocatorError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        ErrorCode::INVALID_LOCATOR
    }
}

impl Locator {
    pub(crate) fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Locator {
            container: container.into(),
            key: key.into(),
        }
    }

    pub(crate) fn container(&self) -> &str {
        &self.container
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');

        match (parts.next(), parts.next(), parts.next()) {
            (Some(container), Some(key), None) if !container.is_empty() && !key.is_empty() => {
                Ok(Locator::new(container, key))
            }
            _ => Err(LocatorError::Malformed(s.to_string())),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.container, self.key)
    }
}
