// ABOUTME: DNS-compatible site name validation.
// ABOUTME: Site names become subdomain labels and container names, so they follow RFC 1123.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteNameError {
    #[error("site name cannot be empty")]
    Empty,

    #[error("site name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("site name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("site name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("site name must be lowercase")]
    NotLowercase,

    #[error("invalid character in site name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteName(String);

impl SiteName {
    pub fn new(value: &str) -> Result<Self, SiteNameError> {
        if value.is_empty() {
            return Err(SiteNameError::Empty);
        }

        if value.len() > 63 {
            return Err(SiteNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(SiteNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(SiteNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(SiteNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(SiteNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SiteName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SiteName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SiteName::new(&s).map_err(serde::de::Error::custom)
    }
}
