// ABOUTME: Validated git branch name for editing sessions.
// ABOUTME: Rejects whitespace and ref-breaking characters before they reach git.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BranchNameError {
    #[error("branch name cannot be empty")]
    Empty,

    #[error("branch name cannot start with '-' or '/'")]
    BadStart,

    #[error("branch name cannot contain '..'")]
    DoubleDot,

    #[error("invalid character in branch name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    pub fn new(value: &str) -> Result<Self, BranchNameError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(BranchNameError::Empty);
        }

        if trimmed.starts_with('-') || trimmed.starts_with('/') {
            return Err(BranchNameError::BadStart);
        }

        if trimmed.contains("..") {
            return Err(BranchNameError::DoubleDot);
        }

        // Valid characters: alphanumeric, hyphen, underscore, dot, slash
        for c in trimmed.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' && c != '/' {
                return Err(BranchNameError::InvalidChar(c));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The branch name folded into a single DNS label: lowercase, with every
    /// character outside `[a-z0-9-]` replaced by a hyphen.
    pub fn dns_label(&self) -> String {
        let folded: String = self
            .0
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        folded.trim_matches('-').to_string()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for BranchName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BranchName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BranchName::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_slashes_and_dots() {
        assert!(BranchName::new("feature/v1.2").is_ok());
    }

    #[test]
    fn rejects_spaces() {
        assert!(matches!(
            BranchName::new("my branch"),
            Err(BranchNameError::InvalidChar(' '))
        ));
    }

    #[test]
    fn rejects_double_dot() {
        assert!(matches!(
            BranchName::new("a..b"),
            Err(BranchNameError::DoubleDot)
        ));
    }

    #[test]
    fn dns_label_folds_separators() {
        let branch = BranchName::new("Edit_2024/fix.Typo").unwrap();
        assert_eq!(branch.dns_label(), "edit-2024-fix-typo");
    }
}
