//! Identity - Two-part composite identifiers
//!
//! Remote objects keyed by a pair of names are tracked under a single string,
//! `"<first>~<second>"`. The pair is kept structured internally and only joined
//! at the boundary. Components must be non-empty and must not contain the
//! delimiter, so that parsing always recovers the original pair.

use std::fmt;
use std::str::FromStr;

/// Delimiter between the two components of a composite identifier
pub const DELIMITER: char = '~';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("{field} must not be empty")]
    EmptyComponent { field: &'static str },

    #[error("{field} '{value}' must not contain '~'")]
    ContainsDelimiter { field: &'static str, value: String },

    #[error("invalid identifier '{0}': expected format <first>~<second>")]
    Malformed(String),
}

/// A composite identifier made of two components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    first: String,
    second: String,
}

impl CompositeId {
    /// Build an identifier, rejecting components that would not round-trip
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Result<Self, IdentityError> {
        let first = first.into();
        let second = second.into();
        check_component("first component", &first)?;
        check_component("second component", &second)?;
        Ok(Self { first, second })
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }
}

/// Check that a value can be used as one side of a composite identifier
pub fn check_component(field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.is_empty() {
        return Err(IdentityError::EmptyComponent { field });
    }
    if value.contains(DELIMITER) {
        return Err(IdentityError::ContainsDelimiter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.first, DELIMITER, self.second)
    }
}

impl FromStr for CompositeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
                Ok(Self {
                    first: first.to_string(),
                    second: second.to_string(),
                })
            }
            _ => Err(IdentityError::Malformed(s.to_string())),
        }
    }
}
