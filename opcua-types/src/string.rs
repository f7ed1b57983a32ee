// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Contains the implementation of `UAString`.

use std::fmt;

/// To avoid naming conflict hell, the OPC UA String type is typed `UAString` so it does not
/// collide with the Rust `String`.
///
/// A string contains UTF-8 encoded characters or a null value. A null value is distinct from
/// being an empty string, so internally the code maintains that distinction by holding the
/// value as an `Option<String>`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct UAString {
    value: Option<String>,
}

impl fmt::Display for UAString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{value}"),
            None => write!(f, "[null]"),
        }
    }
}

impl AsRef<str> for UAString {
    fn as_ref(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

impl From<&str> for UAString {
    fn from(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
        }
    }
}

impl From<String> for UAString {
    fn from(value: String) -> Self {
        Self { value: Some(value) }
    }
}

impl UAString {
    /// A null string, distinct from an empty string.
    pub fn null() -> Self {
        Self { value: None }
    }

    /// `true` if this string is null.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// `true` if this string is null or empty.
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(String::is_empty).unwrap_or(true)
    }

    /// Borrow the inner value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}
