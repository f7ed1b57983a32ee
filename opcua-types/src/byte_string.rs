// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Contains the implementation of `ByteString`.

/// A sequence of octets. Distinguishes a null byte string (absent) from an empty one,
/// same as [`crate::UAString`].
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteString {
    value: Option<Vec<u8>>,
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(value: Vec<u8>) -> Self {
        Self { value: Some(value) }
    }
}

impl From<&[u8]> for ByteString {
    fn from(value: &[u8]) -> Self {
        Self {
            value: Some(value.to_vec()),
        }
    }
}

impl ByteString {
    /// A null byte string, distinct from an empty one.
    pub fn null() -> Self {
        Self { value: None }
    }

    /// `true` if this byte string is null.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// `true` if this byte string is null or zero-length.
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(Vec::is_empty).unwrap_or(true)
    }

    /// Length in bytes, `0` for a null byte string.
    pub fn len(&self) -> usize {
        self.value.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Consume self, returning the inner bytes or an empty vec if null.
    pub fn into_vec(self) -> Vec<u8> {
        self.value.unwrap_or_default()
    }
}
