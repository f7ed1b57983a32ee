// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! A byte buffer that zeroes its contents on drop. Used for nonces,
//! signatures, and decrypted passwords: §3 invariant 7 requires "any owned
//! cryptographic buffer ... is zeroed/cleared before its memory is released".

use zeroize::Zeroize;

/// An owned, fixed-purpose cryptographic byte buffer that is zeroized when
/// dropped, moved-from, or explicitly [`SecureBytes::clear`]ed.
#[derive(Clone, Default)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    /// Wrap an existing buffer.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// An empty buffer.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Borrow the contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero the contents in place and truncate to empty, without waiting for drop.
    /// Used on the invariant-2 forward-secrecy path: the server nonce is
    /// cleared the instant the activation that consumed it completes, whether
    /// it succeeded or failed.
    pub fn clear(&mut self) {
        self.0.zeroize();
        self.0.clear();
    }

    /// Take the bytes out, leaving an empty (zeroized) buffer behind.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl Drop for SecureBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureBytes({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for SecureBytes {}
