// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Contains the implementation of `NodeId`, used here exclusively as the carrier
//! for session ids and authentication tokens.

use std::fmt;

use crate::ByteString;

/// The kind of identifier carried by a [`NodeId`].
#[derive(Eq, PartialEq, Clone, Debug, Hash)]
pub enum Identifier {
    /// Numeric node id identifier, `i=123`. Authentication tokens minted by this
    /// implementation always use this variant.
    Numeric(u32),
    /// Opaque node id identifier, `b=...`.
    ByteString(ByteString),
    /// String node id identifier, `s=...`.
    String(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::ByteString(v) => write!(f, "b={}", v.len()),
            Identifier::String(v) => write!(f, "s={v}"),
        }
    }
}

/// A node identifier. Used by the session layer to carry session ids and
/// authentication tokens, which are opaque to everything except the
/// [`crate::NodeId::eq`] structural comparison `session_from_token` relies on.
#[derive(Eq, PartialEq, Clone, Debug, Hash)]
pub struct NodeId {
    /// Namespace the identifier lives in.
    pub namespace: u16,
    /// The identifier itself.
    pub identifier: Identifier,
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};{}", self.namespace, self.identifier)
    }
}

impl NodeId {
    /// Construct a new numeric node id in the given namespace.
    pub fn new(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// The "null" node id: namespace 0, numeric identifier 0. Used to denote
    /// "no authentication token"/"no session" per the data model invariants.
    pub fn null() -> Self {
        Self::new(0, 0)
    }

    /// `true` for the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && matches!(self.identifier, Identifier::Numeric(0))
    }

    /// The numeric value, if this is a numeric identifier in namespace 0 or 1.
    pub fn as_u32(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_node_id_is_null() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::new(1, 7).is_null());
    }

    #[test]
    fn structural_equality_drives_token_lookup() {
        let a = NodeId::new(1, 42);
        let b = NodeId::new(1, 42);
        let c = NodeId::new(1, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
