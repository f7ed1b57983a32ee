// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Cryptographically strong random bytes, nonces, and ids.

use opcua_types::ByteString;
use rand::RngCore;

/// Fill the slice with cryptographically strong pseudo-random bytes.
pub fn bytes(bytes: &mut [u8]) {
    rand::thread_rng().fill_bytes(bytes);
}

/// Create a byte string of `number_of_bytes` random bytes. Used for session nonces.
pub fn byte_string(number_of_bytes: usize) -> ByteString {
    let mut data = vec![0u8; number_of_bytes];
    bytes(&mut data);
    ByteString::from(data)
}

/// Generate a random 32-bit id, used for authentication tokens (§4.5: "the value is
/// drawn from the Crypto Adapter's `random_id`").
pub fn id() -> u32 {
    rand::thread_rng().next_u32()
}
