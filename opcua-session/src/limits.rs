// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Compile-time limits (§6): `serde`-backed defaults plus a `validate()`
//! that rejects any mis-ordered limit.

use serde::{Deserialize, Serialize};

use opcua_core::config::check_range_u32;

mod defaults {
    pub fn max_endpoint_description_configurations() -> u32 {
        10
    }
    pub fn max_secure_connections() -> u32 {
        20
    }
    pub fn max_sessions() -> u32 {
        20
    }
    pub fn max_session_timeout_ms() -> u32 {
        600_000
    }
    pub fn min_session_timeout_ms() -> u32 {
        10_000
    }
    pub fn max_pending_requests() -> u32 {
        128
    }
    pub fn request_timeout_ms() -> u32 {
        5_000
    }
    pub fn sc_connection_timeout_ms() -> u32 {
        60_000
    }
    pub fn max_async_queue_elements() -> usize {
        5_000
    }
    pub fn max_waiting_discovery_requests() -> usize {
        5
    }
}

/// The compile-time limits governing session and endpoint capacity, with
/// their default values and static ordering constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Maximum number of endpoint description configurations.
    #[serde(default = "defaults::max_endpoint_description_configurations")]
    pub max_endpoint_description_configurations: u32,
    /// Maximum number of concurrent secure connections.
    #[serde(default = "defaults::max_secure_connections")]
    pub max_secure_connections: u32,
    /// Maximum number of live sessions (`MaxSessions`, invariant 5).
    #[serde(default = "defaults::max_sessions")]
    pub max_sessions: u32,
    /// Upper clamp for `revised_session_timeout_ms` (§4.6).
    #[serde(default = "defaults::max_session_timeout_ms")]
    pub max_session_timeout_ms: u32,
    /// Lower clamp for `revised_session_timeout_ms` (§4.6).
    #[serde(default = "defaults::min_session_timeout_ms")]
    pub min_session_timeout_ms: u32,
    /// Maximum number of requests in flight awaiting a response.
    #[serde(default = "defaults::max_pending_requests")]
    pub max_pending_requests: u32,
    /// Per-request timeout tracked by the Secure-Channels layer (§5).
    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u32,
    /// Secure channel connection timeout.
    #[serde(default = "defaults::sc_connection_timeout_ms")]
    pub sc_connection_timeout_ms: u32,
    /// Looper queue capacity (`MaxAsyncQueueElements`, §4.1).
    #[serde(default = "defaults::max_async_queue_elements")]
    pub max_async_queue_elements: usize,
    /// Discovery Request Queue per-config cap (`MaxWaitingDiscoveryRequests`, §4.8).
    #[serde(default = "defaults::max_waiting_discovery_requests")]
    pub max_waiting_discovery_requests: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_endpoint_description_configurations:
                defaults::max_endpoint_description_configurations(),
            max_secure_connections: defaults::max_secure_connections(),
            max_sessions: defaults::max_sessions(),
            max_session_timeout_ms: defaults::max_session_timeout_ms(),
            min_session_timeout_ms: defaults::min_session_timeout_ms(),
            max_pending_requests: defaults::max_pending_requests(),
            request_timeout_ms: defaults::request_timeout_ms(),
            sc_connection_timeout_ms: defaults::sc_connection_timeout_ms(),
            max_async_queue_elements: defaults::max_async_queue_elements(),
            max_waiting_discovery_requests: defaults::max_waiting_discovery_requests(),
        }
    }
}

impl SessionLimits {
    /// Validate every ordering constraint in §6's table, collecting every
    /// violation rather than failing on the first (mirrors
    /// `opcua-server/src/config/limits.rs`'s style of reporting everything
    /// wrong with a config in one pass).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        check_range_u32(
            "MaxEndpointDescriptionConfigurations",
            self.max_endpoint_description_configurations,
            1,
            i32::MAX as u32,
            &mut errors,
        );
        check_range_u32(
            "MaxSecureConnections",
            self.max_secure_connections,
            1,
            i32::MAX as u32,
            &mut errors,
        );
        check_range_u32("MaxSessions", self.max_sessions, 1, i32::MAX as u32, &mut errors);
        check_range_u32(
            "MinSessionTimeoutMs",
            self.min_session_timeout_ms,
            10_000,
            u32::MAX,
            &mut errors,
        );
        if self.max_session_timeout_ms < self.min_session_timeout_ms {
            errors.push(format!(
                "MaxSessionTimeoutMs ({}) must be >= MinSessionTimeoutMs ({})",
                self.max_session_timeout_ms, self.min_session_timeout_ms
            ));
        }
        if self.max_waiting_discovery_requests == 0 {
            errors.push("MaxWaitingDiscoveryRequests must be nonzero".to_string());
        }
        if self.max_async_queue_elements == 0 {
            errors.push("MaxAsyncQueueElements must be nonzero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Clamp a client-requested session timeout (in ms, truncated from the
    /// wire's `f64`) into `[min_session_timeout_ms, max_session_timeout_ms]`
    /// (§4.6).
    pub fn clamp_session_timeout(&self, requested_ms: f64) -> u32 {
        let requested = if requested_ms.is_finite() && requested_ms > 0.0 {
            requested_ms as u64
        } else {
            0
        };
        requested
            .clamp(
                self.min_session_timeout_ms as u64,
                self.max_session_timeout_ms as u64,
            )
            .min(u32::MAX as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(SessionLimits::default().validate().is_ok());
    }

    #[test]
    fn mis_ordered_timeouts_are_rejected() {
        let limits = SessionLimits {
            max_session_timeout_ms: 5_000,
            min_session_timeout_ms: 10_000,
            ..SessionLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn clamp_keeps_requested_timeout_in_bounds() {
        let limits = SessionLimits::default();
        assert_eq!(limits.clamp_session_timeout(0.0), 10_000);
        assert_eq!(limits.clamp_session_timeout(60_000.0), 60_000);
        assert_eq!(limits.clamp_session_timeout(10_000_000.0), 600_000);
    }
}
