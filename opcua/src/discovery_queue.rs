// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Discovery Request Queue (C8, §4.8): a per-`channel_config_idx` bounded
//! FIFO of discovery-service requests waiting for their Secure Channel to
//! come up. Drains on connect, fails every entry on final connection failure,
//! and frees silently on shutdown.

use hashbrown::HashMap;
use std::collections::VecDeque;

use opcua_core::{Event, LooperHandle, PostMode};
use opcua_types::StatusCode;

use crate::dispatcher::{ApplicationDispatcher, AppEvent, MessageType, Payload};

/// Event kind posted onto the Secure-Channels Looper for a drained discovery
/// request (`SendDiscoveryRequest` in §6's collaborator interface list). The
/// event's `id` carries the `channel_config_idx` it was queued under.
pub const SEND_DISCOVERY_REQUEST: u32 = 1;

/// One queued discovery-service request (§4.8: "a capped FIFO of
/// `{message, message_type, app_context}`").
pub struct DiscoveryRequest {
    /// The encoded outbound request; ownership passes to whatever eventually
    /// sends it (or to the `SendRequestFailed` event if it never does).
    pub message: Payload,
    /// Which discovery service this request belongs to.
    pub message_type: MessageType,
    /// Application-chosen opaque context.
    pub app_context: u64,
}

/// Per-`channel_config_idx` bounded FIFO (`MaxWaitingDiscoveryRequests`,
/// default 5, §6 invariant 5).
pub struct DiscoveryRequestQueue {
    queues: HashMap<u32, VecDeque<DiscoveryRequest>>,
    cap: usize,
}

impl DiscoveryRequestQueue {
    /// Build a queue capped at `cap` entries per channel configuration.
    pub fn new(cap: usize) -> Self {
        Self { queues: HashMap::new(), cap }
    }

    /// Number of entries currently queued for `channel_config_idx`.
    pub fn len(&self, channel_config_idx: u32) -> usize {
        self.queues.get(&channel_config_idx).map(VecDeque::len).unwrap_or(0)
    }

    /// `true` if `channel_config_idx` has no queued entries.
    pub fn is_empty(&self, channel_config_idx: u32) -> bool {
        self.len(channel_config_idx) == 0
    }

    /// Enqueue a request for `channel_config_idx`. Rejected with
    /// `BadOutOfMemory` once the per-config cap is reached (invariant 5).
    pub fn enqueue(
        &mut self,
        channel_config_idx: u32,
        request: DiscoveryRequest,
    ) -> Result<(), StatusCode> {
        let queue = self.queues.entry(channel_config_idx).or_default();
        if queue.len() >= self.cap {
            return Err(StatusCode::BadOutOfMemory);
        }
        queue.push_back(request);
        Ok(())
    }

    fn drain(&mut self, channel_config_idx: u32) -> VecDeque<DiscoveryRequest> {
        self.queues.remove(&channel_config_idx).unwrap_or_default()
    }

    /// "Channel connected" (§4.8): drain `channel_config_idx` in enqueue
    /// order, posting each onto `secure_channels` as
    /// [`SEND_DISCOVERY_REQUEST`]. A post that fails (allocation failure at
    /// the Looper boundary) is reported as `SendRequestFailed(OutOfMemory)`
    /// and the message is dropped rather than retried.
    pub fn on_channel_connected(
        &mut self,
        channel_config_idx: u32,
        secure_channels: &LooperHandle,
        dispatcher: &ApplicationDispatcher,
    ) {
        for request in self.drain(channel_config_idx) {
            let message_type = request.message_type;
            let app_context = request.app_context;
            let event = Event::new(SEND_DISCOVERY_REQUEST, channel_config_idx)
                .with_owned(request.message);
            if secure_channels.post(event, PostMode::Fail).is_err() {
                let _ = dispatcher.post(
                    AppEvent::SendRequestFailed {
                        status: StatusCode::BadOutOfMemory,
                        message_type,
                        app_context,
                    },
                    PostMode::WarnAndDrop,
                );
            }
        }
    }

    /// "Final connection failure" (§4.8): every queued entry for
    /// `channel_config_idx` becomes `SendRequestFailed(Closed)` and is freed,
    /// in enqueue order.
    pub fn on_connection_failed(
        &mut self,
        channel_config_idx: u32,
        dispatcher: &ApplicationDispatcher,
    ) {
        for request in self.drain(channel_config_idx) {
            let _ = dispatcher.post(
                AppEvent::SendRequestFailed {
                    status: StatusCode::BadClosed,
                    message_type: request.message_type,
                    app_context: request.app_context,
                },
                PostMode::WarnAndDrop,
            );
        }
    }

    /// Shutdown (§4.8): free every queue without notifying the application.
    pub fn shutdown(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn request(app_context: u64) -> DiscoveryRequest {
        DiscoveryRequest {
            message: Box::new(()),
            message_type: MessageType::FindServers,
            app_context,
        }
    }

    #[test]
    fn enqueue_past_the_cap_is_rejected() {
        let mut queue = DiscoveryRequestQueue::new(2);
        queue.enqueue(7, request(1)).unwrap();
        queue.enqueue(7, request(2)).unwrap();
        assert_eq!(queue.enqueue(7, request(3)), Err(StatusCode::BadOutOfMemory));
        assert_eq!(queue.len(7), 2);
    }

    #[test]
    fn separate_channel_configs_have_independent_queues() {
        let mut queue = DiscoveryRequestQueue::new(1);
        queue.enqueue(1, request(1)).unwrap();
        queue.enqueue(2, request(2)).unwrap();
        assert_eq!(queue.len(1), 1);
        assert_eq!(queue.len(2), 1);
    }

    #[tokio::test]
    async fn channel_connected_drains_in_enqueue_order() {
        let mut queue = DiscoveryRequestQueue::new(5);
        queue.enqueue(7, request(1)).unwrap();
        queue.enqueue(7, request(2)).unwrap();

        let (tx, rx) = mpsc::channel::<u32>();
        let (secure_channels, join) = opcua_core::Looper::spawn("sc", 16, move |e: Event| {
            tx.send(e.id).unwrap();
        });
        let (dispatcher, dispatcher_join) = ApplicationDispatcher::spawn(16);

        queue.on_channel_connected(7, &secure_channels, &dispatcher);
        assert!(queue.is_empty(7));

        secure_channels.close();
        join.await.unwrap();
        dispatcher.close();
        dispatcher_join.await.unwrap();

        let received: Vec<u32> = rx.try_iter().collect();
        assert_eq!(received, vec![7, 7]);
    }

    #[tokio::test]
    async fn final_connection_failure_fails_every_entry_as_closed() {
        let mut queue = DiscoveryRequestQueue::new(5);
        queue.enqueue(7, request(10)).unwrap();
        queue.enqueue(7, request(11)).unwrap();

        let (dispatcher, join) = ApplicationDispatcher::spawn(16);
        let (tx, rx) = mpsc::channel::<AppEvent>();
        dispatcher.set_callback(move |event| {
            let _ = tx.send(event);
        });

        queue.on_connection_failed(7, &dispatcher);
        assert!(queue.is_empty(7));

        dispatcher.close();
        join.await.unwrap();

        let received: Vec<u64> = rx
            .try_iter()
            .map(|e| match e {
                AppEvent::SendRequestFailed { status, app_context, .. } => {
                    assert_eq!(status, StatusCode::BadClosed);
                    app_context
                }
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(received, vec![10, 11]);
    }

    #[test]
    fn shutdown_frees_without_notifying() {
        let mut queue = DiscoveryRequestQueue::new(5);
        queue.enqueue(7, request(1)).unwrap();
        queue.shutdown();
        assert!(queue.is_empty(7));
    }
}
