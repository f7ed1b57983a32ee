// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Event Bus / Looper (C1): a single-threaded FIFO dispatcher owning one
//! queue and one worker, with a privileged "as-next" lane for events that must
//! jump ahead of whatever is already queued (server-inactivation signals ahead
//! of pending publish responses, per §4.1/§5).
//!
//! Three Loopers exist in a full deployment: *Secure-Channels*, *Services*, and
//! *Application*. The Session State Machine (C5) runs entirely on the
//! *Services* Looper; see `opcua-session`.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::errors::CoreError;

/// The payload carried in an [`Event`]'s `params`/`aux` slots.
///
/// Mirrors the source's `uintptr_t`-as-either-scalar-or-pointer trick (§9
/// Design Notes) as a safe tagged variant: [`EventParam::Owned`] is the
/// "moved" ownership tag (the receiver drops it on consumption or on an
/// error path), [`EventParam::Shared`] is the "borrowed" tag (the poster
/// keeps its own `Arc` and the receiver's clone never outlives the bus's
/// bookkeeping of it). The bus itself never inspects payload contents.
pub enum EventParam {
    /// No payload.
    Empty,
    /// A plain scalar, e.g. a session id or status code ordinal.
    Scalar(u64),
    /// An owned payload; the receiver is responsible for dropping it.
    Owned(Box<dyn Any + Send>),
    /// A shared payload; the poster retains its own handle.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for EventParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventParam::Empty => write!(f, "Empty"),
            EventParam::Scalar(v) => write!(f, "Scalar({v})"),
            EventParam::Owned(_) => write!(f, "Owned(..)"),
            EventParam::Shared(_) => write!(f, "Shared(..)"),
        }
    }
}

/// One event posted through a [`Looper`]. `kind` distinguishes event families
/// (e.g. `SC_RECV`, `TIMER_EVAL_TIMEOUT`); `id` is a family-specific
/// discriminant (commonly a session id).
#[derive(Debug)]
pub struct Event {
    /// Event family.
    pub kind: u32,
    /// Family-specific discriminant, e.g. a session id.
    pub id: u32,
    /// Primary payload.
    pub params: EventParam,
    /// Secondary payload.
    pub aux: EventParam,
}

impl Event {
    /// Construct an event with no payload.
    pub fn new(kind: u32, id: u32) -> Self {
        Self {
            kind,
            id,
            params: EventParam::Empty,
            aux: EventParam::Empty,
        }
    }

    /// Attach an owned payload.
    pub fn with_owned(mut self, payload: Box<dyn Any + Send>) -> Self {
        self.params = EventParam::Owned(payload);
        self
    }

    /// Attach a shared payload.
    pub fn with_shared(mut self, payload: Arc<dyn Any + Send + Sync>) -> Self {
        self.params = EventParam::Shared(payload);
        self
    }

    /// Attach a scalar aux value (commonly a status code or secondary id).
    pub fn with_aux_scalar(mut self, value: u64) -> Self {
        self.aux = EventParam::Scalar(value);
        self
    }
}

/// What happens when [`LooperHandle::post`] finds the queue at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMode {
    /// Return `Err(CoreError::QueueFull)`.
    Fail,
    /// Log a warning and silently drop the event, returning `Ok(())`.
    WarnAndDrop,
}

/// Error surface for [`LooperHandle::post`]/[`LooperHandle::post_as_next`].
pub type LooperError = CoreError;

/// A handler attached to a [`Looper`]. `handle` runs synchronously and in
/// isolation: per §5, "within a handler, all operations are synchronous
/// (including crypto)", so handlers must not block longer than ~10ms.
pub trait Handler: Send + 'static {
    /// Process one event. Runs on the Looper's dedicated worker task; no two
    /// handlers on one Looper ever execute concurrently.
    fn handle(&mut self, event: Event);
}

impl<F> Handler for F
where
    F: FnMut(Event) + Send + 'static,
{
    fn handle(&mut self, event: Event) {
        (self)(event)
    }
}

struct Inner {
    queue: Mutex<VecDeque<Event>>,
    len: AtomicUsize,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    name: &'static str,
}

/// A cloneable handle used to post events onto a [`Looper`]'s queue. Posting
/// is total: it never blocks, it either succeeds, is dropped with a warning,
/// or is rejected with `QueueFull` once `capacity` events are outstanding.
#[derive(Clone)]
pub struct LooperHandle {
    inner: Arc<Inner>,
}

impl LooperHandle {
    /// Post `event` at the tail of the queue (normal priority).
    pub fn post(&self, event: Event, mode: PostMode) -> Result<(), LooperError> {
        self.post_inner(event, mode, false)
    }

    /// Post `event` ahead of every already-queued normal-priority event
    /// (privileged "as-next" lane, §4.1/§4.3's inactivation-before-publish
    /// ordering).
    pub fn post_as_next(&self, event: Event, mode: PostMode) -> Result<(), LooperError> {
        self.post_inner(event, mode, true)
    }

    fn post_inner(&self, event: Event, mode: PostMode, as_next: bool) -> Result<(), LooperError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CoreError::Closed);
        }
        if self.inner.len.load(Ordering::Acquire) >= self.inner.capacity {
            return match mode {
                PostMode::Fail => Err(CoreError::QueueFull),
                PostMode::WarnAndDrop => {
                    log::warn!(
                        "looper[{}]: queue full at capacity {}, dropping event kind={} id={}",
                        self.inner.name,
                        self.inner.capacity,
                        event.kind,
                        event.id
                    );
                    Ok(())
                }
            };
        }
        {
            let mut q = self.inner.queue.lock();
            if as_next {
                q.push_front(event);
            } else {
                q.push_back(event);
            }
        }
        self.inner.len.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Number of events currently queued (normal + as-next lanes combined).
    pub fn queue_len(&self) -> usize {
        self.inner.len.load(Ordering::Acquire)
    }

    /// Signal the worker to stop once the queue drains, without posting a
    /// final event. Further posts return `CoreError::Closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

/// Owns one FIFO queue and spawns the worker task that drains it into a
/// [`Handler`]. Three of these make up a full deployment's event bus:
/// Secure-Channels, Services, Application (§4.1).
pub struct Looper;

impl Looper {
    /// Spawn a Looper's worker task with capacity `capacity`
    /// (`MaxAsyncQueueElements`, default 5000) and return a handle to post
    /// events, plus the worker's `JoinHandle`.
    pub fn spawn<H: Handler>(
        name: &'static str,
        capacity: usize,
        mut handler: H,
    ) -> (LooperHandle, JoinHandle<()>) {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            name,
        });
        let worker_inner = inner.clone();
        let join = tokio::spawn(async move {
            loop {
                let next = worker_inner.queue.lock().pop_front();
                match next {
                    Some(event) => {
                        worker_inner.len.fetch_sub(1, Ordering::AcqRel);
                        handler.handle(event);
                    }
                    None => {
                        if worker_inner.closed.load(Ordering::Acquire) {
                            break;
                        }
                        worker_inner.notify.notified().await;
                    }
                }
            }
        });
        (LooperHandle { inner }, join)
    }
}
