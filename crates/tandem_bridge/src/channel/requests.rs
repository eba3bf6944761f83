//! # Request Correlation
//!
//! ```text
//! issue()  ── id #7 ──▶ table[#7] = callback ──▶ RAYCAST_REQUEST{#7}
//!                                                       │
//! resolve(#7, hits) ◀──────────── RAYCAST_RESPONSE{#7} ─┘
//!     └─▶ callback(hits), table[#7] removed
//! resolve(#7, ...) again ─▶ unknown id, warn and drop
//! ```
//!
//! There is no timeout. A caller that gives up drops its ticket; the entry
//! resolves into nothing when the reply arrives, or is removed with
//! [`PendingRequests::abandon`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tandem_shared::RequestId;
use tokio::sync::oneshot;

type Completion<R> = Box<dyn FnOnce(R) + Send>;

/// Pending request table for one reply type.
///
/// Identifiers increase monotonically and are never reused.
pub struct PendingRequests<R> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<RequestId, Completion<R>>>,
}

impl<R: Send + 'static> PendingRequests<R> {
    /// Creates an empty table. The first id is `#1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `on_reply` under a fresh identifier.
    pub fn issue(&self, on_reply: impl FnOnce(R) + Send + 'static) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().insert(id, Box::new(on_reply));
        id
    }

    /// Registers a request whose reply is delivered to a ticket.
    pub fn ticket(&self) -> RequestTicket<R> {
        let (tx, rx) = oneshot::channel();
        let id = self.issue(move |reply| {
            // The caller may have dropped its ticket
            let _ = tx.send(reply);
        });
        RequestTicket { id, rx }
    }

    /// Delivers a reply to the matching entry and removes it.
    ///
    /// Unknown identifiers (late, duplicate or abandoned) are dropped.
    ///
    /// # Returns
    ///
    /// true if an entry was resolved.
    pub fn resolve(&self, id: RequestId, reply: R) -> bool {
        // Run the callback outside the lock
        let entry = self.entries.lock().remove(&id);
        match entry {
            Some(on_reply) => {
                on_reply(reply);
                true
            }
            None => {
                tracing::warn!(%id, "reply for unknown request dropped");
                false
            }
        }
    }

    /// Removes an entry without running it.
    pub fn abandon(&self, id: RequestId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Returns the number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<R: Send + 'static> Default for PendingRequests<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a reply that has not arrived yet.
///
/// Suspends only its holder: poll it each frame with [`Self::try_take`],
/// `.await` it with [`Self::wait`], or block a helper thread with
/// [`Self::blocking_wait`].
pub struct RequestTicket<R> {
    id: RequestId,
    rx: oneshot::Receiver<R>,
}

impl<R> RequestTicket<R> {
    /// Identifier carried by the request.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Takes the reply if it has arrived.
    pub fn try_take(&mut self) -> Option<R> {
        self.rx.try_recv().ok()
    }

    /// Waits for the reply.
    ///
    /// Resolves to None if the entry was abandoned or the table dropped.
    pub async fn wait(self) -> Option<R> {
        self.rx.await.ok()
    }

    /// Blocks the current thread until the reply arrives.
    ///
    /// Never call this from the context that pumps events; it would wait on
    /// itself. Returns None if the entry was abandoned.
    pub fn blocking_wait(self) -> Option<R> {
        self.rx.blocking_recv().ok()
    }
}
