//! Request fencing for view controllers.
//!
//! Every fetch a view issues takes a [`RequestTicket`] stamped with the
//! view's current generation. Issuing a newer ticket supersedes the older
//! ones, and tearing the view down cancels whatever is still in flight. A
//! response is applied only if its ticket is still the latest and the view is
//! still alive.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Generation stamp of one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// Per-view generation counter and cancellation signal.
///
/// Cheaply cloneable; clones fence the same view.
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    inner: Arc<ScopeInner>,
}

#[derive(Debug, Default)]
struct ScopeInner {
    generation: AtomicU64,
    cancel: CancellationToken,
}

impl ViewScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for a new request, superseding every earlier one.
    pub fn issue(&self) -> RequestTicket {
        RequestTicket(self.inner.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
    }

    /// Whether a response for `ticket` may still be applied.
    #[must_use]
    pub fn accepts(&self, ticket: RequestTicket) -> bool {
        !self.is_torn_down() && self.inner.generation.load(Ordering::Acquire) == ticket.0
    }

    /// Run `fut` unless the view is torn down first.
    ///
    /// Returns `None` if the view was torn down; the future is dropped, which
    /// aborts the underlying request.
    pub async fn until_torn_down<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            () = self.inner.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }

    /// Cancel everything in flight and reject all future responses.
    pub fn tear_down(&self) {
        self.inner.cancel.cancel();
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Token cancelled when the view is torn down, for background watchers.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }
}
