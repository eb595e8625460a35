//! Single-assignment completion signals.
//!
//! Every request/response exchange owns exactly one [`CompletionFuture`]. The
//! I/O side resolves it (success, or one terminal [`TransportError`]) and the
//! calling layer observes the outcome either by awaiting the paired
//! [`Completion`] or through a [`CompletionListener`] callback.
//!
//! Timeouts, peer closures and write completions race each other. Resolution
//! is guarded by a compare-and-swap on a `resolved` flag: the first caller wins
//! and every later call is a no-op that returns `false`. Only the winner ever
//! touches the notification slot, so its lock is never contended.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;
use tracing::trace;
use triomphe::Arc;

use crate::protocol::TransportError;

/// Callback side of a completion.
pub trait CompletionListener<T>: Send {
    fn on_success(self: Box<Self>, value: T);

    fn on_error(self: Box<Self>, error: TransportError);
}

enum Notify<T> {
    Channel(oneshot::Sender<Result<T, TransportError>>),
    Listener(Box<dyn CompletionListener<T>>),
}

struct Shared<T> {
    resolved: AtomicBool,
    notify: Mutex<Option<Notify<T>>>,
}

/// Resolver side of a completion, cheap to clone.
pub struct CompletionFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CompletionFuture<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> fmt::Debug for CompletionFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionFuture").field("resolved", &self.is_resolved()).finish()
    }
}

impl<T> CompletionFuture<T> {
    pub fn is_resolved(&self) -> bool {
        self.shared.resolved.load(Ordering::Acquire)
    }
}

impl<T: Send> CompletionFuture<T> {
    /// Creates a resolver and the future that observes it.
    pub fn channel() -> (CompletionFuture<T>, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        (Self::from_notify(Notify::Channel(tx)), Completion { rx })
    }

    /// Creates a resolver that reports to `listener`.
    pub fn with_listener<L>(listener: L) -> Self
    where
        L: CompletionListener<T> + 'static,
    {
        Self::from_notify(Notify::Listener(Box::new(listener)))
    }

    fn from_notify(notify: Notify<T>) -> Self {
        Self { shared: Arc::new(Shared { resolved: AtomicBool::new(false), notify: Mutex::new(Some(notify)) }) }
    }

    /// Resolves with success. Returns `false` if already resolved.
    pub fn notify_success(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolves with an error. Returns `false` if already resolved.
    pub fn notify_error(&self, error: TransportError) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, result: Result<T, TransportError>) -> bool {
        if self.shared.resolved.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            trace!("completion already resolved, ignore later notification");
            return false;
        }

        let notify = self.shared.notify.lock().unwrap_or_else(PoisonError::into_inner).take();
        match (notify, result) {
            (Some(Notify::Channel(tx)), result) => {
                // the awaiting side may have given up, that is not our concern
                let _ = tx.send(result);
            }
            (Some(Notify::Listener(listener)), Ok(value)) => listener.on_success(value),
            (Some(Notify::Listener(listener)), Err(error)) => listener.on_error(error),
            (None, _) => {}
        }
        true
    }
}

/// Awaitable side of a completion.
///
/// Resolves to [`TransportError::Abandoned`] when every resolver was dropped
/// without resolving.
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, TransportError>>,
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T> Completion<T> {
    /// Returns the outcome if it is already known, without waiting.
    pub fn try_take(&mut self) -> Option<Result<T, TransportError>> {
        match self.rx.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(_canceled) => Some(Err(TransportError::Abandoned)),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_canceled)) => Poll::Ready(Err(TransportError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
