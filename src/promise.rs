//! Callback-to-future bridge.
//!
//! A `Promise<T>` is the awaitable half of a one-shot channel. The other half,
//! `Settler<T>`, is handed to a callback-driven operation which calls exactly one
//! of `resolve` / `reject`. Settling twice is a programming error and panics.
//!
//! There is no cancellation. Dropping the promise only abandons interest in the
//! outcome; the operation behind the settler keeps running until it settles.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{PipelineError, PipelineResult};

/// Observable settlement state of a promise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Resolved,
    Rejected,
}

type Outcome<T> = PipelineResult<T>;

struct SettleSlot<T> {
    sender: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
    state: Arc<Mutex<PromiseState>>,
}

impl<T> Drop for SettleSlot<T> {
    fn drop(&mut self) {
        // Last settler went away without settling.
        if lock(&self.sender).is_some() {
            *lock(&self.state) = PromiseState::Rejected;
        }
    }
}

/// Completion handle for a pending [`Promise`].
///
/// Clones share one slot, so a success callback and a failure callback can each
/// hold a copy. Whichever fires first settles the promise.
pub struct Settler<T> {
    slot: Arc<SettleSlot<T>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Settler<T> {
    /// Settle with a value.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value), PromiseState::Resolved);
    }

    /// Settle with an error.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already settled.
    pub fn reject(&self, error: PipelineError) {
        self.settle(Err(error), PromiseState::Rejected);
    }

    /// Returns true once either `resolve` or `reject` has been called.
    pub fn is_settled(&self) -> bool {
        lock(&self.slot.sender).is_none()
    }

    fn settle(&self, outcome: Outcome<T>, next: PromiseState) {
        let sender = lock(&self.slot.sender).take();
        let Some(sender) = sender else {
            panic!("promise settled twice (second settlement: {:?})", next);
        };
        // The outcome must be receivable before the state reports it.
        if sender.send(outcome).is_err() {
            log::debug!("promise settled after the awaiting side was dropped");
        }
        *lock(&self.slot.state) = next;
    }
}

/// Single-await future fed by a [`Settler`].
pub struct Promise<T> {
    receiver: oneshot::Receiver<Outcome<T>>,
    state: Arc<Mutex<PromiseState>>,
    outcome: Option<Outcome<T>>,
}

// `T` is only ever held by value and never pinned.
impl<T> Unpin for Promise<T> {}

/// Create a connected settler/promise pair.
pub fn channel<T>() -> (Settler<T>, Promise<T>) {
    let (sender, receiver) = oneshot::channel();
    let state = Arc::new(Mutex::new(PromiseState::Pending));
    let settler = Settler {
        slot: Arc::new(SettleSlot {
            sender: Mutex::new(Some(sender)),
            state: Arc::clone(&state),
        }),
    };
    let promise = Promise {
        receiver,
        state,
        outcome: None,
    };
    (settler, promise)
}

impl<T> Promise<T> {
    /// Start a callback-driven operation and return its promise.
    ///
    /// `start` runs immediately and receives the settler.
    pub fn new<F>(start: F) -> Self
    where
        F: FnOnce(Settler<T>),
    {
        let (settler, promise) = channel();
        start(settler);
        promise
    }

    /// Current settlement state. Never blocks.
    pub fn state(&self) -> PromiseState {
        *lock(&self.state)
    }

    /// True when the promise settled successfully.
    pub fn is_resolved(&self) -> bool {
        self.state() == PromiseState::Resolved
    }

    /// Resolved value, if the promise has settled successfully. Never blocks.
    pub fn try_result(&mut self) -> Option<&T> {
        self.refresh();
        match &self.outcome {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// Await the outcome, failing with `Timeout` after `limit`.
    ///
    /// The underlying operation is not aborted on timeout.
    pub async fn with_timeout(self, limit: Duration) -> PipelineResult<T> {
        match tokio::time::timeout(limit, self).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout(limit)),
        }
    }

    fn refresh(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        match self.receiver.try_recv() {
            Ok(outcome) => self.outcome = Some(outcome),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Closed) => self.outcome = Some(Err(abandoned())),
        }
    }
}

impl<T> Future for Promise<T> {
    type Output = PipelineResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.outcome.take() {
            return Poll::Ready(outcome);
        }
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(abandoned())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Run a blocking transfer on the runtime's blocking pool and expose it as a promise.
///
/// Must be called from within a tokio runtime.
pub fn spawn_transfer<T, F>(transfer: F) -> Promise<T>
where
    T: Send + 'static,
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
{
    Promise::new(|settler| {
        tokio::task::spawn_blocking(move || match transfer() {
            Ok(value) => settler.resolve(value),
            Err(err) => settler.reject(err),
        });
    })
}

fn abandoned() -> PipelineError {
    PipelineError::TransferFailed("operation ended without settling".to_string())
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_through_settler() {
        let promise = Promise::new(|settler| settler.resolve(7u32));
        assert!(promise.is_resolved());
        assert_eq!(promise.await, Ok(7));
    }

    #[tokio::test]
    async fn rejects_through_settler() {
        let promise: Promise<u32> =
            Promise::new(|settler| settler.reject(PipelineError::ServiceError("x".into())));
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(
            promise.await,
            Err(PipelineError::ServiceError("x".into()))
        );
    }

    #[test]
    fn pending_until_settled() {
        let (settler, mut promise) = channel::<String>();
        assert_eq!(promise.state(), PromiseState::Pending);
        assert!(promise.try_result().is_none());

        settler.resolve("done".to_string());
        assert_eq!(promise.state(), PromiseState::Resolved);
        assert_eq!(promise.try_result().map(String::as_str), Some("done"));
    }

    #[test]
    fn resolved_state_implies_value_is_readable() {
        for round in 0..200u32 {
            let (settler, mut promise) = channel::<u32>();
            let worker = std::thread::spawn(move || settler.resolve(round));
            loop {
                if promise.state() == PromiseState::Resolved {
                    assert_eq!(promise.try_result(), Some(&round));
                    break;
                }
                std::thread::yield_now();
            }
            worker.join().unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "promise settled twice")]
    fn double_settlement_panics() {
        let (settler, _promise) = channel::<u8>();
        let failure = settler.clone();
        settler.resolve(1);
        failure.reject(PipelineError::TransferFailed("late".into()));
    }

    #[tokio::test]
    async fn dropped_settler_rejects() {
        let (settler, promise) = channel::<u8>();
        drop(settler);
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert!(matches!(
            promise.await,
            Err(PipelineError::TransferFailed(_))
        ));
    }

    #[tokio::test]
    async fn spawned_transfer_settles() {
        let promise = spawn_transfer(|| Ok::<_, PipelineError>(vec![1u8, 2, 3]));
        assert_eq!(promise.await, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn timeout_does_not_wait_forever() {
        let (_settler, promise) = channel::<u8>();
        let limit = Duration::from_millis(20);
        assert_eq!(
            promise.with_timeout(limit).await,
            Err(PipelineError::Timeout(limit))
        );
    }
}
