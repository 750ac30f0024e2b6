//! Lifecycle state for a single asynchronous fetch/mutation slot.
//!
//! [`AsyncState`] is the tagged union every screen renders from; a refresh
//! never blanks the screen because previously successful data rides along in
//! `Loading`, `Refreshing`, and `Failure`.  [`StateCell`] wraps one slot in a
//! `tokio::sync::watch` channel so observers see exactly one state value at a
//! time, and stamps every request with a monotonic token so a superseded
//! request's completion is discarded — the last issued request wins.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::facade::{ApiError, ApiResult};

/// Lifecycle of one remote operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncState<T> {
    /// No request issued yet.
    Idle,
    /// First fetch (or retry) in flight; `stale` carries last known good data
    /// for display continuity.
    Loading { stale: Option<T> },
    /// A manual re-fetch in flight with current data still on screen.
    Refreshing { data: T },
    Success { data: T },
    /// The request failed; `data` preserves stale content so the UI can show
    /// it under an error banner instead of blanking.
    Failure { error: ApiError, data: Option<T> },
}

impl<T> AsyncState<T> {
    /// Whatever data this state carries, fresh or stale.
    pub fn data(&self) -> Option<&T> {
        match self {
            AsyncState::Idle => None,
            AsyncState::Loading { stale } => stale.as_ref(),
            AsyncState::Refreshing { data } => Some(data),
            AsyncState::Success { data } => Some(data),
            AsyncState::Failure { data, .. } => data.as_ref(),
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            AsyncState::Idle => None,
            AsyncState::Loading { stale } => stale,
            AsyncState::Refreshing { data } => Some(data),
            AsyncState::Success { data } => Some(data),
            AsyncState::Failure { data, .. } => data,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            AsyncState::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            AsyncState::Loading { .. } | AsyncState::Refreshing { .. }
        )
    }

    /// Transition on request start.  Total over every state:
    ///
    /// - `Idle` → `Loading` with no data
    /// - `Success` → `Refreshing`, retaining data
    /// - `Failure` → `Loading`, retaining last known good data (retry)
    /// - already in flight → unchanged (the new request's token supersedes
    ///   the old one; see [`StateCell`])
    pub fn begin(self) -> AsyncState<T> {
        match self {
            AsyncState::Idle => AsyncState::Loading { stale: None },
            AsyncState::Success { data } => AsyncState::Refreshing { data },
            AsyncState::Failure { data, .. } => AsyncState::Loading { stale: data },
            in_flight => in_flight,
        }
    }

    /// Transition on successful completion.
    pub fn complete_ok(self, data: T) -> AsyncState<T> {
        AsyncState::Success { data }
    }

    /// Transition on failed completion, preserving any data the current
    /// state carries.
    pub fn complete_err(self, error: ApiError) -> AsyncState<T> {
        AsyncState::Failure {
            error,
            data: self.into_data(),
        }
    }
}

/// Token identifying one issued request.  Only the most recently issued
/// token's completion is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

/// A single observable state slot with last-request-wins semantics.
///
/// Intended for a single logical writer (the owning screen actor); observers
/// subscribe through the watch channel and always see one coherent state
/// value, never an intermediate flicker.
pub struct StateCell<T> {
    tx: watch::Sender<AsyncState<T>>,
    seq: AtomicU64,
}

impl<T: Clone> Default for StateCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> StateCell<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AsyncState::Idle);
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AsyncState<T>> {
        self.tx.subscribe()
    }

    /// Current state, cloned out of the channel.
    pub fn snapshot(&self) -> AsyncState<T> {
        self.tx.borrow().clone()
    }

    /// Begin a new request: applies [`AsyncState::begin`] and issues a fresh
    /// token.  Any outstanding request is superseded from this point on.
    pub fn begin(&self) -> RequestToken {
        let token = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .send_modify(|state| *state = mem::replace(state, AsyncState::Idle).begin());
        RequestToken(token)
    }

    /// Begin a new request seeding `stale` data when the slot is empty
    /// (cold start from a local cache).  The seeded `Loading` state is
    /// published as a single transition; observers never see an unseeded
    /// `Loading` in between.
    pub fn begin_with_stale(&self, stale: T) -> RequestToken {
        let token = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_modify(|state| {
            let mut next = mem::replace(state, AsyncState::Idle).begin();
            if let AsyncState::Loading { stale: slot @ None } = &mut next {
                *slot = Some(stale);
            }
            *state = next;
        });
        RequestToken(token)
    }

    /// Apply a request's outcome.  Returns false (and changes nothing) when
    /// the token has been superseded by a newer request — an out-of-order
    /// older response never overwrites state set by a more recent request.
    pub fn complete(&self, token: RequestToken, result: ApiResult<T>) -> bool {
        if token.0 != self.seq.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send_modify(|state| {
            let current = mem::replace(state, AsyncState::Idle);
            *state = match result {
                Ok(data) => current.complete_ok(data),
                Err(error) => current.complete_err(error),
            };
        });
        true
    }

    /// Replace the slot with fresh successful data outside the request
    /// cycle (a mutation reconciled in completion order).
    pub fn set_success(&self, data: T) {
        self.tx
            .send_modify(|state| *state = AsyncState::Success { data });
    }

    /// Surface a mutation failure while keeping current data visible.
    pub fn fail_keeping_data(&self, error: ApiError) {
        self.tx.send_modify(|state| {
            let current = mem::replace(state, AsyncState::Idle);
            *state = current.complete_err(error);
        });
    }

    /// Transform whatever data the slot currently carries.  Returns false if
    /// there is none.
    pub fn mutate_data(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut applied = false;
        self.tx.send_modify(|state| {
            let data = match state {
                AsyncState::Loading { stale } => stale.as_mut(),
                AsyncState::Refreshing { data } => Some(data),
                AsyncState::Success { data } => Some(data),
                AsyncState::Failure { data, .. } => data.as_mut(),
                AsyncState::Idle => None,
            };
            if let Some(data) = data {
                f(data);
                applied = true;
            }
        });
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_err() -> ApiError {
        ApiError::Network("connection refused".to_string())
    }

    #[test]
    fn test_begin_from_idle_has_no_stale_data() {
        let state: AsyncState<u32> = AsyncState::Idle.begin();
        assert_eq!(state, AsyncState::Loading { stale: None });
    }

    #[test]
    fn test_refresh_retains_data() {
        let state = AsyncState::Success { data: 42 }.begin();
        assert_eq!(state, AsyncState::Refreshing { data: 42 });
        assert_eq!(state.data(), Some(&42));
    }

    #[test]
    fn test_retry_from_failure_keeps_last_known_good() {
        let failed = AsyncState::Failure {
            error: net_err(),
            data: Some(42),
        };
        let state = failed.begin();
        assert_eq!(state, AsyncState::Loading { stale: Some(42) });
    }

    #[test]
    fn test_begin_while_in_flight_is_a_no_op_transition() {
        let loading: AsyncState<u32> = AsyncState::Loading { stale: Some(1) };
        assert_eq!(loading.clone().begin(), loading);
        let refreshing = AsyncState::Refreshing { data: 2 };
        assert_eq!(refreshing.clone().begin(), refreshing);
    }

    #[test]
    fn test_failure_preserves_data_from_refreshing() {
        let state = AsyncState::Refreshing { data: 42 }.complete_err(net_err());
        assert_eq!(
            state,
            AsyncState::Failure {
                error: net_err(),
                data: Some(42),
            }
        );
    }

    #[test]
    fn test_cell_happy_path() {
        let cell = StateCell::new();
        let token = cell.begin();
        assert!(cell.snapshot().is_in_flight());
        assert!(cell.complete(token, Ok(42)));
        assert_eq!(cell.snapshot(), AsyncState::Success { data: 42 });
    }

    #[test]
    fn test_last_request_wins() {
        let cell = StateCell::new();
        let a = cell.begin();
        let b = cell.begin();

        // B (newer) completes first.
        assert!(cell.complete(b, Ok(2)));
        assert_eq!(cell.snapshot(), AsyncState::Success { data: 2 });

        // A's late completion is discarded.
        assert!(!cell.complete(a, Ok(1)));
        assert_eq!(cell.snapshot(), AsyncState::Success { data: 2 });
    }

    #[test]
    fn test_superseded_failure_is_discarded_too() {
        let cell = StateCell::new();
        let a = cell.begin();
        let b = cell.begin();
        assert!(!cell.complete(a, Err(net_err())));
        assert!(cell.complete(b, Ok(7)));
        assert_eq!(cell.snapshot(), AsyncState::Success { data: 7 });
    }

    #[test]
    fn test_begin_with_stale_seeds_empty_slot_only() {
        let cell = StateCell::new();
        let token = cell.begin_with_stale(10);
        assert_eq!(cell.snapshot(), AsyncState::Loading { stale: Some(10) });
        assert!(cell.complete(token, Ok(11)));

        // Once the slot holds data, begin() goes through Refreshing and the
        // cached seed is not consulted.
        cell.begin_with_stale(99);
        assert_eq!(cell.snapshot(), AsyncState::Refreshing { data: 11 });
    }

    #[test]
    fn test_begin_with_stale_publishes_one_seeded_transition() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();
        rx.borrow_and_update();

        cell.begin_with_stale(10);
        // The first value visible after the call already carries the seed;
        // there is no unseeded Loading published on the channel.
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            AsyncState::Loading { stale: Some(10) }
        );
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_watch_observers_see_single_values() {
        let cell = StateCell::new();
        let rx = cell.subscribe();
        let token = cell.begin();
        cell.complete(token, Ok(5));
        // The receiver observes the latest coherent value, not a backlog.
        assert_eq!(*rx.borrow(), AsyncState::Success { data: 5 });
    }

    #[test]
    fn test_mutate_data_reaches_stale_and_fresh_variants() {
        let cell = StateCell::new();
        assert!(!cell.mutate_data(|_: &mut u32| {}));

        let token = cell.begin();
        cell.complete(token, Ok(1));
        assert!(cell.mutate_data(|d| *d += 1));
        assert_eq!(cell.snapshot(), AsyncState::Success { data: 2 });

        cell.fail_keeping_data(net_err());
        assert!(cell.mutate_data(|d| *d += 1));
        assert_eq!(cell.snapshot().data(), Some(&3));
        assert_eq!(cell.snapshot().error(), Some(&net_err()));
    }
}
