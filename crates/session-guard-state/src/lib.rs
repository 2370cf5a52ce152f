#![warn(missing_docs)]
//! # session-guard-state
//!
//! ## Purpose
//! Holds the single process-wide [`AuthState`] and publishes every change to
//! subscribers.
//!
//! ## Responsibilities
//! - Own the current user/session/loading/error value.
//! - Deliver each mutation to subscribers in subscription order.
//! - Keep notification passes stable when subscribers come and go mid-pass.
//!
//! ## Data flow
//! The auth gateway calls [`AuthStateBroadcaster::set_user`],
//! [`AuthStateBroadcaster::set_error`] and
//! [`AuthStateBroadcaster::set_loading`]. The session monitor and presentation
//! layer read [`AuthStateBroadcaster::current`] or register callbacks with
//! [`AuthStateBroadcaster::subscribe`].
//!
//! ## Ownership and lifetimes
//! Subscribers receive `&AuthState` snapshots; the broadcaster keeps the
//! authoritative copy. [`Subscription`] holds only a weak reference, so a
//! forgotten handle never keeps the broadcaster alive.
//!
//! ## Error model
//! Mutations are infallible. A poisoned lock is recovered, since the state is
//! always replaced wholesale.
//!
//! ## Security and privacy notes
//! Transition logs mention user ids and session ids only.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use session_guard_state::AuthStateBroadcaster;
//!
//! let broadcaster = AuthStateBroadcaster::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _subscription = broadcaster.subscribe(move |state| {
//!     sink.lock().unwrap().push(state.is_loading());
//! });
//! broadcaster.set_loading(false);
//! assert_eq!(*seen.lock().unwrap(), vec![false]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use session_guard_core::{AuthError, Session, User, UserSession};
use tracing::debug;

/// Snapshot of who is signed in.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    identity: Option<UserSession>,
    loading: bool,
    error: Option<AuthError>,
}

impl AuthState {
    /// State before the first session resolution completes.
    pub fn initial() -> Self {
        Self {
            identity: None,
            loading: true,
            error: None,
        }
    }

    /// Signed-in user; always `None` while loading.
    pub fn user(&self) -> Option<&User> {
        self.identity().map(|identity| &identity.user)
    }

    /// Current session; always `None` while loading.
    pub fn session(&self) -> Option<&Session> {
        self.identity().map(|identity| &identity.session)
    }

    /// User and session together; always `None` while loading.
    pub fn identity(&self) -> Option<&UserSession> {
        if self.loading {
            return None;
        }
        self.identity.as_ref()
    }

    /// Returns `true` until the first session resolution completes.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Returns `true` when a user and session are present and loading is done.
    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Most recent error surfaced by an auth operation.
    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

type Callback = Arc<dyn Fn(&AuthState) + Send + Sync>;

struct Inner {
    state: AuthState,
    pending: VecDeque<AuthState>,
    dispatching: bool,
    subscribers: Vec<(u64, Callback)>,
    next_subscriber: u64,
}

struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Single writer of [`AuthState`] with ordered publish/subscribe delivery.
///
/// A mutation made from inside a subscriber callback updates the value
/// immediately and is delivered after the current pass finishes, so every
/// subscriber observes states in the order they were written.
#[derive(Clone)]
pub struct AuthStateBroadcaster {
    shared: Arc<Shared>,
}

impl AuthStateBroadcaster {
    /// Creates a broadcaster holding [`AuthState::initial`].
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: AuthState::initial(),
                    pending: VecDeque::new(),
                    dispatching: false,
                    subscribers: Vec::new(),
                    next_subscriber: 0,
                }),
            }),
        }
    }

    /// Returns a copy of the current state.
    pub fn current(&self) -> AuthState {
        self.shared.lock().state.clone()
    }

    /// Registers `callback` for every subsequent mutation.
    ///
    /// The callback is not invoked with the current value; call
    /// [`Self::current`] for that.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let mut inner = self.shared.lock();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        debug!(subscriber = id, "auth state subscriber added");

        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
            active: true,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Sets or clears the signed-in identity.
    ///
    /// Setting an identity also clears any previous error in the same
    /// notification.
    pub fn set_user(&self, identity: Option<UserSession>) {
        self.stage_user(identity).deliver();
    }

    /// Sets or clears the surfaced error.
    pub fn set_error(&self, error: Option<AuthError>) {
        self.stage_error(error).deliver();
    }

    /// Sets the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.stage_loading(loading).deliver();
    }

    /// Like [`Self::set_user`], but subscribers run only when the returned
    /// [`PendingNotification`] is delivered or dropped.
    ///
    /// The value itself changes immediately, so callers can apply it inside
    /// their own critical section and notify after leaving it.
    pub fn stage_user(&self, identity: Option<UserSession>) -> PendingNotification {
        match &identity {
            Some(identity) => debug!(
                user = %identity.user.id,
                session = %identity.session.id,
                "auth state: signed in"
            ),
            None => debug!("auth state: signed out"),
        }
        self.stage(move |state| {
            if identity.is_some() {
                state.error = None;
            }
            state.identity = identity;
        })
    }

    /// Clears the identity and replaces the error in a single notification.
    pub fn stage_signed_out(&self, error: Option<AuthError>) -> PendingNotification {
        debug!(
            code = ?error.as_ref().map(AuthError::code),
            "auth state: signed out"
        );
        self.stage(move |state| {
            state.identity = None;
            state.error = error;
        })
    }

    /// Staged form of [`Self::set_error`].
    pub fn stage_error(&self, error: Option<AuthError>) -> PendingNotification {
        if let Some(error) = &error {
            debug!(code = %error.code(), "auth state: error recorded");
        }
        self.stage(move |state| state.error = error)
    }

    /// Staged form of [`Self::set_loading`].
    pub fn stage_loading(&self, loading: bool) -> PendingNotification {
        debug!(loading, "auth state: loading changed");
        self.stage(move |state| state.loading = loading)
    }

    fn stage<F>(&self, mutate: F) -> PendingNotification
    where
        F: FnOnce(&mut AuthState),
    {
        let mut inner = self.shared.lock();
        mutate(&mut inner.state);
        let snapshot = inner.state.clone();
        inner.pending.push_back(snapshot);
        let owner = !inner.dispatching;
        inner.dispatching = true;
        PendingNotification {
            broadcaster: self.clone(),
            owner,
        }
    }

    fn drain(&self) {
        let _dispatch = DispatchGuard {
            shared: &self.shared,
        };
        loop {
            let (snapshot, subscribers) = {
                let mut inner = self.shared.lock();
                let Some(snapshot) = inner.pending.pop_front() else {
                    inner.dispatching = false;
                    break;
                };
                let subscribers: Vec<Callback> = inner
                    .subscribers
                    .iter()
                    .map(|(_, callback)| callback.clone())
                    .collect();
                (snapshot, subscribers)
            };

            for callback in subscribers {
                callback(&snapshot);
            }
        }
    }
}

/// Notification recorded by a staged mutation and not yet delivered.
///
/// Exactly one pending notification owns the dispatch loop at a time; the
/// others were queued behind it and are delivered by that owner.
#[must_use = "subscribers are notified when this is delivered or dropped"]
pub struct PendingNotification {
    broadcaster: AuthStateBroadcaster,
    owner: bool,
}

impl PendingNotification {
    /// Runs subscribers for every queued state, in write order.
    pub fn deliver(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if std::mem::take(&mut self.owner) {
            self.broadcaster.drain();
        }
    }
}

impl Drop for PendingNotification {
    fn drop(&mut self) {
        self.flush();
    }
}

impl fmt::Debug for PendingNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingNotification")
            .field("owner", &self.owner)
            .finish()
    }
}

impl Default for AuthStateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuthStateBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("AuthStateBroadcaster")
            .field("state", &inner.state)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

/// Unblocks future dispatch if a subscriber panics mid-pass.
struct DispatchGuard<'a> {
    shared: &'a Shared,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inner = self.shared.lock();
            inner.dispatching = false;
            inner.pending.clear();
        }
    }
}

/// Handle returned by [`AuthStateBroadcaster::subscribe`].
///
/// Dropping the handle unsubscribes; use [`Subscription::detach`] to keep the
/// callback registered for the broadcaster's lifetime.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
    active: bool,
}

impl Subscription {
    /// Removes the callback.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Leaves the callback registered permanently.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(shared) = self.shared.upgrade() {
            shared.lock().subscribers.retain(|(id, _)| *id != self.id);
            debug!(subscriber = self.id, "auth state subscriber removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
