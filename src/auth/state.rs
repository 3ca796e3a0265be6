use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::types::{Profile, Role};

/// Where the bootstrap flow currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Init,
    ResolvingSession,
    FetchingProfile,
    SelfHealing,
    ReadyAuthenticated,
    ReadyAnonymous,
}

impl AuthPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, AuthPhase::ReadyAuthenticated | AuthPhase::ReadyAnonymous)
    }
}

/// The view state consumed by the route guard and the navigation composer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthViewState {
    pub profile: Option<Profile>,
    pub is_loading: bool,
}

impl Default for AuthViewState {
    fn default() -> Self {
        Self {
            profile: None,
            is_loading: true,
        }
    }
}

impl AuthViewState {
    pub fn authenticated(profile: Profile) -> Self {
        Self {
            profile: Some(profile),
            is_loading: false,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            profile: None,
            is_loading: false,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }
}

/// Generation captured when a resolution attempt starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttemptToken(u64);

/// View state and phase, published together so readers never see one
/// without the other
#[derive(Debug, Clone)]
struct Published {
    view: AuthViewState,
    phase: AuthPhase,
    commits: u64,
}

/// Sole writer of the view state. Commits from superseded attempts are dropped.
pub struct AuthWriter {
    generation: AtomicU64,
    state: watch::Sender<Published>,
}

/// Read side of the view state; clone freely
#[derive(Debug, Clone)]
pub struct AuthHandle {
    state: watch::Receiver<Published>,
    seen_commits: u64,
}

/// Create a writer/handle pair starting at `{None, true}` in `Init`
pub fn auth_context() -> (AuthWriter, AuthHandle) {
    let (state_tx, state_rx) = watch::channel(Published {
        view: AuthViewState::default(),
        phase: AuthPhase::Init,
        commits: 0,
    });

    (
        AuthWriter {
            generation: AtomicU64::new(0),
            state: state_tx,
        },
        AuthHandle {
            state: state_rx,
            seen_commits: 0,
        },
    )
}

impl AuthWriter {
    /// Start a new attempt, superseding every earlier one
    pub fn begin(&self) -> AttemptToken {
        AttemptToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: AttemptToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// Record an intermediate phase. Ignored for stale attempts.
    pub fn enter(&self, token: AttemptToken, phase: AuthPhase) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.state.send_if_modified(|current| {
            let changed = current.phase != phase;
            current.phase = phase;
            changed
        });
        true
    }

    /// Publish the terminal state of an attempt. Returns false, leaving the
    /// state untouched, when a newer attempt has begun.
    pub fn commit(&self, token: AttemptToken, profile: Option<Profile>) -> bool {
        let phase = if profile.is_some() {
            AuthPhase::ReadyAuthenticated
        } else {
            AuthPhase::ReadyAnonymous
        };

        let mut profile = Some(profile);
        self.state.send_if_modified(|current| {
            if !self.is_current(token) {
                return false;
            }
            current.view = AuthViewState {
                profile: profile.take().flatten(),
                is_loading: false,
            };
            current.phase = phase;
            current.commits += 1;
            true
        })
    }

    pub fn snapshot(&self) -> AuthViewState {
        self.state.borrow().view.clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.state.borrow().phase
    }

    /// Consistent view state and phase
    pub fn current(&self) -> (AuthViewState, AuthPhase) {
        let published = self.state.borrow();
        (published.view.clone(), published.phase)
    }

    pub fn handle(&self) -> AuthHandle {
        let state = self.state.subscribe();
        let seen_commits = state.borrow().commits;
        AuthHandle { state, seen_commits }
    }
}

impl AuthHandle {
    pub fn snapshot(&self) -> AuthViewState {
        self.state.borrow().view.clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.state.borrow().phase
    }

    pub fn current(&self) -> (AuthViewState, AuthPhase) {
        let published = self.state.borrow();
        (published.view.clone(), published.phase)
    }

    /// Wait until the first terminal state has been published
    pub async fn ready(&mut self) -> AuthViewState {
        self.wait_for(|state| !state.is_loading).await
    }

    /// Wait for a view state matching `predicate`. If the writer is gone the
    /// last published state is returned.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&AuthViewState) -> bool) -> AuthViewState {
        if let Ok(published) = self.state.wait_for(|p| predicate(&p.view)).await {
            return published.view.clone();
        }
        self.snapshot()
    }

    pub async fn wait_for_phase(&mut self, phase: AuthPhase) -> AuthPhase {
        if let Ok(published) = self.state.wait_for(|p| p.phase == phase).await {
            return published.phase;
        }
        self.phase()
    }

    /// Resolves when a new view state is committed; phase-only updates do
    /// not count. Errors once the writer is dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        let seen = self.seen_commits;
        let commits = self.state.wait_for(|p| p.commits != seen).await?.commits;
        self.seen_commits = commits;
        Ok(())
    }
}
