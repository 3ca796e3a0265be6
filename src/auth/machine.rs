use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::profile::{ProfileCreateError, ProfileDefaults, ProfileLookup, ProfileStore};
use super::session::SessionResolver;
use super::state::{auth_context, AttemptToken, AuthHandle, AuthPhase, AuthViewState, AuthWriter};
use crate::config::AppConfig;
use crate::identity::{AuthEvent, AuthSubscription};
use crate::types::Profile;

/// Client-side navigation used on sign-out
pub trait Navigator: Send + Sync {
    fn replace(&self, path: &str);
}

impl Navigator for watch::Sender<String> {
    fn replace(&self, path: &str) {
        self.send_replace(path.to_string());
    }
}

/// Terminal outcome of one resolution attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Authenticated(Profile),
    Anonymous,
}

/// Drives session resolution, profile fetch and self-heal, and owns the
/// only writer of the view state.
///
/// `bootstrap` runs a single attempt (one page load). `run` is the
/// long-lived loop: it bootstraps, then reacts to identity events. Attempts
/// are never cancelled; a newer attempt makes older results stale and the
/// writer drops them.
pub struct AuthStateMachine {
    resolver: Arc<dyn SessionResolver>,
    profiles: ProfileStore,
    navigator: Option<Arc<dyn Navigator>>,
    sign_in_path: String,
    defaults: ProfileDefaults,
    writer: AuthWriter,
}

type Attempt<'a> = BoxFuture<'a, (AttemptToken, Resolution)>;

impl AuthStateMachine {
    pub fn new(resolver: Arc<dyn SessionResolver>, profiles: ProfileStore, config: &AppConfig) -> Self {
        let (writer, _) = auth_context();
        Self {
            resolver,
            profiles,
            navigator: None,
            sign_in_path: config.routes.sign_in_path.clone(),
            defaults: ProfileDefaults::self_heal(&config.profile),
            writer,
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn handle(&self) -> AuthHandle {
        self.writer.handle()
    }

    pub fn phase(&self) -> AuthPhase {
        self.writer.phase()
    }

    /// Resolve once and return the committed view state
    pub async fn bootstrap(&self) -> AuthViewState {
        let token = self.writer.begin();
        let resolution = self.resolve_from_session(token).await;
        self.apply(token, resolution);
        self.writer.snapshot()
    }

    /// Bootstrap, then follow identity events until the subscription closes
    /// and every in-flight attempt has finished.
    pub async fn run(&self, mut events: AuthSubscription) {
        let mut attempts: FuturesUnordered<Attempt<'_>> = FuturesUnordered::new();
        let mut events_open = true;

        let token = self.writer.begin();
        attempts.push(self.session_attempt(token));

        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(AuthEvent::SignedIn(session)) => {
                        let token = self.writer.begin();
                        debug!("Signed in as {}, refetching profile", session.user_id);
                        if session.is_valid() {
                            attempts.push(self.profile_attempt(token, session.user_id));
                        } else {
                            warn!("Ignoring expired session for {}", session.user_id);
                            self.apply(token, Resolution::Anonymous);
                        }
                    }
                    Some(AuthEvent::SignedOut) => {
                        let token = self.writer.begin();
                        info!("Signed out");
                        self.apply(token, Resolution::Anonymous);
                        if let Some(navigator) = &self.navigator {
                            navigator.replace(&self.sign_in_path);
                        }
                    }
                    None => {
                        debug!("Auth event stream closed");
                        events_open = false;
                    }
                },
                Some((token, resolution)) = attempts.next(), if !attempts.is_empty() => {
                    self.apply(token, resolution);
                }
                else => break,
            }
        }
    }

    fn session_attempt(&self, token: AttemptToken) -> Attempt<'_> {
        async move { (token, self.resolve_from_session(token).await) }.boxed()
    }

    fn profile_attempt(&self, token: AttemptToken, user_id: String) -> Attempt<'_> {
        async move { (token, self.resolve_profile(token, &user_id).await) }.boxed()
    }

    fn apply(&self, token: AttemptToken, resolution: Resolution) {
        let profile = match resolution {
            Resolution::Authenticated(profile) => Some(profile),
            Resolution::Anonymous => None,
        };

        if self.writer.commit(token, profile) {
            debug!("Auth state ready: {:?}", self.writer.phase());
        } else {
            debug!("Dropped stale result of attempt {:?}", token);
        }
    }

    async fn resolve_from_session(&self, token: AttemptToken) -> Resolution {
        self.writer.enter(token, AuthPhase::ResolvingSession);

        match self.resolver.resolve().await {
            Ok(Some(session)) if session.is_valid() => self.resolve_profile(token, &session.user_id).await,
            Ok(Some(session)) => {
                debug!("Session for {} has expired", session.user_id);
                Resolution::Anonymous
            }
            Ok(None) => {
                debug!("No active session");
                Resolution::Anonymous
            }
            Err(e) => {
                error!("Session resolution failed: {}", e);
                Resolution::Anonymous
            }
        }
    }

    async fn resolve_profile(&self, token: AttemptToken, user_id: &str) -> Resolution {
        self.writer.enter(token, AuthPhase::FetchingProfile);

        match self.profiles.lookup(user_id).await {
            ProfileLookup::Found(profile) => Resolution::Authenticated(profile),
            ProfileLookup::NotFound => {
                warn!("Profile missing for user {}, creating default", user_id);
                self.self_heal(token, user_id).await
            }
            ProfileLookup::Error(reason) => {
                error!("Error fetching profile for {}: {}", user_id, reason);
                Resolution::Anonymous
            }
        }
    }

    async fn self_heal(&self, token: AttemptToken, user_id: &str) -> Resolution {
        self.writer.enter(token, AuthPhase::SelfHealing);

        match self.profiles.create(user_id, &self.defaults).await {
            Ok(profile) => {
                info!("Created default profile for {}", user_id);
                Resolution::Authenticated(profile)
            }
            Err(ProfileCreateError::DuplicateKey) => {
                debug!("Profile for {} created concurrently, refetching", user_id);
                match self.profiles.lookup(user_id).await {
                    ProfileLookup::Found(profile) => Resolution::Authenticated(profile),
                    ProfileLookup::NotFound => {
                        error!("Profile for {} reported duplicate but is missing", user_id);
                        Resolution::Anonymous
                    }
                    ProfileLookup::Error(reason) => {
                        error!("Error refetching profile for {}: {}", user_id, reason);
                        Resolution::Anonymous
                    }
                }
            }
            Err(ProfileCreateError::Store(e)) => {
                error!("Failed to create profile for {}: {}", user_id, e);
                Resolution::Anonymous
            }
        }
    }
}
