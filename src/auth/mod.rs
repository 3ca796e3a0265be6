//! Session bootstrap: resolve the session, load or self-heal the profile and
//! publish a single `{profile, is_loading}` view state.

pub mod jwt;
pub mod machine;
pub mod profile;
pub mod session;
pub mod state;

pub use machine::{AuthStateMachine, Navigator, Resolution};
pub use profile::{ProfileCreateError, ProfileDefaults, ProfileLookup, ProfileStore};
pub use session::{BearerSessionResolver, ProviderSessionResolver, Session, SessionError, SessionResolver};
pub use state::{auth_context, AttemptToken, AuthHandle, AuthPhase, AuthViewState, AuthWriter};
