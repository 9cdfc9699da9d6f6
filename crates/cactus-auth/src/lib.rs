//! Authentication and session lifecycle for Cactus.
//!
//! [`SessionManager`] drives a user from sign-in through store opening and
//! profile creation, tracking progress with an explicit state machine
//! ([`AuthenticationState`]). [`AppContext`] wires it to the production
//! collaborators.

mod auth_fsm;
mod client;
mod context;
mod credentials;
mod error;
mod profile;
mod session;

pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthenticationState};
pub use client::{AppServicesClient, Registration, RemoteAuthService, UserSession};
pub use context::AppContext;
pub use credentials::{normalize_email, Credentials, ExternalIdentity};
pub use error::{AuthError, AuthResult};
pub use profile::{PendingProfile, Profile};
pub use session::{Session, SessionManager, SessionOptions, StoreOpeners};
