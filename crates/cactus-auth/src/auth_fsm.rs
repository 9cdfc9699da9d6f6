//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌──────────────────┐  Authenticated / SessionRestored  ┌──────────────────┐
//! │  Authenticating  │ ────────────────────────────────► │   OpeningStore   │
//! └──────────────────┘                                   └────────┬─────────┘
//!          ▲                                                      │ StoreOpened
//!          │ LoggedOut (from every state)                         ▼
//!          │                                             ┌──────────────────┐
//!          │                                             │ CreatingProfile  │
//!          │                                             └────────┬─────────┘
//!          │                                                      │ ProfileReady
//!          │                                                      ▼
//!          │         ┌─────────┐                         ┌──────────────────┐
//!          └──────── │  Error  │                         │     Complete     │
//!          Reset     └─────────┘                         └──────────────────┘
//! ```
//!
//! `Failed` moves any of the first three states to `Error`. From `Error` the
//! only ways out are `SessionRestored` (a persisted session exists) and
//! `Reset` / `LoggedOut`. Nothing retries automatically.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::fmt;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Authenticating)

    Authenticating => {
        Authenticated => OpeningStore,
        SessionRestored => OpeningStore,
        Failed => Error,
        LoggedOut => Authenticating
    },
    OpeningStore => {
        StoreOpened => CreatingProfile,
        Failed => Error,
        LoggedOut => Authenticating
    },
    CreatingProfile => {
        ProfileReady => Complete,
        Failed => Error,
        LoggedOut => Authenticating
    },
    Complete => {
        LoggedOut => Authenticating
    },
    Error => {
        SessionRestored => OpeningStore,
        Reset => Authenticating,
        LoggedOut => Authenticating
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Authentication state as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationState {
    Authenticating,
    OpeningStore,
    CreatingProfile,
    Complete,
    Error,
}

impl AuthenticationState {
    /// A session exists and the store is usable.
    pub fn is_complete(&self) -> bool {
        matches!(self, AuthenticationState::Complete)
    }

    /// States the session core is expected to leave on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthenticationState::OpeningStore | AuthenticationState::CreatingProfile
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationState::Authenticating => "authenticating",
            AuthenticationState::OpeningStore => "opening_store",
            AuthenticationState::CreatingProfile => "creating_profile",
            AuthenticationState::Complete => "complete",
            AuthenticationState::Error => "error",
        }
    }
}

impl fmt::Display for AuthenticationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&AuthMachineState> for AuthenticationState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Authenticating => AuthenticationState::Authenticating,
            AuthMachineState::OpeningStore => AuthenticationState::OpeningStore,
            AuthMachineState::CreatingProfile => AuthenticationState::CreatingProfile,
            AuthMachineState::Complete => AuthenticationState::Complete,
            AuthMachineState::Error => AuthenticationState::Error,
        }
    }
}
