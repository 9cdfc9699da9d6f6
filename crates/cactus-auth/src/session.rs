//! Session lifecycle driven by the authentication state machine.
//!
//! `SessionManager` owns the one live [`Session`], the authentication state
//! and the opened store. Every mutating operation takes an internal async
//! lock, so transitions never interleave; network availability is a plain
//! atomic flag that is only consulted when the store is opened.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthenticationState};
use crate::client::{Registration, RemoteAuthService, UserSession};
use crate::credentials::{normalize_email, Credentials, ExternalIdentity};
use crate::profile::{PendingProfile, Profile};
use crate::{AuthError, AuthResult};
use cactus_storage::{
    CredentialKind, PersistedSession, SessionMeta, SessionVault, StoreConfiguration,
};
use cactus_sync::{
    Filter, LocalStoreOpener, OpenEvent, StoreHandle, SubscriptionSet, SyncError,
    SyncedStoreOpener, OWNER_FIELD,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// The authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: String,
    /// Normalized email, when known
    pub email: Option<String>,
    pub credential_kind: CredentialKind,
    /// Profile fields waiting to be written once the store is open
    pub profile: PendingProfile,
}

impl Session {
    /// Whether the external identity provider was used, in which case names
    /// came from the provider rather than from the user.
    pub fn used_external_provider(&self) -> bool {
        self.credential_kind == CredentialKind::ExternalIdentity
    }
}

/// Tunables for the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on subscription cleanup during logout.
    pub logout_cleanup_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            logout_cleanup_timeout: Duration::from_secs(5),
        }
    }
}

/// Openers for the online and offline store paths.
#[derive(Clone)]
pub struct StoreOpeners {
    pub synced: Arc<dyn SyncedStoreOpener>,
    pub local: Arc<dyn LocalStoreOpener>,
}

/// Owns authentication state and sequences sign-in, store opening and
/// profile creation.
pub struct SessionManager {
    auth: Arc<dyn RemoteAuthService>,
    vault: SessionVault,
    openers: StoreOpeners,
    options: SessionOptions,
    fsm: Mutex<AuthMachine>,
    state_tx: watch::Sender<AuthenticationState>,
    session: RwLock<Option<Session>>,
    remote: Mutex<Option<UserSession>>,
    store: RwLock<Option<Arc<dyn StoreHandle>>>,
    subscription_sets: BTreeMap<String, Arc<SubscriptionSet>>,
    network_available: AtomicBool,
    /// Serializes every state-changing operation.
    op_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn RemoteAuthService>,
        vault: SessionVault,
        openers: StoreOpeners,
        options: SessionOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthenticationState::Authenticating);
        Self {
            auth,
            vault,
            openers,
            options,
            fsm: Mutex::new(AuthMachine::new()),
            state_tx,
            session: RwLock::new(None),
            remote: Mutex::new(None),
            store: RwLock::new(None),
            subscription_sets: BTreeMap::new(),
            network_available: AtomicBool::new(true),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Register the subscription set of a synced collection.
    pub fn with_subscription_set(mut self, set: SubscriptionSet) -> Self {
        self.subscription_sets
            .insert(set.collection().to_string(), Arc::new(set));
        self
    }

    // ---- accessors ----

    pub fn state(&self) -> AuthenticationState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<AuthenticationState> {
        self.state_tx.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// The opened store, for read access by consumers.
    pub fn store(&self) -> Option<Arc<dyn StoreHandle>> {
        self.store.read().clone()
    }

    pub fn network_available(&self) -> bool {
        self.network_available.load(Ordering::SeqCst)
    }

    /// Id of the signed-in user, or an empty string without a session.
    pub fn owner_id(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|s| s.user_id.clone())
            .unwrap_or_default()
    }

    pub fn subscriptions(&self, collection: &str) -> Option<Arc<SubscriptionSet>> {
        self.subscription_sets.get(collection).cloned()
    }

    pub fn subscription_sets(&self) -> impl Iterator<Item = &Arc<SubscriptionSet>> {
        self.subscription_sets.values()
    }

    /// Update the availability flag. Never transitions state.
    pub fn set_network_availability(&self, available: bool) {
        let previous = self.network_available.swap(available, Ordering::SeqCst);
        if previous != available {
            info!(available, state = %self.state(), "Network availability updated");
        }
    }

    // ---- sign-in ----

    /// Register (idempotently) and log in with email and password.
    ///
    /// A registration error other than "already exists" is returned without
    /// attempting login. On success the session is persisted and state moves
    /// to `OpeningStore`.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        self.ensure_state(AuthenticationState::Authenticating, "sign in")?;

        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "email and password are required".to_string(),
            ));
        }

        match self.auth.register_user(&email, password).await {
            Ok(Registration::Created) => info!(email = %email, "Registered new user"),
            Ok(Registration::AlreadyExists) => debug!(email = %email, "User already registered"),
            Err(e) => {
                warn!(email = %email, error = %e, "Registration failed");
                return Err(e);
            }
        }

        let credentials = Credentials::EmailPassword {
            email: email.clone(),
            password: password.to_string(),
        };
        let remote = match self.auth.login(&credentials).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(email = %email, error = %e, "Password login failed");
                return Err(e);
            }
        };

        let session = Session {
            user_id: remote.user_id.clone(),
            email: Some(email.clone()),
            credential_kind: CredentialKind::Password,
            profile: PendingProfile {
                email: Some(email),
                ..Default::default()
            },
        };
        self.establish(remote, session)
    }

    /// Log in with a token from the external identity provider.
    ///
    /// A missing or blank token is logged and returned as
    /// `MalformedCredential`; no remote call is made.
    pub async fn sign_in_with_external_identity(&self, identity: ExternalIdentity) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        self.ensure_state(AuthenticationState::Authenticating, "sign in")?;

        let pending = PendingProfile {
            first_name: identity.given_name.clone(),
            last_name: identity.family_name.clone(),
            email: identity.email.as_deref().map(normalize_email),
        };

        let id_token = match identity.token() {
            Ok(token) => token.to_string(),
            Err(e) => {
                warn!(error = %e, "Ignoring external sign-in without a usable identity token");
                return Err(e);
            }
        };

        let remote = match self
            .auth
            .login(&Credentials::ExternalIdentity { id_token })
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "External identity login failed");
                return Err(e);
            }
        };

        let session = Session {
            user_id: remote.user_id.clone(),
            email: pending.email.clone(),
            credential_kind: CredentialKind::ExternalIdentity,
            profile: pending,
        };
        self.establish(remote, session)
    }

    /// Persist a freshly authenticated session and advance to `OpeningStore`.
    fn establish(&self, remote: UserSession, session: Session) -> AuthResult<()> {
        let persisted = PersistedSession {
            access_token: remote.access_token.clone(),
            refresh_token: remote.refresh_token.clone(),
            meta: SessionMeta {
                user_id: session.user_id.clone(),
                email: session.email.clone(),
                credential_kind: session.credential_kind,
                device_id: remote.device_id.clone(),
                signed_in_at: chrono::Utc::now().to_rfc3339(),
            },
            store: self.auth.store_configuration(&remote),
        };

        if let Err(e) = self.vault.save(&persisted) {
            error!(user_id = %session.user_id, error = %e, "Failed to persist session");
            self.transition(&AuthMachineInput::Failed)?;
            return Err(e.into());
        }

        info!(
            user_id = %session.user_id,
            kind = ?session.credential_kind,
            "Session established"
        );
        *self.remote.lock() = Some(remote);
        *self.session.write() = Some(session);
        self.transition(&AuthMachineInput::Authenticated)?;
        Ok(())
    }

    /// Resume a persisted session, skipping authentication.
    ///
    /// Valid from `Authenticating` (startup) and `Error`. Returns `Ok(false)`
    /// and leaves state unchanged when nothing is persisted.
    pub async fn check_existing_session(&self) -> AuthResult<bool> {
        let _op = self.op_lock.lock().await;
        let state = self.state();
        if !matches!(
            state,
            AuthenticationState::Authenticating | AuthenticationState::Error
        ) {
            return Err(AuthError::InvalidStateTransition(format!(
                "Cannot restore a session in state {}",
                state
            )));
        }

        let persisted = match self.vault.load()? {
            Some(p) => p,
            None => {
                debug!("No persisted session");
                return Ok(false);
            }
        };

        let user_id = persisted.meta.user_id.clone();
        let session = match self.session() {
            Some(existing) if existing.user_id == user_id => existing,
            _ => Session {
                user_id: user_id.clone(),
                email: persisted.meta.email.clone(),
                credential_kind: persisted.meta.credential_kind,
                profile: PendingProfile {
                    email: persisted.meta.email.clone(),
                    ..Default::default()
                },
            },
        };

        *self.remote.lock() = Some(UserSession {
            user_id: user_id.clone(),
            access_token: persisted.access_token,
            refresh_token: persisted.refresh_token,
            device_id: persisted.meta.device_id,
        });
        *self.session.write() = Some(session);
        self.transition(&AuthMachineInput::SessionRestored)?;

        info!(user_id = %user_id, from = %state, "Persisted session restored");
        Ok(true)
    }

    // ---- store ----

    /// Open the user's store.
    ///
    /// Online, consumes the synced opening protocol and attaches every
    /// subscription set before advancing. Offline, opens the on-device
    /// snapshot with the last persisted configuration and skips subscription
    /// registration. Any failure is logged and moves state to `Error`.
    pub async fn open_store(&self) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        self.ensure_state(AuthenticationState::OpeningStore, "open the store")?;

        let config = match self.vault.store_configuration() {
            Ok(Some(config)) => config,
            Ok(None) => {
                return self.fail_open(AuthError::StoreOpen(
                    "no persisted store configuration".to_string(),
                ))
            }
            Err(e) => return self.fail_open(e.into()),
        };

        let online = self.network_available();
        info!(user_id = %config.user_id, online, "Opening store");

        let store = if online {
            match self.open_synced(&config).await {
                Ok(store) => store,
                Err(e) => return self.fail_open(e),
            }
        } else {
            match self.openers.local.open_local(&config).await {
                Ok(store) => store,
                Err(e) => return self.fail_open(AuthError::StoreOpen(e.to_string())),
            }
        };

        *self.store.write() = Some(store);
        self.transition(&AuthMachineInput::StoreOpened)?;
        Ok(())
    }

    async fn open_synced(&self, config: &StoreConfiguration) -> AuthResult<Arc<dyn StoreHandle>> {
        let mut events = self.openers.synced.open(config);

        let store = loop {
            match events.recv().await {
                Some(OpenEvent::Connecting) => debug!("Store connecting"),
                Some(OpenEvent::WaitingForCredential) => debug!("Store waiting for credential"),
                Some(OpenEvent::Progress(fraction)) => {
                    debug!(progress = fraction, "Store download progress")
                }
                Some(OpenEvent::Opened(store)) => break store,
                Some(OpenEvent::Failed(e)) => return Err(AuthError::StoreOpen(e.to_string())),
                None => return Err(AuthError::StoreOpen(SyncError::StreamClosed.to_string())),
            }
        };

        let registry = store.subscriptions();
        for set in self.subscription_sets.values() {
            set.attach(registry.clone()).await?;
        }
        Ok(store)
    }

    fn fail_open(&self, err: AuthError) -> AuthResult<()> {
        error!(error = %err, "Store open failed");
        self.transition(&AuthMachineInput::Failed)?;
        Err(err)
    }

    // ---- profile ----

    /// Make sure the user has a profile object, then finish.
    ///
    /// Writes one profile from the cached fields when none exists for the
    /// owner, clears the cache and moves to `Complete`.
    pub async fn check_profile(&self) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        self.ensure_state(AuthenticationState::CreatingProfile, "check the profile")?;

        let session = self.session().ok_or(AuthError::NotLoggedIn)?;
        let store = match self.store() {
            Some(store) => store,
            None => {
                error!("No open store while checking profile");
                self.transition(&AuthMachineInput::Failed)?;
                return Err(AuthError::StoreOpen("store is not open".to_string()));
            }
        };

        if let Err(e) = self.ensure_profile(store.as_ref(), &session).await {
            error!(user_id = %session.user_id, error = %e, "Profile check failed");
            self.transition(&AuthMachineInput::Failed)?;
            return Err(e);
        }

        if let Some(current) = self.session.write().as_mut() {
            current.profile = PendingProfile::default();
        }
        self.transition(&AuthMachineInput::ProfileReady)?;
        Ok(())
    }

    async fn ensure_profile(&self, store: &dyn StoreHandle, session: &Session) -> AuthResult<()> {
        let existing = store
            .objects(Profile::COLLECTION, &Filter::eq(OWNER_FIELD, session.user_id.as_str()))
            .await?;
        if !existing.is_empty() {
            debug!(user_id = %session.user_id, "Profile already exists");
            return Ok(());
        }

        let profile = Profile::from_pending(&session.user_id, &session.profile);
        let id = store
            .insert(Profile::COLLECTION, serde_json::to_value(&profile)?)
            .await?;
        info!(user_id = %session.user_id, profile_id = %id, "Profile created");
        Ok(())
    }

    // ---- logout ----

    /// Tear the session down. Always ends in `Authenticating` with no session.
    ///
    /// Additional subscriptions are removed first, bounded by the cleanup
    /// timeout; failures there and in remote logout are logged and ignored.
    pub async fn logout(&self) -> AuthResult<()> {
        let _op = self.op_lock.lock().await;
        let user_id = self.owner_id();

        let attached: Vec<Arc<SubscriptionSet>> = self
            .subscription_sets
            .values()
            .filter(|set| set.is_attached())
            .cloned()
            .collect();
        if !attached.is_empty() {
            let cleanup = async {
                for set in &attached {
                    if let Err(e) = set.remove_all_non_base().await {
                        warn!(collection = %set.collection(), error = %e, "Subscription cleanup failed");
                    }
                }
            };
            if tokio::time::timeout(self.options.logout_cleanup_timeout, cleanup)
                .await
                .is_err()
            {
                warn!(
                    timeout_ms = self.options.logout_cleanup_timeout.as_millis() as u64,
                    "Subscription cleanup timed out"
                );
            }
        }

        let remote = self.remote.lock().take();
        if let Some(remote) = remote {
            if let Err(e) = self.auth.logout(&remote).await {
                warn!(user_id = %remote.user_id, error = %e, "Remote logout failed");
            }
        }

        if let Err(e) = self.vault.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }

        for set in self.subscription_sets.values() {
            set.detach();
        }
        *self.store.write() = None;
        *self.session.write() = None;
        self.reset_state();

        info!(user_id = %user_id, "Logged out");
        Ok(())
    }

    // ---- state machine ----

    fn ensure_state(&self, expected: AuthenticationState, action: &str) -> AuthResult<()> {
        let state = self.state();
        if state != expected {
            return Err(AuthError::InvalidStateTransition(format!(
                "Cannot {} in state {}",
                action, state
            )));
        }
        Ok(())
    }

    /// Transition the FSM and publish the new state if it changed.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthenticationState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthenticationState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {}",
                input, old_state
            ))
        })?;

        let new_state = AuthenticationState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = %old_state,
                new_state = %new_state,
                "Auth state transition"
            );
            self.state_tx.send_replace(new_state);
        }

        Ok(new_state)
    }

    fn reset_state(&self) {
        if self.transition(&AuthMachineInput::LoggedOut).is_err() {
            *self.fsm.lock() = AuthMachine::new();
            self.state_tx.send_replace(AuthenticationState::Authenticating);
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("user_id", &self.owner_id())
            .field("network_available", &self.network_available())
            .field("collections", &self.subscription_sets.keys().collect::<Vec<_>>())
            .finish()
    }
}
