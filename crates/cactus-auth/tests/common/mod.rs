#![allow(dead_code)]

use async_trait::async_trait;
use cactus_auth::{
    AuthError, AuthResult, Credentials, Registration, RemoteAuthService, SessionManager,
    SessionOptions, StoreOpeners, UserSession,
};
use cactus_components::FormattedComponent;
use cactus_config::Paths;
use cactus_storage::{SessionVault, StoreConfiguration};
use cactus_sync::{
    FileStoreOpener, Filter, LocalStoreOpener, MemoryRegistry, OpenEvent, StoreHandle,
    Subscription, SubscriptionBatch, SubscriptionRegistry, SubscriptionSet, SyncError, SyncResult,
    SyncedStoreOpener,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const COMPONENTS: &str = FormattedComponent::COLLECTION;

/// In-memory authentication backend recording every call.
#[derive(Default)]
pub struct FakeAuth {
    registered: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    register_error: Mutex<Option<String>>,
    login_error: Mutex<Option<String>>,
    fail_logout: AtomicBool,
}

impl FakeAuth {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn fail_registration(&self, reason: &str) {
        *self.register_error.lock() = Some(reason.to_string());
    }

    pub fn fail_login(&self, reason: &str) {
        *self.login_error.lock() = Some(reason.to_string());
    }

    pub fn fail_logout(&self) {
        self.fail_logout.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteAuthService for FakeAuth {
    async fn register_user(&self, email: &str, _password: &str) -> AuthResult<Registration> {
        self.calls.lock().push(format!("register:{}", email));
        if let Some(reason) = self.register_error.lock().clone() {
            return Err(AuthError::Registration(reason));
        }
        if self.registered.lock().insert(email.to_string()) {
            Ok(Registration::Created)
        } else {
            self.calls.lock().push(format!("exists:{}", email));
            Ok(Registration::AlreadyExists)
        }
    }

    async fn login(&self, credentials: &Credentials) -> AuthResult<UserSession> {
        let user_id = match credentials {
            Credentials::EmailPassword { email, .. } => format!("user-{}", email),
            Credentials::ExternalIdentity { id_token } => format!("apple-{}", id_token),
        };
        self.calls.lock().push(format!("login:{}", user_id));
        if let Some(reason) = self.login_error.lock().clone() {
            return Err(AuthError::Authentication(reason));
        }
        Ok(UserSession {
            user_id,
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            device_id: Some("device".to_string()),
        })
    }

    async fn logout(&self, session: &UserSession) -> AuthResult<()> {
        self.calls.lock().push(format!("logout:{}", session.user_id));
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(AuthError::Authentication("session already revoked".to_string()));
        }
        Ok(())
    }

    fn store_configuration(&self, session: &UserSession) -> StoreConfiguration {
        StoreConfiguration {
            app_id: "cactus-test".to_string(),
            user_id: session.user_id.clone(),
            base_url: "http://localhost".to_string(),
            flexible_sync: true,
        }
    }
}

/// How the scripted opener answers the next synced open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Open,
    Timeout,
    CloseEarly,
}

/// Registry that fails or hangs on demand.
#[derive(Default)]
pub struct FlakyRegistry {
    inner: MemoryRegistry,
    hang: AtomicBool,
}

impl FlakyRegistry {
    pub fn fail(&self, reason: Option<&str>) {
        self.inner.set_failure(reason);
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.snapshot().into_iter().map(|s| s.name).collect()
    }
}

#[async_trait]
impl SubscriptionRegistry for FlakyRegistry {
    async fn list(&self) -> SyncResult<Vec<Subscription>> {
        self.inner.list().await
    }

    async fn apply_update(&self, batch: SubscriptionBatch) -> SyncResult<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.apply_update(batch).await
    }
}

/// Store whose subscription registry is replaced.
struct RegistryOverride {
    inner: Arc<dyn StoreHandle>,
    registry: Arc<FlakyRegistry>,
}

#[async_trait]
impl StoreHandle for RegistryOverride {
    fn configuration(&self) -> &StoreConfiguration {
        self.inner.configuration()
    }

    fn subscriptions(&self) -> Arc<dyn SubscriptionRegistry> {
        self.registry.clone()
    }

    fn is_synced(&self) -> bool {
        self.inner.is_synced()
    }

    async fn insert(&self, collection: &str, object: Value) -> SyncResult<String> {
        self.inner.insert(collection, object).await
    }

    async fn objects(&self, collection: &str, filter: &Filter) -> SyncResult<Vec<Value>> {
        self.inner.objects(collection, filter).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> SyncResult<()> {
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> SyncResult<bool> {
        self.inner.delete(collection, id).await
    }
}

/// Wraps the file opener so tests can script failures.
pub struct ScriptedOpener {
    inner: FileStoreOpener,
    mode: Mutex<OpenMode>,
    registry: Mutex<Option<Arc<FlakyRegistry>>>,
    synced_opens: AtomicUsize,
    local_opens: AtomicUsize,
}

impl ScriptedOpener {
    pub fn new(paths: Paths) -> Self {
        Self {
            inner: FileStoreOpener::new(paths, Duration::from_secs(5)),
            mode: Mutex::new(OpenMode::Open),
            registry: Mutex::new(None),
            synced_opens: AtomicUsize::new(0),
            local_opens: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: OpenMode) {
        *self.mode.lock() = mode;
    }

    /// Route subscription traffic of synced stores through `registry`.
    pub fn use_registry(&self, registry: Arc<FlakyRegistry>) {
        *self.registry.lock() = Some(registry);
    }

    pub fn synced_opens(&self) -> usize {
        self.synced_opens.load(Ordering::SeqCst)
    }

    pub fn local_opens(&self) -> usize {
        self.local_opens.load(Ordering::SeqCst)
    }
}

impl SyncedStoreOpener for ScriptedOpener {
    fn open(&self, config: &StoreConfiguration) -> mpsc::Receiver<OpenEvent> {
        self.synced_opens.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock();
        let registry = self.registry.lock().clone();

        match (mode, registry) {
            (OpenMode::Open, None) => self.inner.open(config),
            (OpenMode::Open, Some(registry)) => {
                let mut upstream = self.inner.open(config);
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    while let Some(event) = upstream.recv().await {
                        let event = match event {
                            OpenEvent::Opened(inner) => OpenEvent::Opened(Arc::new(RegistryOverride {
                                inner,
                                registry: registry.clone(),
                            })),
                            other => other,
                        };
                        let _ = tx.send(event).await;
                    }
                });
                rx
            }
            (OpenMode::Timeout, _) => {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    let _ = tx.send(OpenEvent::Connecting).await;
                    let _ = tx.send(OpenEvent::Progress(0.25)).await;
                    let _ = tx.send(OpenEvent::Failed(SyncError::Timeout(4000))).await;
                });
                rx
            }
            (OpenMode::CloseEarly, _) => {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    let _ = tx.send(OpenEvent::Connecting).await;
                    let _ = tx.send(OpenEvent::WaitingForCredential).await;
                });
                rx
            }
        }
    }
}

#[async_trait]
impl LocalStoreOpener for ScriptedOpener {
    async fn open_local(&self, config: &StoreConfiguration) -> SyncResult<Arc<dyn StoreHandle>> {
        self.local_opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open_local(config).await
    }
}

/// A session manager wired to fakes, with its files in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub auth: Arc<FakeAuth>,
    pub opener: Arc<ScriptedOpener>,
    pub manager: SessionManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let auth = Arc::new(FakeAuth::default());
        let opener = Arc::new(ScriptedOpener::new(Paths::with_base_dir(dir.path().to_path_buf())));
        let manager = build_manager(&vault_path(&dir), auth.clone(), opener.clone(), options);
        Self {
            dir,
            auth,
            opener,
            manager,
        }
    }

    /// A second manager over the same files, as after a restart.
    pub fn restart(&self) -> SessionManager {
        build_manager(
            &vault_path(&self.dir),
            self.auth.clone(),
            self.opener.clone(),
            SessionOptions::default(),
        )
    }

    pub fn vault_path(&self) -> PathBuf {
        vault_path(&self.dir)
    }

    /// Sign in, open the store and create the profile.
    pub async fn complete_sign_in(&self, email: &str) {
        self.manager.sign_in_with_password(email, "password").await.unwrap();
        self.manager.open_store().await.unwrap();
        self.manager.check_profile().await.unwrap();
    }
}

fn vault_path(dir: &TempDir) -> PathBuf {
    dir.path().join("session.json")
}

fn build_manager(
    vault: &std::path::Path,
    auth: Arc<FakeAuth>,
    opener: Arc<ScriptedOpener>,
    options: SessionOptions,
) -> SessionManager {
    let vault: SessionVault = cactus_storage::open_file_vault(vault).unwrap();
    SessionManager::new(
        auth,
        vault,
        StoreOpeners {
            synced: opener.clone(),
            local: opener,
        },
        options,
    )
    .with_subscription_set(SubscriptionSet::new(
        COMPONENTS,
        FormattedComponent::base_filter(),
    ))
}
