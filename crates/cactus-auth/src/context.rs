//! Composition root.

use crate::auth_fsm::AuthenticationState;
use crate::client::{AppServicesClient, RemoteAuthService};
use crate::session::{SessionManager, SessionOptions, StoreOpeners};
use crate::{AuthError, AuthResult};
use cactus_components::{ComponentDraft, ComponentRegistry, FormattedComponent};
use cactus_config::{Config, Paths};
use cactus_sync::{FileStoreOpener, Filter, NetworkMonitor, SubscriptionSet, TcpProbe};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a front end needs, built once at startup and passed by
/// reference.
pub struct AppContext {
    config: Config,
    paths: Paths,
    session: Arc<SessionManager>,
    components: ComponentRegistry,
    network: Mutex<Option<NetworkMonitor>>,
}

impl AppContext {
    /// Wire the production collaborators: App Services auth, the file vault
    /// and the file-backed store.
    pub fn new(config: Config, paths: Paths) -> AuthResult<Self> {
        paths.ensure_dirs()?;

        let auth: Arc<dyn RemoteAuthService> = Arc::new(AppServicesClient::from_config(&config)?);
        let vault = cactus_storage::open_file_vault(&paths.vault_file())?;
        let opener = Arc::new(FileStoreOpener::new(paths.clone(), config.store_open_timeout()));

        let session = SessionManager::new(
            auth,
            vault,
            StoreOpeners {
                synced: opener.clone(),
                local: opener,
            },
            SessionOptions {
                logout_cleanup_timeout: config.logout_cleanup_timeout(),
            },
        );

        Ok(Self::from_parts(config, paths, session))
    }

    /// Build around an already-wired session manager.
    ///
    /// The component collection's subscription set is registered here.
    pub fn from_parts(config: Config, paths: Paths, session: SessionManager) -> Self {
        let session = session.with_subscription_set(SubscriptionSet::new(
            FormattedComponent::COLLECTION,
            FormattedComponent::base_filter(),
        ));

        Self {
            config,
            paths,
            session: Arc::new(session),
            components: ComponentRegistry::with_builtins(),
            network: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Start polling backend reachability, feeding the session's flag.
    ///
    /// Calling this again replaces the running monitor.
    pub fn start_network_monitor(&self) -> AuthResult<()> {
        let url = self.config.base_url()?;
        let probe = TcpProbe::for_url(&url, self.config.network_probe_timeout())
            .ok_or_else(|| AuthError::Config(format!("cannot probe {}", url)))?;
        info!(probe_target = %probe.target(), "Starting network monitor");

        let session = self.session.clone();
        let monitor = NetworkMonitor::spawn(
            Arc::new(probe),
            self.config.network_probe_interval(),
            Arc::new(move |available| session.set_network_availability(available)),
        );
        *self.network.lock() = Some(monitor);
        Ok(())
    }

    pub fn stop_network_monitor(&self) {
        if let Some(monitor) = self.network.lock().take() {
            monitor.stop();
        }
    }

    /// Drive the session forward from `OpeningStore` as far as it goes.
    ///
    /// Returns the state reached. Errors from a step are returned after the
    /// session has moved to `Error`.
    pub async fn advance(&self) -> AuthResult<AuthenticationState> {
        if self.session.state() == AuthenticationState::OpeningStore {
            self.session.open_store().await?;
        }
        if self.session.state() == AuthenticationState::CreatingProfile {
            self.session.check_profile().await?;
        }
        Ok(self.session.state())
    }

    /// Restore a persisted session, if any, and advance it.
    pub async fn resume(&self) -> AuthResult<AuthenticationState> {
        if self.session.check_existing_session().await? {
            return self.advance().await;
        }
        Ok(self.session.state())
    }

    /// Components visible in the open store.
    pub async fn list_components(&self, filter: &Filter) -> AuthResult<Vec<FormattedComponent>> {
        let store = self.session.store().ok_or(AuthError::NotLoggedIn)?;
        let objects = store.objects(FormattedComponent::COLLECTION, filter).await?;

        let mut components = Vec::with_capacity(objects.len());
        for object in objects {
            match FormattedComponent::from_value(object) {
                Ok(component) => components.push(component),
                Err(e) => warn!(error = %e, "Skipping undecodable component"),
            }
        }
        Ok(components)
    }

    /// Validate a draft and store it, owned by the signed-in user.
    pub async fn publish_component(&self, draft: ComponentDraft) -> AuthResult<String> {
        let owner_id = self.session.owner_id();
        if owner_id.is_empty() {
            return Err(AuthError::NotLoggedIn);
        }
        let store = self.session.store().ok_or(AuthError::NotLoggedIn)?;

        let component = draft.into_component(&owner_id)?;
        let id = store
            .insert(FormattedComponent::COLLECTION, component.to_value()?)
            .await?;
        info!(id = %id, class_name = %component.class_name, "Component published");
        Ok(id)
    }
}
