mod common;

use cactus_auth::{
    AuthError, AuthenticationState, ExternalIdentity, Profile, SessionOptions,
};
use cactus_storage::CredentialKind;
use cactus_sync::{Filter, SyncError};
use common::{FlakyRegistry, Harness, OpenMode, COMPONENTS};
use std::sync::Arc;
use std::time::Duration;

// ── Sign-in ─────────────────────────────────────────────────────

#[tokio::test]
async fn password_sign_in_normalizes_email_before_any_remote_call() {
    let h = Harness::new();

    h.manager
        .sign_in_with_password("  USER@Example.com ", "password")
        .await
        .unwrap();

    assert_eq!(h.manager.state(), AuthenticationState::OpeningStore);
    let session = h.manager.session().unwrap();
    assert_eq!(session.email.as_deref(), Some("user@example.com"));
    assert_eq!(session.credential_kind, CredentialKind::Password);
    assert_eq!(
        h.auth.calls(),
        vec![
            "register:user@example.com".to_string(),
            "login:user-user@example.com".to_string(),
        ]
    );
    assert_eq!(h.manager.owner_id(), "user-user@example.com");
}

#[tokio::test]
async fn second_sign_in_treats_existing_registration_as_success() {
    let h = Harness::new();

    h.manager.sign_in_with_password("a@b.co", "password").await.unwrap();
    h.manager.logout().await.unwrap();
    h.manager.sign_in_with_password("A@B.co", "password").await.unwrap();

    assert_eq!(h.manager.state(), AuthenticationState::OpeningStore);
    let calls = h.auth.calls();
    assert!(calls.contains(&"exists:a@b.co".to_string()));
    assert_eq!(calls.iter().filter(|c| c.starts_with("login:")).count(), 2);
}

#[tokio::test]
async fn registration_error_takes_precedence_over_login() {
    let h = Harness::new();
    h.auth.fail_registration("password too short");
    h.auth.fail_login("never reached");

    let result = h.manager.sign_in_with_password("a@b.co", "pw").await;

    assert!(matches!(result, Err(AuthError::Registration(_))));
    assert_eq!(h.auth.calls(), vec!["register:a@b.co".to_string()]);
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
    assert!(h.manager.session().is_none());
}

#[tokio::test]
async fn login_error_is_returned_and_state_stays() {
    let h = Harness::new();
    h.auth.fail_login("invalid username/password");

    let result = h.manager.sign_in_with_password("a@b.co", "wrong").await;

    assert!(matches!(result, Err(AuthError::Authentication(_))));
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
}

#[tokio::test]
async fn blank_credentials_rejected_locally() {
    let h = Harness::new();

    let result = h.manager.sign_in_with_password("   ", "password").await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    assert!(h.auth.calls().is_empty());
}

#[tokio::test]
async fn external_identity_without_token_is_malformed() {
    let h = Harness::new();

    let result = h
        .manager
        .sign_in_with_external_identity(ExternalIdentity {
            email: Some("a@b.co".to_string()),
            given_name: Some("Ada".to_string()),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(AuthError::MalformedCredential(_))));
    assert!(h.auth.calls().is_empty());
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
}

#[tokio::test]
async fn external_identity_names_land_in_profile() {
    let h = Harness::new();

    h.manager
        .sign_in_with_external_identity(ExternalIdentity {
            email: Some(" Ada@Example.com".to_string()),
            given_name: Some("Ada".to_string()),
            family_name: Some("Lovelace".to_string()),
            identity_token: Some("tok".to_string()),
        })
        .await
        .unwrap();

    let session = h.manager.session().unwrap();
    assert!(session.used_external_provider());
    assert_eq!(session.email.as_deref(), Some("ada@example.com"));

    h.manager.open_store().await.unwrap();
    h.manager.check_profile().await.unwrap();

    let store = h.manager.store().unwrap();
    let profiles = store
        .objects(Profile::COLLECTION, &Filter::eq("owner_id", "apple-tok"))
        .await
        .unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["first_name"], "Ada");
    assert_eq!(profiles[0]["last_name"], "Lovelace");
    assert!(h.manager.session().unwrap().profile.is_empty());
}

#[tokio::test]
async fn sign_in_refused_outside_authenticating() {
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();

    let result = h.manager.sign_in_with_password("a@b.co", "pw").await;

    assert!(matches!(result, Err(AuthError::InvalidStateTransition(_))));
    assert_eq!(h.manager.state(), AuthenticationState::OpeningStore);
}

// ── Store opening ───────────────────────────────────────────────

#[tokio::test]
async fn online_open_registers_base_subscription() {
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();

    h.manager.open_store().await.unwrap();

    assert_eq!(h.manager.state(), AuthenticationState::CreatingProfile);
    assert_eq!(h.opener.synced_opens(), 1);
    let store = h.manager.store().unwrap();
    assert!(store.is_synced());
    let remote = store.subscriptions().list().await.unwrap();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].collection, COMPONENTS);
    assert_eq!(remote[0].query(), r#"publicity == "publicComponent""#);
}

#[tokio::test]
async fn open_store_requires_opening_state() {
    let h = Harness::new();

    let result = h.manager.open_store().await;

    assert!(matches!(result, Err(AuthError::InvalidStateTransition(_))));
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
}

#[tokio::test]
async fn open_timeout_moves_to_error_and_session_survives() {
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();
    h.opener.set_mode(OpenMode::Timeout);

    let result = h.manager.open_store().await;

    assert!(matches!(result, Err(AuthError::StoreOpen(_))));
    assert_eq!(h.manager.state(), AuthenticationState::Error);
    assert!(h.manager.session().is_some());

    assert!(h.manager.check_existing_session().await.unwrap());
    assert_eq!(h.manager.state(), AuthenticationState::OpeningStore);

    h.opener.set_mode(OpenMode::Open);
    h.manager.open_store().await.unwrap();
    assert_eq!(h.manager.state(), AuthenticationState::CreatingProfile);
}

#[tokio::test]
async fn open_stream_ending_without_verdict_is_an_error() {
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();
    h.opener.set_mode(OpenMode::CloseEarly);

    assert!(h.manager.open_store().await.is_err());
    assert_eq!(h.manager.state(), AuthenticationState::Error);
}

#[tokio::test]
async fn subscription_failure_during_open_moves_to_error() {
    let h = Harness::new();
    let registry = Arc::new(FlakyRegistry::default());
    registry.fail(Some("conflict"));
    h.opener.use_registry(registry);
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();

    let result = h.manager.open_store().await;

    assert!(matches!(
        result,
        Err(AuthError::Sync(SyncError::Transaction(_)))
    ));
    assert_eq!(h.manager.state(), AuthenticationState::Error);
}

#[tokio::test]
async fn offline_open_uses_local_snapshot_without_subscriptions() {
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();
    h.manager.set_network_availability(false);

    h.manager.open_store().await.unwrap();

    assert_eq!(h.manager.state(), AuthenticationState::CreatingProfile);
    assert_eq!(h.opener.local_opens(), 1);
    assert_eq!(h.opener.synced_opens(), 0);
    assert!(!h.manager.store().unwrap().is_synced());
    assert!(!h.manager.subscriptions(COMPONENTS).unwrap().is_attached());
}

#[tokio::test]
async fn offline_open_without_configuration_is_an_error() {
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();
    h.manager.set_network_availability(false);

    // Drop the persisted store configuration behind the vault's back
    let raw = std::fs::read_to_string(h.vault_path()).unwrap();
    let mut map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw).unwrap();
    map.remove("store_configuration");
    std::fs::write(h.vault_path(), serde_json::to_string(&map).unwrap()).unwrap();

    let result = h.manager.open_store().await;

    assert!(matches!(result, Err(AuthError::StoreOpen(_))));
    assert_eq!(h.manager.state(), AuthenticationState::Error);
    assert_eq!(h.opener.local_opens(), 0);
}

// ── Profile ─────────────────────────────────────────────────────

#[tokio::test]
async fn profile_written_once_per_owner() {
    let h = Harness::new();
    h.complete_sign_in("a@b.co").await;
    assert_eq!(h.manager.state(), AuthenticationState::Complete);

    h.manager.logout().await.unwrap();
    h.complete_sign_in("a@b.co").await;

    let store = h.manager.store().unwrap();
    let profiles = store
        .objects(Profile::COLLECTION, &Filter::eq("owner_id", "user-a@b.co"))
        .await
        .unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["email"], "a@b.co");
}

// ── Existing session ────────────────────────────────────────────

#[tokio::test]
async fn existing_session_restored_after_restart() {
    let h = Harness::new();
    h.complete_sign_in("a@b.co").await;

    let restarted = h.restart();
    assert_eq!(restarted.state(), AuthenticationState::Authenticating);

    assert!(restarted.check_existing_session().await.unwrap());
    assert_eq!(restarted.state(), AuthenticationState::OpeningStore);
    assert_eq!(restarted.owner_id(), "user-a@b.co");
}

#[tokio::test]
async fn no_persisted_session_leaves_state_alone() {
    let h = Harness::new();

    assert!(!h.manager.check_existing_session().await.unwrap());
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
}

// ── Network ─────────────────────────────────────────────────────

#[tokio::test]
async fn network_flip_after_complete_does_not_transition() {
    let h = Harness::new();
    h.complete_sign_in("a@b.co").await;
    let mut states = h.manager.subscribe_state();
    states.borrow_and_update();

    h.manager.set_network_availability(false);

    assert_eq!(h.manager.state(), AuthenticationState::Complete);
    assert!(!states.has_changed().unwrap());
    assert!(!h.manager.network_available());
}

// ── Logout ──────────────────────────────────────────────────────

#[tokio::test]
async fn logout_from_any_state_ends_in_authenticating() {
    // Authenticating, no session
    let h = Harness::new();
    h.manager.logout().await.unwrap();
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);

    // OpeningStore
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();
    h.manager.logout().await.unwrap();
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
    assert!(h.manager.session().is_none());

    // Error
    let h = Harness::new();
    h.manager.sign_in_with_password("a@b.co", "pw").await.unwrap();
    h.opener.set_mode(OpenMode::Timeout);
    let _ = h.manager.open_store().await;
    h.manager.logout().await.unwrap();
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
    assert!(h.manager.session().is_none());

    // Complete
    let h = Harness::new();
    h.complete_sign_in("a@b.co").await;
    h.manager.logout().await.unwrap();
    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
    assert!(h.manager.session().is_none());
    assert!(h.manager.store().is_none());
    assert_eq!(h.manager.owner_id(), "");
}

#[tokio::test]
async fn logout_removes_additional_subscriptions_and_clears_vault() {
    let h = Harness::new();
    h.complete_sign_in("a@b.co").await;
    let set = h.manager.subscriptions(COMPONENTS).unwrap();
    set.add_subscription(Some("mine"), Filter::eq("owner_id", "user-a@b.co"))
        .await
        .unwrap();
    let store = h.manager.store().unwrap();

    h.manager.logout().await.unwrap();

    let remote = store.subscriptions().list().await.unwrap();
    let names: Vec<_> = remote.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["formatted_components-base"]);
    assert!(!set.is_attached());
    assert!(h.auth.calls().contains(&"logout:user-a@b.co".to_string()));
    assert!(!h.restart().check_existing_session().await.unwrap());
}

#[tokio::test]
async fn logout_ignores_cleanup_and_remote_failures() {
    let h = Harness::new();
    let registry = Arc::new(FlakyRegistry::default());
    h.opener.use_registry(registry.clone());
    h.complete_sign_in("a@b.co").await;
    h.manager
        .subscriptions(COMPONENTS)
        .unwrap()
        .add_subscription(Some("extra"), Filter::All)
        .await
        .unwrap();
    registry.fail(Some("conflict"));
    h.auth.fail_logout();

    h.manager.logout().await.unwrap();

    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
    assert!(h.manager.session().is_none());
    assert!(registry.names().contains(&"extra".to_string()));
    assert!(!h.manager.check_existing_session().await.unwrap());
}

#[tokio::test]
async fn logout_cleanup_is_bounded_by_timeout() {
    let h = Harness::with_options(SessionOptions {
        logout_cleanup_timeout: Duration::from_millis(50),
    });
    let registry = Arc::new(FlakyRegistry::default());
    h.opener.use_registry(registry.clone());
    h.complete_sign_in("a@b.co").await;
    h.manager
        .subscriptions(COMPONENTS)
        .unwrap()
        .add_subscription(Some("extra"), Filter::All)
        .await
        .unwrap();
    registry.hang();

    tokio::time::timeout(Duration::from_secs(2), h.manager.logout())
        .await
        .expect("logout must not wait on a hung cleanup")
        .unwrap();

    assert_eq!(h.manager.state(), AuthenticationState::Authenticating);
}
