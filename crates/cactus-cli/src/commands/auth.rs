//! Authentication commands.

use super::{load_context, GlobalOptions};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use cactus_auth::{AppContext, AuthenticationState, ExternalIdentity};
use serde_json::json;
use std::io::{self, Write};
use tracing::{info, warn};

/// Resume any stored session and leave the manager ready for a fresh
/// sign-in. Returns true when already signed in.
async fn prepare_sign_in(ctx: &AppContext, format: &OutputFormat) -> Result<bool> {
    match ctx.resume().await {
        Ok(AuthenticationState::Complete) => {
            let who = ctx
                .session()
                .session()
                .and_then(|s| s.email)
                .unwrap_or_else(|| ctx.session().owner_id());
            output::print_success(&format!("Already logged in as {}", who), format);
            return Ok(true);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Stored session could not be resumed"),
    }

    if ctx.session().state() != AuthenticationState::Authenticating {
        ctx.session().logout().await?;
    }
    Ok(false)
}

/// Move a freshly authenticated session to `Complete` and report.
async fn finish_sign_in(ctx: &AppContext, format: &OutputFormat) -> Result<()> {
    match ctx.advance().await {
        Ok(AuthenticationState::Complete) => {
            let who = ctx
                .session()
                .session()
                .and_then(|s| s.email)
                .unwrap_or_else(|| ctx.session().owner_id());
            output::print_success(&format!("Logged in as {}", who), format);
        }
        Ok(state) => output::print_error(&format!("Sign-in stopped in state {}", state), format),
        Err(e) => output::print_error(&format!("Logged in, but opening the store failed: {}", e), format),
    }
    Ok(())
}

/// Sign in with email and password, registering on first use.
pub async fn login(email: Option<String>, options: GlobalOptions, format: &OutputFormat) -> Result<()> {
    let ctx = load_context(options)?;
    if prepare_sign_in(&ctx, format).await? {
        return Ok(());
    }

    let email = match email {
        Some(email) => email,
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            let mut email = String::new();
            io::stdin().read_line(&mut email)?;
            email
        }
    };
    let email = email.trim().to_string();

    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;

    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    if let OutputFormat::Text = format {
        println!("Logging in...");
    }

    if let Err(e) = ctx.session().sign_in_with_password(&email, &password).await {
        output::print_error(&format!("Login failed: {}", e), format);
        return Ok(());
    }

    finish_sign_in(&ctx, format).await
}

/// Sign in with an identity token from the external provider.
pub async fn login_apple(
    identity: ExternalIdentity,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let ctx = load_context(options)?;
    if prepare_sign_in(&ctx, format).await? {
        return Ok(());
    }

    if let Err(e) = ctx.session().sign_in_with_external_identity(identity).await {
        output::print_error(&format!("Login failed: {}", e), format);
        return Ok(());
    }

    finish_sign_in(&ctx, format).await
}

/// Logout and clear the stored session.
pub async fn logout(options: GlobalOptions, format: &OutputFormat) -> Result<()> {
    let ctx = load_context(options)?;
    if let Err(e) = ctx.resume().await {
        warn!(error = %e, "Logging out of a session that did not resume");
    }

    ctx.session().logout().await?;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show authentication and store status.
pub async fn status(options: GlobalOptions, format: &OutputFormat) -> Result<()> {
    let ctx = load_context(options)?;
    let resume_error = ctx.resume().await.err().map(|e| e.to_string());

    let manager = ctx.session();
    let state = manager.state();
    let session = manager.session();
    let store = manager.store();
    let subscriptions: Vec<_> = manager
        .subscription_sets()
        .map(|set| json!({ "collection": set.collection(), "count": set.len() }))
        .collect();

    match format {
        OutputFormat::Text => {
            output::print_heading("Cactus");
            output::print_row("State", state.as_str());
            match &session {
                Some(session) => {
                    output::print_row("User ID", &session.user_id);
                    output::print_row("Email", session.email.as_deref().unwrap_or("unknown"));
                    output::print_row(
                        "Provider",
                        if session.used_external_provider() { "apple" } else { "password" },
                    );
                }
                None => output::print_row("User ID", "not logged in"),
            }
            output::print_row(
                "Store",
                match &store {
                    Some(store) if store.is_synced() => "synced",
                    Some(_) => "local",
                    None => "closed",
                },
            );
            output::print_row(
                "Network",
                if manager.network_available() { "available" } else { "unavailable" },
            );
            for set in manager.subscription_sets() {
                output::print_row(set.collection(), &format!("{} subscriptions", set.len()));
            }
            if let Some(e) = &resume_error {
                output::print_row("Last error", e);
            }
        }
        OutputFormat::Json => output::print_json(&json!({
            "state": state,
            "logged_in": state == AuthenticationState::Complete,
            "session": session,
            "store": store.map(|s| if s.is_synced() { "synced" } else { "local" }),
            "network_available": manager.network_available(),
            "subscriptions": subscriptions,
            "error": resume_error,
        })),
    }

    Ok(())
}

/// Resume the session, then follow state and reachability until Ctrl-C.
pub async fn watch(options: GlobalOptions, format: &OutputFormat) -> Result<()> {
    let ctx = load_context(options)?;
    let mut states = ctx.session().subscribe_state();

    if !options.offline {
        ctx.start_network_monitor()?;
    }

    let report = |state: AuthenticationState, network: bool| match format {
        OutputFormat::Text => println!("state={} network={}", state, network),
        OutputFormat::Json => println!("{}", json!({ "state": state, "network_available": network })),
    };

    if let Err(e) = ctx.resume().await {
        output::print_error(&e.to_string(), format);
    }
    report(ctx.session().state(), ctx.session().network_available());

    let mut last_network = ctx.session().network_available();
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(500));

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                report(state, ctx.session().network_available());
            }
            _ = ticker.tick() => {
                let network = ctx.session().network_available();
                if network != last_network {
                    last_network = network;
                    report(ctx.session().state(), network);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    ctx.stop_network_monitor();
    Ok(())
}
