//! CLI command implementations.

mod auth;
mod components;
mod subscriptions;

pub use auth::{login, login_apple, logout, status, watch};
pub use components::{components_list, components_preview, components_publish};
pub use subscriptions::{
    subscriptions_add, subscriptions_clear, subscriptions_list, subscriptions_remove,
    subscriptions_remove_matching,
};

use anyhow::{Context, Result};
use cactus_auth::{AppContext, AuthenticationState};
use cactus_config::{Config, Paths};
use cactus_sync::Filter;
use tracing::debug;

/// Options shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalOptions {
    /// Treat the backend as unreachable and open the store locally.
    pub offline: bool,
}

/// Load config and wire the application context.
pub fn load_context(options: GlobalOptions) -> Result<AppContext> {
    let paths = Paths::new()?;
    let config = Config::load(&paths).context("Failed to load config")?;
    let ctx = AppContext::new(config, paths)?;
    if options.offline {
        ctx.session().set_network_availability(false);
    }
    Ok(ctx)
}

/// Restore the persisted session and bring it to `Complete`.
async fn require_session(ctx: &AppContext) -> Result<()> {
    let state = ctx.resume().await?;
    debug!(state = %state, "Session resumed");
    if state != AuthenticationState::Complete {
        anyhow::bail!("Not logged in. Run 'cactus login' first");
    }
    Ok(())
}

/// Build a filter from `--filter <json>` or repeated `--eq field=value`.
///
/// Several `--eq` terms are joined with AND. With neither, matches all.
pub fn parse_filter(json: Option<&str>, equals: &[String]) -> Result<Filter> {
    if let Some(json) = json {
        if !equals.is_empty() {
            anyhow::bail!("--filter and --eq cannot be combined");
        }
        return serde_json::from_str(json).context("Invalid filter JSON");
    }

    let mut terms = Vec::with_capacity(equals.len());
    for term in equals {
        let (field, value) = term
            .split_once('=')
            .with_context(|| format!("Expected field=value, got '{}'", term))?;
        let field = field.trim();
        if field.is_empty() {
            anyhow::bail!("Empty field name in '{}'", term);
        }
        terms.push(Filter::eq(field, value.trim()));
    }

    Ok(match terms.len() {
        0 => Filter::All,
        1 => terms.remove(0),
        _ => Filter::And { filters: terms },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_terms_matches_everything() {
        assert_eq!(parse_filter(None, &[]).unwrap(), Filter::All);
    }

    #[test]
    fn single_eq_term() {
        let filter = parse_filter(None, &["author = Ada".to_string()]).unwrap();
        assert_eq!(filter, Filter::eq("author", "Ada"));
        assert!(filter.matches(&json!({ "author": "Ada" })));
    }

    #[test]
    fn several_eq_terms_are_conjoined() {
        let filter = parse_filter(
            None,
            &["author=Ada".to_string(), "publicity=publicComponent".to_string()],
        )
        .unwrap();
        assert!(filter.matches(&json!({ "author": "Ada", "publicity": "publicComponent" })));
        assert!(!filter.matches(&json!({ "author": "Ada", "publicity": "privateComponent" })));
    }

    #[test]
    fn json_filter_is_parsed() {
        let filter = parse_filter(
            Some(r#"{"op":"contains","field":"name","value":"tick"}"#),
            &[],
        )
        .unwrap();
        assert!(filter.matches(&json!({ "name": "ticket" })));
    }

    #[test]
    fn malformed_terms_are_rejected() {
        assert!(parse_filter(None, &["author".to_string()]).is_err());
        assert!(parse_filter(None, &["=Ada".to_string()]).is_err());
        assert!(parse_filter(Some("{"), &[]).is_err());
        assert!(parse_filter(Some(r#"{"op":"all"}"#), &["a=b".to_string()]).is_err());
    }
}
