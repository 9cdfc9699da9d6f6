//! Subscription commands.
//!
//! Subscriptions beyond the base one belong to the live session, so each
//! invocation reports the set as it stands after its own change.

use super::{load_context, require_session, GlobalOptions};
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use cactus_auth::AppContext;
use cactus_components::FormattedComponent;
use cactus_sync::{Filter, SubscriptionSet};
use serde_json::json;
use std::sync::Arc;

async fn open_set(options: GlobalOptions, collection: Option<&str>) -> Result<(AppContext, Arc<SubscriptionSet>)> {
    let ctx = load_context(options)?;
    require_session(&ctx).await?;

    let collection = collection.unwrap_or(FormattedComponent::COLLECTION);
    let set = ctx
        .session()
        .subscriptions(collection)
        .with_context(|| format!("No subscription set for collection '{}'", collection))?;
    Ok((ctx, set))
}

fn print_set(set: &SubscriptionSet, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            output::print_heading(&format!("Subscriptions on {}", set.collection()));
            let base = set.base();
            output::print_row(&base.name, &format!("{} (base)", base.query()));
            for sub in set.additional() {
                output::print_row(&sub.name, &sub.query());
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = std::iter::once(set.base().clone())
                .chain(set.additional())
                .map(|sub| json!({ "name": sub.name, "query": sub.query(), "filter": sub.filter }))
                .collect();
            output::print_json(&json!({
                "collection": set.collection(),
                "attached": set.is_attached(),
                "subscriptions": entries,
            }));
        }
    }
}

/// List the subscriptions on a collection.
pub async fn subscriptions_list(
    collection: Option<&str>,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let (_ctx, set) = open_set(options, collection).await?;
    print_set(&set, format);
    Ok(())
}

/// Add one subscription, or several when more than one filter is given.
pub async fn subscriptions_add(
    collection: Option<&str>,
    name: Option<&str>,
    mut filters: Vec<Filter>,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let (_ctx, set) = open_set(options, collection).await?;

    let names = match filters.len() {
        0 => anyhow::bail!("At least one filter is required"),
        1 => vec![set.add_subscription(name, filters.remove(0)).await?],
        _ => set.add_subscriptions(name, filters).await?,
    };

    output::print_success(&format!("Added {}", names.join(", ")), format);
    print_set(&set, format);
    Ok(())
}

/// Remove one subscription by name.
pub async fn subscriptions_remove(
    collection: Option<&str>,
    name: &str,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let (_ctx, set) = open_set(options, collection).await?;
    set.remove_subscription(name).await?;
    output::print_success(&format!("Removed {}", name), format);
    Ok(())
}

/// Remove every subscription whose name contains `pattern`.
pub async fn subscriptions_remove_matching(
    collection: Option<&str>,
    pattern: &str,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let (_ctx, set) = open_set(options, collection).await?;
    let removed = set.remove_subscriptions_by_prefix(pattern).await?;
    output::print_success(&format!("Removed {} subscription(s)", removed.len()), format);
    Ok(())
}

/// Remove every subscription except the base one.
pub async fn subscriptions_clear(
    collection: Option<&str>,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let (_ctx, set) = open_set(options, collection).await?;
    let removed = set.remove_all_non_base().await?;
    output::print_success(&format!("Removed {} subscription(s)", removed.len()), format);
    Ok(())
}
