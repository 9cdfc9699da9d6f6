//! Component commands.

use super::{load_context, require_session, GlobalOptions};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use cactus_components::{ComponentDraft, ComponentRegistry};
use cactus_sync::Filter;
use serde_json::json;

/// List components visible through the session's subscriptions.
pub async fn components_list(
    filter: Filter,
    expanded: bool,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let ctx = load_context(options)?;
    require_session(&ctx).await?;

    let components = ctx.list_components(&filter).await?;
    match format {
        OutputFormat::Text => {
            output::print_heading(&format!("{} component(s)", components.len()));
            for component in &components {
                let preview = ctx.components().resolve(&component.class_name).preview(expanded);
                println!("{}  {} by {} [{}]", component.id, component.name, component.author, component.publicity);
                println!("    {}", component.summary);
                println!("    {}", preview);
            }
        }
        OutputFormat::Json => output::print_json(&components),
    }
    Ok(())
}

/// Publish a component owned by the signed-in user.
pub async fn components_publish(
    draft: ComponentDraft,
    options: GlobalOptions,
    format: &OutputFormat,
) -> Result<()> {
    let ctx = load_context(options)?;
    require_session(&ctx).await?;

    match ctx.publish_component(draft).await {
        Ok(id) => match format {
            OutputFormat::Text => println!("Published component {}", id),
            OutputFormat::Json => output::print_json(&json!({ "status": "success", "id": id })),
        },
        Err(e) => output::print_error(&format!("Publish failed: {}", e), format),
    }
    Ok(())
}

/// Render a registered component without a session.
pub fn components_preview(key: Option<&str>, expanded: bool, format: &OutputFormat) -> Result<()> {
    let registry = ComponentRegistry::with_builtins();
    let keys: Vec<String> = match key {
        Some(key) => vec![key.to_string()],
        None => registry.keys().map(str::to_string).collect(),
    };

    match format {
        OutputFormat::Text => {
            for key in &keys {
                let component = registry.resolve(key);
                output::print_row(component.key(), &component.preview(expanded));
            }
        }
        OutputFormat::Json => {
            let previews: Vec<_> = keys
                .iter()
                .map(|key| {
                    json!({
                        "key": key,
                        "registered": registry.is_registered(key),
                        "preview": registry.resolve(key).preview(expanded),
                    })
                })
                .collect();
            output::print_json(&previews);
        }
    }
    Ok(())
}
