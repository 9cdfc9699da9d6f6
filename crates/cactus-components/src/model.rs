//! The synced component collection.

use crate::{ComponentError, ComponentResult};
use cactus_sync::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Who can see a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Publicity {
    #[default]
    PublicComponent,
    PrivateComponent,
}

impl Publicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Publicity::PublicComponent => "publicComponent",
            Publicity::PrivateComponent => "privateComponent",
        }
    }
}

impl fmt::Display for Publicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published component, as stored in the synced collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedComponent {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub publicity: Publicity,
    pub author_id: String,
    pub author: String,
    /// Registry key of the component implementation.
    pub class_name: String,
    #[serde(default)]
    pub owner_id: String,
}

impl FormattedComponent {
    /// Collection name in the store.
    pub const COLLECTION: &'static str = "formatted_components";

    /// Filter of the base subscription: every public component.
    pub fn base_filter() -> Filter {
        Filter::eq("publicity", Publicity::PublicComponent.as_str())
    }

    pub fn to_value(&self) -> ComponentResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> ComponentResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// User input for a new component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDraft {
    pub name: String,
    pub summary: String,
    pub author: String,
    pub class_name: String,
    pub publicity: Publicity,
}

impl ComponentDraft {
    /// Every text field must be non-blank.
    pub fn validate(&self) -> ComponentResult<()> {
        let fields = [
            ("name", &self.name),
            ("summary", &self.summary),
            ("author", &self.author),
            ("class_name", &self.class_name),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ComponentError::MissingField(field));
            }
        }
        Ok(())
    }

    /// Validate and build the stored form, authored and owned by `owner_id`.
    pub fn into_component(self, owner_id: &str) -> ComponentResult<FormattedComponent> {
        self.validate()?;
        Ok(FormattedComponent {
            id: String::new(),
            name: self.name.trim().to_string(),
            summary: self.summary.trim().to_string(),
            publicity: self.publicity,
            author_id: owner_id.to_string(),
            author: self.author.trim().to_string(),
            class_name: self.class_name.trim().to_string(),
            owner_id: owner_id.to_string(),
        })
    }
}
