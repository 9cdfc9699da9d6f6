//! Component registry mapping stored class names to implementations.

use std::collections::BTreeMap;
use std::fmt;

/// A renderable component.
pub trait Component: Send + Sync {
    /// Registry key this component was resolved from.
    fn key(&self) -> &str;

    /// Human-readable preview. `expanded` asks for the detailed form.
    fn preview(&self, expanded: bool) -> String;
}

/// Constructor stored in the registry.
pub type ComponentFactory = fn() -> Box<dyn Component>;

pub struct TicketComponent;

impl Component for TicketComponent {
    fn key(&self) -> &str {
        "TicketComponent"
    }

    fn preview(&self, expanded: bool) -> String {
        if expanded {
            "[ticket] admit one | perforated stub with date and seat".to_string()
        } else {
            "[ticket] admit one".to_string()
        }
    }
}

pub struct LoadingBlurComponent;

impl Component for LoadingBlurComponent {
    fn key(&self) -> &str {
        "LoadingBlurComponent"
    }

    fn preview(&self, expanded: bool) -> String {
        if expanded {
            "[loading blur] blurred placeholder that sharpens as content loads".to_string()
        } else {
            "[loading blur]".to_string()
        }
    }
}

/// Stand-in for keys with no registered implementation.
pub struct MissingComponent {
    key: String,
}

impl MissingComponent {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Component for MissingComponent {
    fn key(&self) -> &str {
        &self.key
    }

    fn preview(&self, _expanded: bool) -> String {
        format!("[unavailable] no component registered for '{}'", self.key)
    }
}

/// Stable string key -> factory.
///
/// Unknown keys resolve to [`MissingComponent`].
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in components.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("TicketComponent", || Box::new(TicketComponent));
        registry.register("LoadingBlurComponent", || Box::new(LoadingBlurComponent));
        registry
    }

    /// Register (or replace) the factory for `key`.
    pub fn register(&mut self, key: &str, factory: ComponentFactory) {
        if self.factories.insert(key.to_string(), factory).is_some() {
            tracing::debug!(key, "Component factory replaced");
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Build the component for `key`, falling back to [`MissingComponent`].
    pub fn resolve(&self, key: &str) -> Box<dyn Component> {
        match self.factories.get(key) {
            Some(factory) => factory(),
            None => {
                tracing::warn!(key, "Unknown component key");
                Box::new(MissingComponent::new(key))
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("keys", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve() {
        let registry = ComponentRegistry::with_builtins();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("TicketComponent").key(), "TicketComponent");
        assert_eq!(
            registry.resolve("LoadingBlurComponent").preview(false),
            "[loading blur]"
        );
    }

    #[test]
    fn test_unknown_key_falls_back() {
        let registry = ComponentRegistry::with_builtins();

        let component = registry.resolve("SpinnerComponent");
        assert_eq!(component.key(), "SpinnerComponent");
        assert!(component.preview(true).contains("no component registered"));
        assert!(!registry.is_registered("SpinnerComponent"));
    }

    #[test]
    fn test_register_custom() {
        struct Spinner;
        impl Component for Spinner {
            fn key(&self) -> &str {
                "SpinnerComponent"
            }
            fn preview(&self, _expanded: bool) -> String {
                "[spinner]".to_string()
            }
        }

        let mut registry = ComponentRegistry::new();
        assert!(registry.is_empty());
        registry.register("SpinnerComponent", || Box::new(Spinner));

        assert_eq!(registry.resolve("SpinnerComponent").preview(false), "[spinner]");
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["SpinnerComponent"]);
    }
}
