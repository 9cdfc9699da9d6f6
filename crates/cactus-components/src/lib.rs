//! Cactus components: the synced `FormattedComponent` collection and the
//! registry that turns a stored class name into a component implementation.

mod model;
mod registry;

pub use model::{ComponentDraft, FormattedComponent, Publicity};
pub use registry::{
    Component, ComponentFactory, ComponentRegistry, LoadingBlurComponent, MissingComponent,
    TicketComponent,
};

use thiserror::Error;

/// Errors from component validation and decoding.
#[derive(Error, Debug)]
pub enum ComponentError {
    /// A required draft field is blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Stored object does not decode as a component
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ComponentResult<T> = Result<T, ComponentError>;
