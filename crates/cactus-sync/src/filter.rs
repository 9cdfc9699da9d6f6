//! Subscription filters.
//!
//! A [`Filter`] selects a subset of a collection. It is evaluated locally
//! against JSON objects and rendered to the query string registered with a
//! subscription.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Predicate over the fields of a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Matches every object.
    All,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    /// String field contains the given substring.
    Contains { field: String, value: String },
    In { field: String, values: Vec<Value> },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            field: field.into(),
            values,
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            first => Filter::And {
                filters: vec![first, other],
            },
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or { mut filters } => {
                filters.push(other);
                Filter::Or { filters }
            }
            first => Filter::Or {
                filters: vec![first, other],
            },
        }
    }

    pub fn negate(self) -> Self {
        Filter::Not {
            filter: Box::new(self),
        }
    }

    /// Evaluate the filter against an object. Missing fields read as `null`.
    pub fn matches(&self, object: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => field_value(object, field) == value,
            Filter::Ne { field, value } => field_value(object, field) != value,
            Filter::Contains { field, value } => field_value(object, field)
                .as_str()
                .map(|s| s.contains(value.as_str()))
                .unwrap_or(false),
            Filter::In { field, values } => {
                let actual = field_value(object, field);
                values.iter().any(|v| v == actual)
            }
            Filter::And { filters } => filters.iter().all(|f| f.matches(object)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(object)),
            Filter::Not { filter } => !filter.matches(object),
        }
    }
}

static NULL: Value = Value::Null;

/// Dotted paths reach into nested objects (`author.name`).
fn field_value<'a>(object: &'a Value, path: &str) -> &'a Value {
    path.split('.')
        .try_fold(object, |current, key| current.get(key))
        .unwrap_or(&NULL)
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "TRUEPREDICATE"),
            Filter::Eq { field, value } => write!(f, "{} == {}", field, value),
            Filter::Ne { field, value } => write!(f, "{} != {}", field, value),
            Filter::Contains { field, value } => {
                write!(f, "{} CONTAINS {}", field, Value::String(value.clone()))
            }
            Filter::In { field, values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN {{{}}}", field, rendered.join(", "))
            }
            Filter::And { filters } => write_joined(f, filters, " AND "),
            Filter::Or { filters } => write_joined(f, filters, " OR "),
            Filter::Not { filter } => write!(f, "NOT ({})", filter),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, filters: &[Filter], sep: &str) -> fmt::Result {
    if filters.is_empty() {
        return write!(f, "TRUEPREDICATE");
    }
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match filter {
            Filter::And { .. } | Filter::Or { .. } => write!(f, "({})", filter)?,
            other => write!(f, "{}", other)?,
        }
    }
    Ok(())
}
