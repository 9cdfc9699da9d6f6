//! User profiles stored alongside the user's data.

use serde::{Deserialize, Serialize};

/// Profile fields collected before the store is open.
///
/// The external identity provider only supplies names on first
/// authorization, so they are held here until the profile can be written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl PendingProfile {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

/// Profile object, one per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub created_at: String,
}

impl Profile {
    /// Collection name in the store.
    pub const COLLECTION: &'static str = "profiles";

    pub fn from_pending(owner_id: &str, pending: &PendingProfile) -> Self {
        Self {
            id: String::new(),
            owner_id: owner_id.to_string(),
            first_name: pending.first_name.clone().unwrap_or_default(),
            last_name: pending.last_name.clone().unwrap_or_default(),
            email: pending.email.clone().unwrap_or_default(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_pending() {
        let pending = PendingProfile {
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
        };
        let profile = Profile::from_pending("u-1", &pending);

        assert_eq!(profile.owner_id, "u-1");
        assert_eq!(profile.display_name(), "Ada Lovelace");
        assert!(serde_json::to_value(&profile).unwrap().get("_id").is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let pending = PendingProfile {
            email: Some("x@y.z".to_string()),
            ..Default::default()
        };
        assert_eq!(Profile::from_pending("u", &pending).display_name(), "x@y.z");
        assert!(PendingProfile::default().is_empty());
    }
}
