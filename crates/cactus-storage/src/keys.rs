//! Storage key constants.

/// Keys used by the session vault.
pub struct StorageKeys;

impl StorageKeys {
    /// App Services access token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// App Services refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "session_meta";

    /// Last-used store configuration (JSON), kept for offline opening
    pub const STORE_CONFIGURATION: &'static str = "store_configuration";

    /// Every key the vault writes.
    pub const ALL: [&'static str; 4] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::SESSION_META,
        Self::STORE_CONFIGURATION,
    ];
}
