// Authentication module
// Account resolution, credential flows and the access token lifecycle

mod cache;
mod daemon;
mod manager;
mod oauth;
mod refresh;
mod resolver;
mod service_account;
mod types;
mod validate;

pub use cache::{ensure_access_token, needs_refresh};
pub use daemon::{DaemonSettings, RefreshDaemon};
pub use manager::{AuthManager, Session};
pub use oauth::authorization_url;
pub use refresh::{extract_field, parse_token_response};
pub use resolver::{
    account_exists, choose_new_account_name, delete_account, list_accounts, migrate_legacy,
    resolve_active_account, ResolvedAccount,
};
pub use service_account::{build_assertion, ServiceAccountKey};
pub use types::{
    AccountRecord, AccountSelection, ClientField, ExchangeMode, Field, TokenResponse, TokenState,
};
pub use validate::{
    check_client_field, is_valid_access_token, is_valid_account_name, is_valid_auth_code,
    is_valid_client_field, is_valid_refresh_token, prompt_until_valid, InputState,
};

/// Current time as epoch seconds
pub fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// First `len` characters of a secret, for log lines
pub fn preview(value: &str, len: usize) -> &str {
    value
        .char_indices()
        .nth(len)
        .map_or(value, |(end, _)| &value[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundaries() {
        assert_eq!(preview("ya29.abcdefghij", 8), "ya29.abc");
        assert_eq!(preview("short", 8), "short");
        assert_eq!(preview("", 8), "");
        // Multi-byte characters straddling the cut must not panic
        assert_eq!(preview("1234567\u{e9}89", 8), "1234567\u{e9}");
        assert_eq!(preview("\u{1f511}\u{1f511}\u{1f511}", 2), "\u{1f511}\u{1f511}");
    }
}
