// Access token cache
// Decides whether the stored token is usable and performs the exchange when it is not

use chrono::{TimeZone, Utc};

use super::manager::AuthManager;
use super::refresh;
use super::service_account;
use super::types::{ExchangeMode, Field, TokenState};
use super::validate::is_valid_access_token;
use super::epoch_secs;
use crate::error::{AuthError, Result};

/// Whether `state` must be exchanged before use at `now`
pub fn needs_refresh(state: &TokenState, now: i64, force: bool) -> bool {
    force
        || state.value.is_empty()
        || state.expiry < now
        || !is_valid_access_token(&state.value)
}

/// Return a usable access token for `account`, exchanging and persisting a new one if needed
///
/// `presupplied` is a token endpoint response the caller already holds (the
/// authorization-code exchange returns an access token too); in normal mode it
/// is used instead of a second round trip.
pub async fn ensure_access_token(
    manager: &AuthManager,
    account: &str,
    force: bool,
    mode: &ExchangeMode,
    presupplied: Option<&str>,
) -> Result<String> {
    let now = epoch_secs();
    let record = manager
        .store()
        .load()?
        .account(account)
        .cloned()
        .unwrap_or_default();

    let current = record.token_state();
    if !needs_refresh(&current, now, force) {
        tracing::debug!(
            account = %account,
            "Access token valid for another {}s",
            current.remaining(now)
        );
        return Ok(current.value);
    }

    let body = match (mode, presupplied) {
        (ExchangeMode::Normal, Some(body)) => body.to_string(),
        (ExchangeMode::Normal, None) => {
            let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
                record.client_id.as_deref(),
                record.client_secret.as_deref(),
                record.refresh_token.as_deref(),
            ) else {
                return Err(AuthError::InvalidInput(format!(
                    "account \"{account}\" has no client credentials or refresh token"
                )));
            };
            refresh::refresh_grant(
                manager.client(),
                &manager.config().token_url,
                client_id,
                client_secret,
                refresh_token,
            )
            .await?
        }
        (ExchangeMode::ServiceAccount(key), _) => {
            service_account::exchange(manager, key, now).await?
        }
    };

    let state = refresh::parse_token_response(&body, now).inspect_err(|_| {
        tracing::error!(account = %account, "Token response has no access_token: {}", body);
    })?;

    store_token(manager, account, &state)?;

    tracing::info!(
        account = %account,
        "Access token refreshed, expires: {}",
        Utc.timestamp_opt(state.expiry, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| state.expiry.to_string())
    );

    Ok(state.value)
}

fn store_token(manager: &AuthManager, account: &str, state: &TokenState) -> Result<()> {
    manager.store().update(|data| {
        let record = data.accounts.entry(account.to_string()).or_default();
        record.set(Field::AccessToken, &state.value);
        record.set(Field::AccessTokenExpiry, &state.expiry.to_string());
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(value: &str, expiry: i64) -> TokenState {
        TokenState {
            value: value.to_string(),
            expiry,
        }
    }

    #[test]
    fn test_valid_token_is_reused() {
        assert!(!needs_refresh(&state("ya29.abc", 4600), 1000, false));
    }

    #[test]
    fn test_refresh_conditions() {
        // forced
        assert!(needs_refresh(&state("ya29.abc", 4600), 1000, true));
        // empty
        assert!(needs_refresh(&state("", 4600), 1000, false));
        // expired
        assert!(needs_refresh(&state("ya29.abc", 999), 1000, false));
        // wrong prefix
        assert!(needs_refresh(&state("ya30.abc", 4600), 1000, false));
    }

    #[test]
    fn test_expiry_equal_to_now_is_still_usable() {
        assert!(!needs_refresh(&state("ya29.abc", 1000), 1000, false));
    }
}
