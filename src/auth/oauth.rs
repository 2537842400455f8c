// Authorization flow for user accounts
// Stored refresh token -> operator-supplied refresh token -> authorization code exchange

use reqwest::Url;

use super::cache;
use super::manager::AuthManager;
use super::refresh::{self, extract_field};
use super::types::{ExchangeMode, Field};
use super::validate::{is_valid_auth_code, is_valid_refresh_token, prompt_until_valid, InputState};
use crate::config::Config;
use crate::error::{AuthError, Result};

/// Consent URL the operator opens in a browser
pub fn authorization_url(config: &Config, client_id: &str) -> Result<Url> {
    Url::parse_with_params(
        &config.auth_url,
        &[
            ("client_id", client_id),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scope.as_str()),
            ("response_type", "code"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| AuthError::Internal(anyhow::anyhow!("Invalid authorization URL: {e}")))
}

/// Make sure `account` ends up with a persisted, working refresh token
pub async fn ensure_refresh_token(
    manager: &AuthManager,
    account: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<()> {
    let prompter = manager.prompter();
    let stored = manager
        .store()
        .load()?
        .account(account)
        .and_then(|record| record.refresh_token.clone());

    match stored {
        Some(token) if is_valid_refresh_token(&token) => {
            if try_refresh_token(manager, account).await? {
                return Ok(());
            }
        }
        Some(_) => {
            prompter.notify("Invalid refresh token in config file, generating a new one.");
            manager.store().upsert(account, Field::RefreshToken, "")?;
        }
        None => {}
    }

    if prompter.is_interactive() {
        let entered = prompter
            .input("Refresh Token (leave blank to generate a new one)")?
            .trim()
            .to_string();
        if is_valid_refresh_token(&entered) {
            manager.store().upsert(account, Field::RefreshToken, &entered)?;
            if try_refresh_token(manager, account).await? {
                return Ok(());
            }
        } else if !entered.is_empty() {
            prompter.notify("Invalid refresh token given, generating a new one.");
        }
    }

    exchange_authorization_code(manager, account, client_id, client_secret).await
}

/// Validate the stored refresh token with a forced exchange
///
/// Only a rejected token is discarded. Transport errors propagate and leave the store alone.
async fn try_refresh_token(manager: &AuthManager, account: &str) -> Result<bool> {
    match cache::ensure_access_token(manager, account, true, &ExchangeMode::Normal, None).await {
        Ok(_) => Ok(true),
        Err(e @ AuthError::TokenExchangeFailed { .. }) => {
            tracing::warn!(account = %account, "Refresh token rejected: {}", e);
            manager
                .prompter()
                .notify("Refresh token is invalid or revoked, generating a new one.");
            manager.store().upsert(account, Field::RefreshToken, "")?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn exchange_authorization_code(
    manager: &AuthManager,
    account: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<()> {
    let config = manager.config();
    let prompter = manager.prompter();

    let url = authorization_url(config, client_id)?;
    prompter.notify(&format!(
        "\nVisit the below URL, tap on allow and then enter the code obtained:\n{url}\n"
    ));

    let code = prompt_until_valid(
        prompter,
        "Enter the authorization code",
        InputState::start(),
        |code| {
            if is_valid_auth_code(code) {
                Ok(())
            } else {
                Err("Invalid code given, try again.".to_string())
            }
        },
    )?;

    let body = refresh::authorization_code_grant(
        manager.client(),
        &config.token_url,
        client_id,
        client_secret,
        &code,
        &config.redirect_uri,
    )
    .await?;

    let Some(refresh_token) = extract_field(&body, "refresh_token") else {
        prompter.notify(&format!(
            "Error: Something went wrong, printing error response:\n{body}"
        ));
        return Err(AuthError::TokenExchangeFailed { response: body });
    };

    manager
        .store()
        .upsert(account, Field::RefreshToken, &refresh_token)?;
    tracing::info!(account = %account, "Refresh token saved");

    cache::ensure_access_token(manager, account, true, &ExchangeMode::Normal, Some(&body)).await?;
    Ok(())
}
