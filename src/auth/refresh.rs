// Token endpoint exchanges

use reqwest::Client;
use serde_json::Value;

use super::types::{TokenResponse, TokenState};
use crate::error::{AuthError, Result};

/// Lifetime assumed when the server omits `expires_in`
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Extract a string (or number) field from a JSON document.
/// Absent keys, empty strings and unparsable documents yield `None`.
pub fn extract_field(json: &str, key: &str) -> Option<String> {
    let value: Value = serde_json::from_str(json).ok()?;
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn a token endpoint response into a `TokenState`
///
/// The expiry keeps a one second margin: `now + expires_in - 1`.
pub fn parse_token_response(body: &str, now: i64) -> Result<TokenState> {
    let exchange_failed = || AuthError::TokenExchangeFailed {
        response: body.to_string(),
    };

    let data: TokenResponse = serde_json::from_str(body).map_err(|_| exchange_failed())?;
    let value = data
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(exchange_failed)?;
    let expires_in = data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);

    Ok(TokenState {
        value,
        expiry: now + expires_in - 1,
    })
}

/// POST a form to the token endpoint and return the raw body.
/// Error statuses are not treated as failures here; the caller inspects the body.
async fn post_token_form(client: &Client, url: &str, form: &[(&str, &str)]) -> Result<String> {
    let response = client
        .post(url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::error!(status = status.as_u16(), body = %body, "Token endpoint returned an error");
    } else {
        tracing::debug!(status = status.as_u16(), "Token endpoint responded");
    }

    Ok(body)
}

/// Exchange a refresh token for a new access token
pub async fn refresh_grant(
    client: &Client,
    url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<String> {
    tracing::debug!(
        "Refreshing access token, client_id={}...",
        super::preview(client_id, 8)
    );

    let form = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    post_token_form(client, url, &form).await
}

/// Exchange a one-time authorization code for a refresh token (and an access token)
pub async fn authorization_code_grant(
    client: &Client,
    url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<String> {
    tracing::debug!("Exchanging authorization code");

    let form = [
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];
    post_token_form(client, url, &form).await
}

/// Exchange a signed JWT assertion for an access token
pub async fn jwt_bearer_grant(client: &Client, url: &str, assertion: &str) -> Result<String> {
    tracing::debug!("Exchanging service account assertion");

    let form = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", assertion),
    ];
    post_token_form(client, url, &form).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field() {
        let json = r#"{"access_token":"ya29.abc","expires_in":3599,"empty":""}"#;
        assert_eq!(extract_field(json, "access_token").as_deref(), Some("ya29.abc"));
        assert_eq!(extract_field(json, "expires_in").as_deref(), Some("3599"));
        assert_eq!(extract_field(json, "refresh_token"), None);
        assert_eq!(extract_field(json, "empty"), None);
        assert_eq!(extract_field("<html>", "access_token"), None);
    }

    #[test]
    fn test_expiry_keeps_one_second_margin() {
        let state =
            parse_token_response(r#"{"access_token":"ya29.abc","expires_in":3600}"#, 1000)
                .unwrap();
        assert_eq!(state.value, "ya29.abc");
        assert_eq!(state.expiry, 4599);
    }

    #[test]
    fn test_missing_access_token_surfaces_response() {
        let body = r#"{"error":"invalid_grant","error_description":"Bad Request"}"#;
        match parse_token_response(body, 1000) {
            Err(AuthError::TokenExchangeFailed { response }) => assert_eq!(response, body),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_non_json_response_fails() {
        assert!(matches!(
            parse_token_response("Service Unavailable", 0),
            Err(AuthError::TokenExchangeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_grant_posts_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                mockito::Matcher::UrlEncoded("refresh_token".into(), "1//abc".into()),
                mockito::Matcher::UrlEncoded("client_id".into(), "client".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"ya29.new","expires_in":3600}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let body = refresh_grant(&Client::new(), &url, "client", "secret", "1//abc")
            .await
            .unwrap();

        assert_eq!(extract_field(&body, "access_token").as_deref(), Some("ya29.new"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let body = jwt_bearer_grant(&Client::new(), &url, "a.b.c").await.unwrap();
        assert_eq!(extract_field(&body, "error").as_deref(), Some("invalid_grant"));
    }

    #[tokio::test]
    async fn test_non_ascii_client_id_is_logged_safely() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        // The debug line must actually be formatted
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .finish(),
        );

        // Eighth byte falls inside a multi-byte character
        let url = format!("{}/token", server.url());
        let body = refresh_grant(&Client::new(), &url, "1234567\u{e9}x", "secret", "1//abc")
            .await
            .unwrap();
        assert_eq!(extract_field(&body, "error").as_deref(), Some("invalid_client"));
    }
}
