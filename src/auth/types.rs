// Authentication types

use std::sync::Arc;

use serde::Deserialize;

use super::service_account::ServiceAccountKey;

/// Per-account field stored as `ACCOUNT_<name>_<FIELD>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ClientId,
    ClientSecret,
    RefreshToken,
    AccessToken,
    AccessTokenExpiry,
    RootFolder,
    RootFolderName,
}

impl Field {
    /// Longest suffixes first so `ACCESS_TOKEN_EXPIRY` never parses as `ACCESS_TOKEN`
    pub const ALL: [Field; 7] = [
        Field::AccessTokenExpiry,
        Field::RootFolderName,
        Field::RefreshToken,
        Field::ClientSecret,
        Field::AccessToken,
        Field::RootFolder,
        Field::ClientId,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::ClientId => "CLIENT_ID",
            Field::ClientSecret => "CLIENT_SECRET",
            Field::RefreshToken => "REFRESH_TOKEN",
            Field::AccessToken => "ACCESS_TOKEN",
            Field::AccessTokenExpiry => "ACCESS_TOKEN_EXPIRY",
            Field::RootFolder => "ROOT_FOLDER",
            Field::RootFolderName => "ROOT_FOLDER_NAME",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// A named credential bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountRecord {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    /// Epoch seconds
    pub access_token_expiry: Option<i64>,
    pub root_folder: Option<String>,
    pub root_folder_name: Option<String>,
}

impl AccountRecord {
    pub fn get(&self, field: Field) -> Option<String> {
        match field {
            Field::ClientId => self.client_id.clone(),
            Field::ClientSecret => self.client_secret.clone(),
            Field::RefreshToken => self.refresh_token.clone(),
            Field::AccessToken => self.access_token.clone(),
            Field::AccessTokenExpiry => self.access_token_expiry.map(|e| e.to_string()),
            Field::RootFolder => self.root_folder.clone(),
            Field::RootFolderName => self.root_folder_name.clone(),
        }
    }

    /// Set a field; empty values clear it. An unparsable expiry is stored as absent.
    pub fn set(&mut self, field: Field, value: &str) {
        let value = (!value.is_empty()).then(|| value.to_string());
        match field {
            Field::ClientId => self.client_id = value,
            Field::ClientSecret => self.client_secret = value,
            Field::RefreshToken => self.refresh_token = value,
            Field::AccessToken => self.access_token = value,
            Field::AccessTokenExpiry => {
                self.access_token_expiry = value.and_then(|v| v.parse().ok())
            }
            Field::RootFolder => self.root_folder = value,
            Field::RootFolderName => self.root_folder_name = value,
        }
    }

    /// Complete for the user flow: client id, client secret and refresh token all non-empty
    pub fn is_complete(&self) -> bool {
        [&self.client_id, &self.client_secret, &self.refresh_token]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        *self == AccountRecord::default()
    }

    pub fn token_state(&self) -> TokenState {
        TokenState {
            value: self.access_token.clone().unwrap_or_default(),
            expiry: self.access_token_expiry.unwrap_or(0),
        }
    }
}

/// Access token with its expiry (epoch seconds)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    pub value: String,
    pub expiry: i64,
}

impl TokenState {
    /// Seconds left before expiry, negative once expired
    pub fn remaining(&self, now: i64) -> i64 {
        self.expiry - now
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
}

/// Which OAuth2 client field is being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Id,
    Secret,
}

impl ClientField {
    pub fn field(self) -> Field {
        match self {
            ClientField::Id => Field::ClientId,
            ClientField::Secret => Field::ClientSecret,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClientField::Id => "Client ID",
            ClientField::Secret => "Client Secret",
        }
    }
}

/// How access tokens are obtained for a session
#[derive(Debug, Clone)]
pub enum ExchangeMode {
    /// Refresh-token grant against the configured token endpoint
    Normal,
    /// Freshly signed JWT assertion on every renewal
    ServiceAccount(Arc<ServiceAccountKey>),
}

/// Account selection flags coming from the command line
#[derive(Debug, Clone, Default)]
pub struct AccountSelection {
    /// Create a new account; an empty string means "prompt for a name"
    pub new_account: Option<String>,
    /// Use this existing account instead of the default
    pub custom_account: Option<String>,
}
