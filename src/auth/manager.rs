use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use super::cache;
use super::daemon::RefreshDaemon;
use super::oauth;
use super::resolver;
use super::service_account::{self, ServiceAccountKey};
use super::types::{AccountRecord, AccountSelection, ClientField, ExchangeMode, TokenState};
use super::validate::check_client_field;
use crate::config::Config;
use crate::error::Result;
use crate::prompt::Prompter;
use crate::store::CredentialStore;

/// Authentication manager
/// Owns everything the credential flows share: settings, the store, the HTTP client
/// and the operator prompt
pub struct AuthManager {
    config: Config,
    store: CredentialStore,
    client: Client,
    prompter: Arc<dyn Prompter>,
}

impl AuthManager {
    pub fn new(config: Config, prompter: Arc<dyn Prompter>) -> Result<Self> {
        let store = CredentialStore::new(config.config_file.clone());

        // Foreground exchanges rely on the transport defaults; only the daemon bounds its attempts
        let client = Client::builder()
            .user_agent(concat!("drive-auth/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            store,
            client,
            prompter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    /// Names of all complete accounts, in selection order
    pub fn list_accounts(&self) -> Result<Vec<String>> {
        resolver::migrate_legacy(self)?;
        Ok(resolver::list_accounts(&self.store.load()?))
    }

    pub fn delete_account(&self, name: &str) -> Result<()> {
        resolver::migrate_legacy(self)?;
        resolver::delete_account(self, name)
    }

    /// Resolve the active user account and make sure it holds working credentials
    pub async fn check_credentials(self: &Arc<Self>, selection: &AccountSelection) -> Result<Session> {
        resolver::migrate_legacy(self)?;

        let resolved = resolver::resolve_active_account(self, selection)?;
        let account = resolved.name;
        tracing::info!(account = %account, "Checking credentials");

        let client_id = check_client_field(self, ClientField::Id, &account)?;
        let client_secret = check_client_field(self, ClientField::Secret, &account)?;
        oauth::ensure_refresh_token(self, &account, &client_id, &client_secret).await?;

        let mode = ExchangeMode::Normal;
        cache::ensure_access_token(self, &account, false, &mode, None).await?;

        if resolved.persist_default {
            self.store.set_default(Some(&account))?;
            tracing::info!(account = %account, "Saved as default account");
        }

        Ok(Session {
            manager: Arc::clone(self),
            account,
            mode,
        })
    }

    /// Authenticate as the service account described by `key_file`
    pub async fn check_service_account(self: &Arc<Self>, key_file: &Path) -> Result<Session> {
        service_account::ensure_signing_available()?;

        let key = Arc::new(ServiceAccountKey::from_file(key_file)?);
        let account = service_account::prepare_account(self, &key)?;

        let mode = ExchangeMode::ServiceAccount(key);
        cache::ensure_access_token(self, &account, false, &mode, None).await?;

        Ok(Session {
            manager: Arc::clone(self),
            account,
            mode,
        })
    }
}

/// The active account of one invocation
pub struct Session {
    manager: Arc<AuthManager>,
    account: String,
    mode: ExchangeMode,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.account)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn mode(&self) -> &ExchangeMode {
        &self.mode
    }

    pub fn manager(&self) -> &AuthManager {
        &self.manager
    }

    /// A usable access token, exchanged only when the stored one is not
    pub async fn access_token(&self) -> Result<String> {
        cache::ensure_access_token(&self.manager, &self.account, false, &self.mode, None).await
    }

    /// Exchange a new access token regardless of the stored one
    pub async fn refresh(&self) -> Result<String> {
        cache::ensure_access_token(&self.manager, &self.account, true, &self.mode, None).await
    }

    /// Persisted token and expiry
    pub fn token_state(&self) -> Result<TokenState> {
        Ok(self.record()?.token_state())
    }

    /// Persisted account fields
    pub fn record(&self) -> Result<AccountRecord> {
        Ok(self
            .manager
            .store()
            .load()?
            .account(&self.account)
            .cloned()
            .unwrap_or_default())
    }

    /// Keep the token fresh in the background until the returned handle is shut down or dropped
    pub fn spawn_refresh_daemon(self: &Arc<Self>) -> Result<RefreshDaemon> {
        RefreshDaemon::spawn(Arc::clone(self))
    }
}
