use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::auth::AccountSelection;

pub const DEFAULT_CONFIG_FILE: &str = "~/.googledrive.conf";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Google Drive credential manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Credential store file
    #[arg(short = 'c', long = "config", env = "DRIVE_AUTH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Use this account instead of the default one
    #[arg(short = 'a', long = "account")]
    pub account: Option<String>,

    /// Create a new account (prompts for a name when none is given)
    #[arg(short = 'C', long = "create-account", num_args = 0..=1, default_missing_value = "")]
    pub create_account: Option<String>,

    /// Delete an account and exit
    #[arg(short = 'D', long = "delete-account")]
    pub delete_account: Option<String>,

    /// List configured accounts and exit
    #[arg(short = 'L', long = "list-accounts")]
    pub list_accounts: bool,

    /// Authenticate with a service-account key file
    #[arg(short = 's', long = "service-account", env = "DRIVE_SERVICE_ACCOUNT")]
    pub service_account: Option<String>,

    /// Do not keep the access token fresh in the background
    #[arg(long = "no-token-service")]
    pub no_token_service: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Store
    pub config_file: PathBuf,

    // OAuth endpoints
    pub token_url: String,
    pub auth_url: String,
    pub redirect_uri: String,
    pub scope: String,

    // Background refresh
    pub token_refresh_threshold: u64,
    pub token_refresh_timeout: u64,
    pub token_retry_delay: u64,

    // Account selection
    pub new_account: Option<String>,
    pub custom_account: Option<String>,
    pub delete_account: Option<String>,
    pub list_accounts: bool,
    pub service_account: Option<PathBuf>,
    pub no_token_service: bool,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Self::from_args(CliArgs::parse()))
    }

    pub fn from_args(args: CliArgs) -> Self {
        let config_file = if args.config_file.is_empty() {
            DEFAULT_CONFIG_FILE
        } else {
            args.config_file.as_str()
        };

        Config {
            service_account: args.service_account.as_deref().map(expand_tilde),
            config_file: expand_tilde(config_file),

            token_url: env_or("DRIVE_TOKEN_URL", DEFAULT_TOKEN_URL),
            auth_url: env_or("DRIVE_AUTH_URL", DEFAULT_AUTH_URL),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),

            token_refresh_threshold: env_parse("TOKEN_REFRESH_THRESHOLD", 300),
            token_refresh_timeout: env_parse("TOKEN_REFRESH_TIMEOUT", 30),
            token_retry_delay: env_parse("TOKEN_RETRY_DELAY", 10),

            new_account: args.create_account,
            custom_account: args.account,
            delete_account: args.delete_account,
            list_accounts: args.list_accounts,
            no_token_service: args.no_token_service,

            log_level: args.log_level,
        }
    }

    /// Defaults for the given store, without reading the environment
    pub fn for_store(config_file: PathBuf) -> Self {
        Config {
            config_file,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            token_refresh_threshold: 300,
            token_refresh_timeout: 30,
            token_retry_delay: 10,
            new_account: None,
            custom_account: None,
            delete_account: None,
            list_accounts: false,
            service_account: None,
            no_token_service: false,
            log_level: "info".to_string(),
        }
    }

    pub fn selection(&self) -> AccountSelection {
        AccountSelection {
            new_account: self.new_account.clone(),
            custom_account: self.custom_account.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.token_refresh_timeout == 0 {
            anyhow::bail!("TOKEN_REFRESH_TIMEOUT must be greater than zero");
        }

        if let Some(path) = &self.service_account {
            if !path.exists() {
                anyhow::bail!("Service account file does not exist: {}", path.display());
            }
        }

        if self.new_account.is_some() && self.custom_account.is_some() {
            anyhow::bail!("--create-account and --account cannot be used together");
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
