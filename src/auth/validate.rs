// Input validation
// Format rules for credentials and the prompt/validate state machine

use once_cell::sync::Lazy;
use regex::Regex;

use super::manager::AuthManager;
use super::types::ClientField;
use crate::error::{AuthError, Result};
use crate::prompt::Prompter;

static ACCOUNT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));
static CLIENT_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+-[0-9A-Za-z_]{32}\.apps\.googleusercontent\.com$").expect("valid regex")
});
static CLIENT_SECRET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z_-]+$").expect("valid regex"));
static REFRESH_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+//[0-9A-Za-z_-]+$").expect("valid regex"));
static AUTH_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d/[0-9A-Za-z_-]+$").expect("valid regex"));
static ACCESS_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ya29\.[0-9A-Za-z_-]+$").expect("valid regex"));

pub fn is_valid_account_name(name: &str) -> bool {
    ACCOUNT_NAME_RE.is_match(name)
}

pub fn is_valid_client_field(kind: ClientField, value: &str) -> bool {
    match kind {
        ClientField::Id => CLIENT_ID_RE.is_match(value),
        ClientField::Secret => CLIENT_SECRET_RE.is_match(value),
    }
}

pub fn is_valid_refresh_token(token: &str) -> bool {
    REFRESH_TOKEN_RE.is_match(token)
}

pub fn is_valid_auth_code(code: &str) -> bool {
    AUTH_CODE_RE.is_match(code)
}

pub fn is_valid_access_token(token: &str) -> bool {
    ACCESS_TOKEN_RE.is_match(token)
}

/// One prompted value moving towards validity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputState {
    /// Waiting for the operator; `reason` explains why (shown before prompting)
    NeedsInput { reason: Option<String> },
    Validating(String),
    Valid(String),
    Invalid { value: String, reason: String },
}

impl InputState {
    pub fn start() -> Self {
        InputState::NeedsInput { reason: None }
    }

    /// NeedsInput -> Validating
    pub fn receive(self, value: String) -> Self {
        match self {
            InputState::NeedsInput { .. } => InputState::Validating(value),
            other => other,
        }
    }

    /// Validating -> Valid | Invalid
    pub fn validate(self, check: impl Fn(&str) -> std::result::Result<(), String>) -> Self {
        match self {
            InputState::Validating(value) => match check(&value) {
                Ok(()) => InputState::Valid(value),
                Err(reason) => InputState::Invalid { value, reason },
            },
            other => other,
        }
    }

    /// Invalid -> NeedsInput, carrying the failure reason
    pub fn retry(self) -> Self {
        match self {
            InputState::Invalid { reason, .. } => InputState::NeedsInput {
                reason: Some(reason),
            },
            other => other,
        }
    }
}

/// Drive an `InputState` to `Valid`, prompting as often as needed
pub fn prompt_until_valid(
    prompter: &dyn Prompter,
    prompt: &str,
    initial: InputState,
    check: impl Fn(&str) -> std::result::Result<(), String>,
) -> Result<String> {
    let mut state = initial;
    loop {
        state = match state {
            InputState::Valid(value) => return Ok(value),
            InputState::Validating(_) => state.validate(&check),
            InputState::Invalid { .. } => state.retry(),
            InputState::NeedsInput { reason } => {
                if let Some(reason) = &reason {
                    prompter.notify(reason);
                }
                if !prompter.is_interactive() {
                    let hint = format!("Run in a terminal to enter \"{prompt}\".");
                    return Err(AuthError::NotInteractive(match reason {
                        Some(reason) => format!("{reason} {hint}"),
                        None => hint,
                    }));
                }
                let value = prompter.input(prompt)?;
                InputState::NeedsInput { reason }.receive(value)
            }
        };
    }
}

/// Return a valid client id or secret for `account`, prompting and persisting if needed
pub fn check_client_field(
    manager: &AuthManager,
    kind: ClientField,
    account: &str,
) -> Result<String> {
    let label = kind.label();
    let stored = manager
        .store()
        .load()?
        .account(account)
        .and_then(|record| record.get(kind.field()));

    let initial = match stored {
        Some(value) if is_valid_client_field(kind, &value) => return Ok(value),
        Some(_) => {
            tracing::warn!(account = %account, "{} in config file is invalid", label);
            InputState::NeedsInput {
                reason: Some(format!(
                    "Invalid {label} in config file for account \"{account}\"."
                )),
            }
        }
        None => InputState::start(),
    };

    let value = prompt_until_valid(manager.prompter(), label, initial, |value| {
        if is_valid_client_field(kind, value) {
            Ok(())
        } else {
            Err(format!("Invalid {label} entered, try again."))
        }
    })?;

    manager.store().upsert(account, kind.field(), &value)?;
    tracing::info!(account = %account, "{} saved", label);
    Ok(value)
}
