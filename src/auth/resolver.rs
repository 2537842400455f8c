// Account resolution
// Picks the active account and manages named accounts in the store

use super::manager::AuthManager;
use super::types::AccountSelection;
use super::validate::{is_valid_account_name, prompt_until_valid, InputState};
use crate::error::{AuthError, Result};
use crate::store::StoreData;

/// Name given to accounts migrated from a single-account config
const LEGACY_ACCOUNT_NAME: &str = "default";

/// Outcome of account resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub name: String,
    /// No default was configured; persist this account once its credentials check out
    pub persist_default: bool,
}

/// True iff client id, client secret and refresh token are all present for `name`
pub fn account_exists(data: &StoreData, name: &str) -> bool {
    data.account(name).is_some_and(|record| record.is_complete())
}

/// Complete accounts in listing order (position + 1 is the selection number)
pub fn list_accounts(data: &StoreData) -> Vec<String> {
    data.accounts
        .iter()
        .filter(|(_, record)| record.is_complete())
        .map(|(name, _)| name.clone())
        .collect()
}

/// Move unnamespaced legacy credentials into a fresh `default*` account
///
/// Runs only when the legacy client id, secret and refresh token are all present.
/// Returns the new account name.
pub fn migrate_legacy(manager: &AuthManager) -> Result<Option<String>> {
    if !manager.store().load()?.legacy.is_complete() {
        return Ok(None);
    }

    let migrated = manager.store().update(|data| {
        if !data.legacy.is_complete() {
            return None;
        }
        let name = (0..)
            .map(|n| match n {
                0 => LEGACY_ACCOUNT_NAME.to_string(),
                n => format!("{LEGACY_ACCOUNT_NAME}{n}"),
            })
            .find(|candidate| !data.accounts.contains_key(candidate))?;
        let record = std::mem::take(&mut data.legacy);
        data.accounts.insert(name.clone(), record);
        Some(name)
    })?;

    if let Some(name) = &migrated {
        tracing::info!(account = %name, "Migrated single-account config to a named account");
    }
    Ok(migrated)
}

/// Validate `hint` as a new account name, prompting until a free, valid name is given
pub fn choose_new_account_name(manager: &AuthManager, hint: &str) -> Result<String> {
    let data = manager.store().load()?;
    let initial = if hint.is_empty() {
        InputState::start()
    } else {
        InputState::Validating(hint.to_string())
    };

    prompt_until_valid(manager.prompter(), "Name for the new account", initial, |name| {
        if !is_valid_account_name(name) {
            Err(format!(
                "Invalid account name \"{name}\", use only letters, digits and underscores."
            ))
        } else if data.accounts.contains_key(name) {
            Err(format!("Account \"{name}\" already exists, choose another name."))
        } else {
            Ok(())
        }
    })
}

/// Remove an account and all of its fields
pub fn delete_account(manager: &AuthManager, name: &str) -> Result<()> {
    if manager.store().delete(name)? {
        tracing::info!(account = %name, "Account deleted");
        manager
            .prompter()
            .notify(&format!("Account \"{name}\" deleted successfully."));
        Ok(())
    } else {
        Err(AuthError::InvalidInput(format!(
            "account \"{name}\" does not exist"
        )))
    }
}

/// Determine which account this invocation works with
///
/// Priority: new account > custom override > stored default > the only complete
/// account > operator choice (first account when non-interactive) > a new account.
pub fn resolve_active_account(
    manager: &AuthManager,
    selection: &AccountSelection,
) -> Result<ResolvedAccount> {
    let data = manager.store().load()?;
    let no_default = data.default_account.is_none();

    if let Some(hint) = &selection.new_account {
        let name = choose_new_account_name(manager, hint)?;
        return Ok(ResolvedAccount {
            name,
            persist_default: no_default,
        });
    }

    if let Some(custom) = &selection.custom_account {
        if account_exists(&data, custom) {
            return Ok(ResolvedAccount {
                name: custom.clone(),
                persist_default: no_default,
            });
        }
        return Err(AuthError::InvalidInput(format!(
            "account \"{custom}\" does not exist or is incomplete"
        )));
    }

    if let Some(default) = &data.default_account {
        if account_exists(&data, default) {
            return Ok(ResolvedAccount {
                name: default.clone(),
                persist_default: false,
            });
        }
        tracing::warn!(account = %default, "Default account is missing or incomplete, clearing it");
        manager.store().set_default(None)?;
    }

    let accounts = list_accounts(&data);
    let name = match accounts.as_slice() {
        [] => choose_new_account_name(manager, "")?,
        [only] => only.clone(),
        [first, ..] if !manager.prompter().is_interactive() => {
            tracing::warn!(
                account = %first,
                "Multiple accounts configured and no default set, using the first one; pass --account to choose"
            );
            manager.prompter().notify(&format!(
                "Warning: multiple accounts found, using \"{first}\". Use --account to pick another."
            ));
            first.clone()
        }
        _ => select_account(manager, &accounts)?,
    };

    Ok(ResolvedAccount {
        name,
        persist_default: true,
    })
}

fn select_account(manager: &AuthManager, accounts: &[String]) -> Result<String> {
    let items: Vec<String> = accounts
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {name}", i + 1))
        .collect();

    loop {
        match manager.prompter().select("Select an account", &items) {
            Ok(index) if index < accounts.len() => return Ok(accounts[index].clone()),
            Ok(_) => manager.prompter().notify("Invalid selection, try again."),
            Err(e) if e.is_recoverable() => manager.prompter().notify(&e.to_string()),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccountRecord, Field};
    use proptest::prelude::*;

    fn record(client_id: &str, secret: &str, refresh: &str) -> AccountRecord {
        let mut r = AccountRecord::default();
        r.set(Field::ClientId, client_id);
        r.set(Field::ClientSecret, secret);
        r.set(Field::RefreshToken, refresh);
        r
    }

    #[test]
    fn test_list_only_complete_accounts() {
        let mut data = StoreData::default();
        data.accounts.insert("b".into(), record("id", "secret", "1//r"));
        data.accounts.insert("a".into(), record("id", "secret", "1//r"));
        data.accounts.insert("half".into(), record("id", "", "1//r"));

        assert_eq!(list_accounts(&data), vec!["a", "b"]);
        assert!(account_exists(&data, "a"));
        assert!(!account_exists(&data, "half"));
        assert!(!account_exists(&data, "missing"));
    }

    proptest! {
        #[test]
        fn prop_exists_iff_all_three_fields(
            id in "(|[a-z0-9]{1,8})",
            secret in "(|[a-z0-9]{1,8})",
            refresh in "(|[a-z0-9]{1,8})",
        ) {
            let mut data = StoreData::default();
            data.accounts.insert("acct".into(), record(&id, &secret, &refresh));
            let expected = !id.is_empty() && !secret.is_empty() && !refresh.is_empty();
            prop_assert_eq!(account_exists(&data, "acct"), expected);
        }
    }
}
