// Credential store
// Plain-text `KEY="value"` file holding every account, namespaced as ACCOUNT_<name>_<FIELD>

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::{AccountRecord, Field};
use crate::error::{AuthError, Result};

const DEFAULT_ACCOUNT_KEY: &str = "DEFAULT_ACCOUNT";
const ACCOUNT_PREFIX: &str = "ACCOUNT_";

/// Parsed contents of the credential store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreData {
    pub default_account: Option<String>,
    pub accounts: BTreeMap<String, AccountRecord>,
    /// Unnamespaced fields left over from single-account configs
    pub legacy: AccountRecord,
    /// Keys this crate does not own, preserved verbatim
    pub extra: Vec<(String, String)>,
}

impl StoreData {
    /// Parse store text. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut data = StoreData::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw)) = line.split_once('=') else {
                tracing::debug!("Skipping malformed store line");
                continue;
            };
            let key = key.trim();
            let value = unquote(raw.trim());

            if key == DEFAULT_ACCOUNT_KEY {
                data.default_account = (!value.is_empty()).then_some(value);
            } else if let Some((name, field)) = split_account_key(key) {
                data.accounts
                    .entry(name.to_string())
                    .or_default()
                    .set(field, &value);
            } else if let Some(field) = Field::from_key(key) {
                data.legacy.set(field, &value);
            } else {
                data.extra.retain(|(k, _)| k != key);
                data.extra.push((key.to_string(), value));
            }
        }

        data
    }

    /// Render store text, one `KEY="value"` per line
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (key, value) in &self.extra {
            push_line(&mut out, key, value);
        }
        for field in Field::ALL.iter().rev() {
            if let Some(value) = self.legacy.get(*field) {
                push_line(&mut out, field.key(), &value);
            }
        }
        if let Some(default) = &self.default_account {
            push_line(&mut out, DEFAULT_ACCOUNT_KEY, default);
        }
        for (name, record) in &self.accounts {
            for field in Field::ALL.iter().rev() {
                if let Some(value) = record.get(*field) {
                    let key = format!("{ACCOUNT_PREFIX}{name}_{}", field.key());
                    push_line(&mut out, &key, &value);
                }
            }
        }

        out
    }

    pub fn account(&self, name: &str) -> Option<&AccountRecord> {
        self.accounts.get(name)
    }
}

/// Split `ACCOUNT_<name>_<FIELD>` into its parts
fn split_account_key(key: &str) -> Option<(&str, Field)> {
    let rest = key.strip_prefix(ACCOUNT_PREFIX)?;
    Field::ALL.into_iter().find_map(|field| {
        let name = rest.strip_suffix(field.key())?.strip_suffix('_')?;
        (!name.is_empty()).then_some((name, field))
    })
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str("=\"");
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push_str("\"\n");
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                value.push(next);
            }
        } else {
            value.push(c);
        }
    }
    value
}

/// Handle to the on-disk credential store
///
/// Every mutation re-reads the file, applies the change and rewrites it in full.
/// Writers in different processes are not synchronized; the last writer wins.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store. A missing file is an empty store.
    pub fn load(&self) -> Result<StoreData> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(StoreData::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::default()),
            Err(e) => Err(AuthError::store_io(&self.path, e)),
        }
    }

    /// Rewrite the whole file: made writable, rewritten, then restricted to owner-read-only
    pub fn save(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AuthError::store_io(parent, e))?;
        }
        if self.path.exists() {
            set_mode(&self.path, 0o600)?;
        }
        fs::write(&self.path, data.render()).map_err(|e| AuthError::store_io(&self.path, e))?;
        set_mode(&self.path, 0o400)
    }

    /// Load, apply `f`, save
    pub fn update<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T> {
        let mut data = self.load()?;
        let out = f(&mut data);
        self.save(&data)?;
        Ok(out)
    }

    /// Set one field of one account, creating the account if needed
    pub fn upsert(&self, account: &str, field: Field, value: &str) -> Result<()> {
        self.update(|data| {
            data.accounts
                .entry(account.to_string())
                .or_default()
                .set(field, value)
        })
    }

    /// Point `DEFAULT_ACCOUNT` at `name`, or clear it
    pub fn set_default(&self, name: Option<&str>) -> Result<()> {
        self.update(|data| data.default_account = name.map(str::to_string))
    }

    /// Remove every key under the account's namespace. Returns whether it existed.
    /// A missing account leaves the file untouched.
    pub fn delete(&self, account: &str) -> Result<bool> {
        let mut data = self.load()?;
        if data.accounts.remove(account).is_none() {
            return Ok(false);
        }
        if data.default_account.as_deref() == Some(account) {
            data.default_account = None;
        }
        self.save(&data)?;
        Ok(true)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| AuthError::store_io(path, e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| AuthError::store_io(path, e))?
        .permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms).map_err(|e| AuthError::store_io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("googledrive.conf"));
        (dir, store)
    }

    #[test]
    fn test_parse_namespaced_and_legacy() {
        let text = r#"
DEFAULT_ACCOUNT="work"
ACCOUNT_work_CLIENT_ID="1-abc.apps.googleusercontent.com"
ACCOUNT_work_ACCESS_TOKEN="ya29.x"
ACCOUNT_work_ACCESS_TOKEN_EXPIRY="4599"
ACCOUNT_my_ROOT_FOLDER_ROOT_FOLDER_NAME="Drive"
CLIENT_SECRET="legacy"
SOME_OTHER="kept"
"#;
        let data = StoreData::parse(text);
        assert_eq!(data.default_account.as_deref(), Some("work"));

        let work = data.account("work").unwrap();
        assert_eq!(work.client_id.as_deref(), Some("1-abc.apps.googleusercontent.com"));
        assert_eq!(work.access_token.as_deref(), Some("ya29.x"));
        assert_eq!(work.access_token_expiry, Some(4599));

        let odd = data.account("my_ROOT_FOLDER").unwrap();
        assert_eq!(odd.root_folder_name.as_deref(), Some("Drive"));

        assert_eq!(data.legacy.client_secret.as_deref(), Some("legacy"));
        assert_eq!(data.extra, vec![("SOME_OTHER".to_string(), "kept".to_string())]);
    }

    #[test]
    fn test_render_parse_preserves_data() {
        let mut data = StoreData::default();
        data.default_account = Some("a".to_string());
        data.accounts
            .entry("a".to_string())
            .or_default()
            .set(Field::ClientSecret, r#"we"ird\value"#);
        data.extra.push(("UPLOAD_MODE".to_string(), "fast".to_string()));

        assert_eq!(StoreData::parse(&data.render()), data);
    }

    #[test]
    fn test_refresh_token_is_stored_unescaped() {
        let (_dir, store) = temp_store();
        let token = "1//0gAbC-def_GHI/jkl";
        store.upsert("main", Field::RefreshToken, token).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains(&format!("ACCOUNT_main_REFRESH_TOKEN=\"{token}\"")));

        let data = store.load().unwrap();
        assert_eq!(data.account("main").unwrap().refresh_token.as_deref(), Some(token));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().unwrap(), StoreData::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_read_only_after_write() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.upsert("a", Field::ClientId, "x").unwrap();
        store.upsert("a", Field::ClientSecret, "y").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
    }

    #[test]
    fn test_delete_removes_namespace_and_default() {
        let (_dir, store) = temp_store();
        store.upsert("a", Field::ClientId, "x").unwrap();
        store.upsert("b", Field::ClientId, "y").unwrap();
        store.set_default(Some("a")).unwrap();

        assert!(store.delete("a").unwrap());
        let data = store.load().unwrap();
        assert!(data.account("a").is_none());
        assert!(data.account("b").is_some());
        assert_eq!(data.default_account, None);
    }

    #[test]
    fn test_delete_missing_account_leaves_store_unchanged() {
        let (_dir, store) = temp_store();
        store.upsert("a", Field::ClientId, "x").unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        assert!(!store.delete("ghost").unwrap());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested/dir/drive.conf"));
        store.set_default(Some("a")).unwrap();
        assert!(store.path().exists());
    }
}
