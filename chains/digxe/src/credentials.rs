use core_logic::ConfigError;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// One account: a label for logs and the full cookie string copied from the
/// browser.
#[derive(Clone)]
pub struct AccountCredential {
    label: String,
    cookie: String,
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredential")
            .field("label", &self.label)
            .field("cookie", &"***REDACTED***")
            .finish()
    }
}

impl AccountCredential {
    pub fn new(label: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cookie: cookie.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

/// One cookie per line; blank lines and `#` comments are skipped. Accounts
/// are numbered from 1 in file order.
pub fn parse_accounts(content: &str) -> Vec<AccountCredential> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(idx, cookie)| AccountCredential::new(format!("Account {}", idx + 1), cookie))
        .collect()
}

pub fn load_accounts(path: &Path) -> Result<Vec<AccountCredential>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        msg: e.to_string(),
    })?;

    let accounts = parse_accounts(&content);
    if accounts.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: path.display().to_string(),
            reason: "no cookie lines".to_string(),
        });
    }
    info!("Loaded {} account(s) from {}", accounts.len(), path.display());
    Ok(accounts)
}
