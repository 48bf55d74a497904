use crate::error::WalletError;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

const PRIVATE_KEY_LEN: usize = 66;
const ADDRESS_LEN: usize = 42;

/// Signing material read from the key file. Either half may be missing.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct WalletKeys {
    private_key: Option<String>,
    address: Option<String>,
}

impl fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeys")
            .field("address", &self.address)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

impl WalletKeys {
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

pub struct WalletManager;

impl WalletManager {
    /// Loads the key file. A missing file is not an error: the caller decides
    /// whether keys are required for what it is about to do.
    pub fn load(path: &Path) -> Result<Option<WalletKeys>, WalletError> {
        if !path.exists() {
            debug!("Key file {:?} not present", path);
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| WalletError::KeyFileUnreadable {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        Ok(Some(Self::parse(&content)))
    }

    /// Accepts a bare `0x` private key, a bare 64-char hex key, a bare
    /// address, or `KEY=VALUE` lines such as `PRIVATE_KEY=0x..` and
    /// `WALLET_ADDRESS=0x..`. Later lines win.
    pub fn parse(content: &str) -> WalletKeys {
        let mut keys = WalletKeys::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let lower = line.to_lowercase();
            let value = match line.split_once('=') {
                Some((_, v)) => v.trim(),
                None => line,
            };

            if lower.contains("address") {
                if let Some(addr) = as_address(value) {
                    keys.address = Some(addr);
                }
            } else if lower.contains("private_key")
                || lower.contains("privkey")
                || lower.contains("key")
            {
                if let Some(pk) = as_private_key(value) {
                    keys.private_key = Some(pk);
                }
            } else if let Some(pk) = as_private_key(line) {
                keys.private_key = Some(pk);
            } else if let Some(addr) = as_address(line) {
                keys.address = Some(addr);
            }
        }

        keys
    }

    /// Appends `WALLET_ADDRESS=<address>` so the next run does not have to
    /// derive or ask for it again.
    pub fn persist_address(path: &Path, address: &str) -> Result<(), WalletError> {
        let persist_err = |e: std::io::Error| WalletError::PersistFailed {
            path: path.display().to_string(),
            msg: e.to_string(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(persist_err)?;
        writeln!(file, "\nWALLET_ADDRESS={}", address).map_err(persist_err)?;
        info!("Wallet address saved to {}", path.display());
        Ok(())
    }
}

fn as_private_key(value: &str) -> Option<String> {
    let is_hex = |s: &str| s.chars().all(|c| c.is_ascii_hexdigit());
    if value.starts_with("0x") && value.len() >= PRIVATE_KEY_LEN {
        return value
            .get(2..PRIVATE_KEY_LEN)
            .filter(|digits| is_hex(*digits))
            .map(|digits| format!("0x{}", digits));
    }
    if value.len() == 64 && is_hex(value) {
        return Some(format!("0x{}", value));
    }
    None
}

fn as_address(value: &str) -> Option<String> {
    if value.starts_with("0x") && value.len() >= ADDRESS_LEN && value.len() < PRIVATE_KEY_LEN {
        return value.get(..ADDRESS_LEN).map(str::to_string);
    }
    None
}
