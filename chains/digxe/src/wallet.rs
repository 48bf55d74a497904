use core_logic::{WalletKeys, WalletManager};
use dialoguer::{theme::ColorfulTheme, Input};
use ethers::prelude::*;
use ethers::utils::to_checksum;
use std::path::Path;
use tracing::{info, warn};

/// Checksummed address for a private key.
pub fn derive_address(private_key: &str) -> Option<String> {
    let wallet: LocalWallet = private_key.parse().ok()?;
    Some(to_checksum(&wallet.address(), None))
}

/// Address from the key file, else derived from its private key (and written
/// back), else asked for when prompting is allowed.
pub async fn resolve_wallet_address(
    keys: Option<&WalletKeys>,
    key_path: &Path,
    interactive: bool,
) -> Option<String> {
    if let Some(address) = keys.and_then(WalletKeys::address) {
        return Some(address.to_string());
    }

    if let Some(address) = keys
        .and_then(WalletKeys::private_key)
        .and_then(derive_address)
    {
        info!("Wallet address derived from private key: {}", address);
        if let Err(e) = WalletManager::persist_address(key_path, &address) {
            warn!("{}", e);
        }
        return Some(address);
    }

    if !interactive {
        return None;
    }
    let address = tokio::task::spawn_blocking(prompt_address).await.ok()??;
    if let Err(e) = WalletManager::persist_address(key_path, &address) {
        warn!("{}", e);
    }
    Some(address)
}

fn prompt_address() -> Option<String> {
    let input: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Wallet address (0x...)")
        .allow_empty(true)
        .interact_text()
        .ok()?;
    let input = input.trim();
    (input.starts_with("0x") && input.len() == 42).then(|| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

    #[test]
    fn test_derive_address() {
        assert_eq!(derive_address(PK).as_deref(), Some(ADDRESS));
        assert_eq!(derive_address("0x1234"), None);
    }

    #[tokio::test]
    async fn test_address_from_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pv.txt");
        let keys = WalletManager::parse(&format!("{}\nWALLET_ADDRESS=0x{}", PK, "1".repeat(40)));

        let address = resolve_wallet_address(Some(&keys), &path, false).await;
        assert_eq!(address, Some(format!("0x{}", "1".repeat(40))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_derived_address_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pv.txt");
        std::fs::write(&path, PK).unwrap();
        let keys = WalletManager::load(&path).unwrap().unwrap();

        let address = resolve_wallet_address(Some(&keys), &path, false).await;
        assert_eq!(address.as_deref(), Some(ADDRESS));

        let reloaded = WalletManager::load(&path).unwrap().unwrap();
        assert_eq!(reloaded.address(), Some(ADDRESS));
    }

    #[tokio::test]
    async fn test_no_keys_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let address = resolve_wallet_address(None, &dir.path().join("pv.txt"), false).await;
        assert_eq!(address, None);
    }
}
