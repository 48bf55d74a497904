//! Transaction-hash proof for withdrawals that demand one.
//!
//! Sources in order: explicit override, the hash cached by an earlier run, a
//! fresh broadcast, and finally the operator when prompting is allowed. A
//! broadcast hash is written to the cache before it is returned.

use super::broadcaster::Broadcaster;
use super::WithdrawalAuthorization;
use dialoguer::{theme::ColorfulTheme, Input};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const TX_HASH_LEN: usize = 66;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofSource {
    Override,
    Cache,
    Broadcast,
    Operator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    pub hash: String,
    pub source: ProofSource,
}

/// Single-value file holding the last known transaction hash.
#[derive(Debug, Clone)]
pub struct TxHashCache {
    path: PathBuf,
}

impl TxHashCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        let hash = content.trim();
        (!hash.is_empty()).then(|| hash.to_string())
    }

    pub fn store(&self, hash: &str) -> std::io::Result<()> {
        fs::write(&self.path, format!("{}\n", hash))
    }
}

pub struct ProofResolver {
    override_hash: Option<String>,
    cache: TxHashCache,
    broadcaster: Arc<dyn Broadcaster>,
    interactive: bool,
}

impl ProofResolver {
    pub fn new(
        override_hash: Option<String>,
        cache: TxHashCache,
        broadcaster: Arc<dyn Broadcaster>,
        interactive: bool,
    ) -> Self {
        Self {
            override_hash: override_hash.filter(|h| !h.trim().is_empty()),
            cache,
            broadcaster,
            interactive,
        }
    }

    pub async fn resolve(&self, authorization: &WithdrawalAuthorization) -> Option<Proof> {
        if let Some(hash) = &self.override_hash {
            return Some(Proof {
                hash: hash.trim().to_string(),
                source: ProofSource::Override,
            });
        }

        if let Some(hash) = self.cache.load() {
            info!("Using cached transaction hash {}", hash);
            return Some(Proof {
                hash,
                source: ProofSource::Cache,
            });
        }

        match self.broadcaster.broadcast(authorization).await {
            Ok(hash) => {
                if let Err(e) = self.cache.store(&hash) {
                    warn!("Could not cache transaction hash {}: {}", hash, e);
                }
                return Some(Proof {
                    hash,
                    source: ProofSource::Broadcast,
                });
            }
            Err(e) => warn!("On-chain proof FAILED: {}", e),
        }

        if !self.interactive {
            return None;
        }
        let hash = tokio::task::spawn_blocking(prompt_tx_hash)
            .await
            .ok()
            .flatten()?;
        Some(Proof {
            hash,
            source: ProofSource::Operator,
        })
    }
}

fn prompt_tx_hash() -> Option<String> {
    let input: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Transaction hash (0x...)")
        .allow_empty(true)
        .interact_text()
        .ok()?;
    normalize_tx_hash(&input)
}

pub fn normalize_tx_hash(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with("0x") && raw.len() >= TX_HASH_LEN {
        raw.get(..TX_HASH_LEN).map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BroadcastError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        result: Result<String, BroadcastError>,
    }

    #[async_trait]
    impl Broadcaster for Counting {
        fn describe(&self) -> String {
            "counting".into()
        }

        async fn broadcast(&self, _: &WithdrawalAuthorization) -> Result<String, BroadcastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn counting(result: Result<String, BroadcastError>) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            result,
        })
    }

    fn authorization() -> WithdrawalAuthorization {
        WithdrawalAuthorization {
            amount: json!("1"),
            nonce: json!(1),
            deadline: json!(1),
            signature: "0x00".into(),
        }
    }

    #[tokio::test]
    async fn test_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TxHashCache::new(dir.path().join("txhash.txt"));
        cache.store("0xcached").unwrap();
        let broadcaster = counting(Ok("0xfresh".into()));

        let resolver =
            ProofResolver::new(Some("0xoverride".into()), cache, broadcaster.clone(), false);
        let proof = resolver.resolve(&authorization()).await.unwrap();

        assert_eq!(proof.source, ProofSource::Override);
        assert_eq!(proof.hash, "0xoverride");
        assert_eq!(broadcaster.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_before_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TxHashCache::new(dir.path().join("txhash.txt"));
        cache.store("0xcached").unwrap();
        let broadcaster = counting(Ok("0xfresh".into()));

        let resolver = ProofResolver::new(None, cache, broadcaster.clone(), false);
        let proof = resolver.resolve(&authorization()).await.unwrap();

        assert_eq!(
            proof,
            Proof {
                hash: "0xcached".into(),
                source: ProofSource::Cache,
            }
        );
        assert_eq!(broadcaster.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_hash_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txhash.txt");
        let broadcaster = counting(Ok("0xfresh".into()));

        let resolver =
            ProofResolver::new(None, TxHashCache::new(&path), broadcaster.clone(), false);
        let first = resolver.resolve(&authorization()).await.unwrap();
        let second = resolver.resolve(&authorization()).await.unwrap();

        assert_eq!(first.source, ProofSource::Broadcast);
        assert_eq!(second.source, ProofSource::Cache);
        assert_eq!(second.hash, "0xfresh");
        assert_eq!(broadcaster.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "0xfresh\n");
    }

    #[tokio::test]
    async fn test_failed_broadcast_without_prompt_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let broadcaster = counting(Err(BroadcastError::Rpc("nonce too low".into())));

        let resolver = ProofResolver::new(
            Some("   ".into()),
            TxHashCache::new(dir.path().join("txhash.txt")),
            broadcaster.clone(),
            false,
        );
        assert!(resolver.resolve(&authorization()).await.is_none());
        assert_eq!(broadcaster.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normalize_tx_hash() {
        let hash = format!("0x{}", "a".repeat(64));
        assert_eq!(normalize_tx_hash(&format!(" {}  ", hash)), Some(hash.clone()));
        assert_eq!(normalize_tx_hash(&format!("{}ff", hash)), Some(hash));
        assert_eq!(normalize_tx_hash("0x1234"), None);
        assert_eq!(normalize_tx_hash(""), None);
    }
}
