//! On-chain broadcast capability.
//!
//! Decided once at start-up: either a signer wired to the configured contract,
//! or a stand-in that reports why broadcasting is unavailable.

use super::WithdrawalAuthorization;
use crate::error::BroadcastError;
use async_trait::async_trait;
use core_logic::{with_retry, ChainConfig, GasConfig, RetryConfig};
use ethers::abi::{Abi, Function, Token};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Broadcaster: Send + Sync {
    fn describe(&self) -> String;

    /// Sends one transaction and returns its hash. Never retried by callers.
    async fn broadcast(
        &self,
        authorization: &WithdrawalAuthorization,
    ) -> Result<String, BroadcastError>;
}

pub struct UnavailableBroadcaster {
    reason: String,
}

impl UnavailableBroadcaster {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Broadcaster for UnavailableBroadcaster {
    fn describe(&self) -> String {
        format!("unavailable ({})", self.reason)
    }

    async fn broadcast(&self, _: &WithdrawalAuthorization) -> Result<String, BroadcastError> {
        Err(BroadcastError::Unavailable(self.reason.clone()))
    }
}

pub struct EthersBroadcaster {
    provider: Provider<Http>,
    wallet: LocalWallet,
    contract: Address,
    function: Function,
    chain_id: u64,
    gas: GasConfig,
    rpc_retry: RetryConfig,
}

impl EthersBroadcaster {
    pub fn new(
        chain: &ChainConfig,
        gas: GasConfig,
        private_key: &str,
        rpc_retry: RetryConfig,
    ) -> Result<Self, BroadcastError> {
        let missing = chain.missing_fields();
        if !missing.is_empty() {
            return Err(BroadcastError::Unavailable(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let abi = load_abi(chain)?;
        let function = abi
            .function(&chain.contract_method)
            .map_err(|e| BroadcastError::Abi(format!("{}: {}", chain.contract_method, e)))?
            .clone();
        let contract: Address = chain
            .contract_address
            .parse()
            .map_err(|_| BroadcastError::Unavailable("invalid contract_address".to_string()))?;
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
            .map_err(|e| BroadcastError::Rpc(e.to_string()))?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| BroadcastError::Signing(e.to_string()))?
            .with_chain_id(chain.chain_id);

        Ok(Self {
            provider,
            wallet,
            contract,
            function,
            chain_id: chain.chain_id,
            gas,
            rpc_retry,
        })
    }
}

#[async_trait]
impl Broadcaster for EthersBroadcaster {
    fn describe(&self) -> String {
        format!(
            "{}() on {:?} (chain {})",
            self.function.name, self.contract, self.chain_id
        )
    }

    async fn broadcast(
        &self,
        authorization: &WithdrawalAuthorization,
    ) -> Result<String, BroadcastError> {
        let data = encode_call(&self.function, authorization)?;
        let from = self.wallet.address();

        let nonce = with_retry(&self.rpc_retry, "get_transaction_count", || async move {
            self.provider
                .get_transaction_count(from, None)
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| BroadcastError::Rpc(format!("{:#}", e)))?;

        let gas_price = with_retry(&self.rpc_retry, "get_gas_price", || async move {
            self.provider.get_gas_price().await.map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| BroadcastError::Rpc(format!("{:#}", e)))?;

        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.contract)
            .data(data)
            .nonce(nonce)
            .gas_price(gas_price)
            .chain_id(self.chain_id)
            .into();

        let gas_limit = match self.provider.estimate_gas(&tx, None).await {
            Ok(estimate) => self.gas.padded(estimate.low_u64()),
            Err(e) => {
                warn!(
                    "Gas estimation failed ({}). Using {}.",
                    e, self.gas.fallback_gas_limit
                );
                self.gas.fallback_gas_limit
            }
        };
        tx.set_gas(gas_limit);

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| BroadcastError::Signing(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| BroadcastError::Rpc(e.to_string()))?;
        let hash = format!("{:?}", pending.tx_hash());
        info!("Broadcast {} from {:?}", hash, from);
        Ok(hash)
    }
}

/// Builds the broadcaster for this run. Any missing piece yields the
/// unavailable stand-in, with the reason logged once.
pub fn build_broadcaster(
    chain: &ChainConfig,
    gas: GasConfig,
    private_key: Option<&str>,
    rpc_retry: RetryConfig,
) -> Arc<dyn Broadcaster> {
    let built = match private_key {
        Some(pk) => EthersBroadcaster::new(chain, gas, pk, rpc_retry),
        None => Err(BroadcastError::Unavailable("no private key".to_string())),
    };

    match built {
        Ok(b) => {
            info!("On-chain fallback ready: {}", b.describe());
            Arc::new(b)
        }
        Err(e) => {
            info!("On-chain fallback disabled: {}", e);
            Arc::new(UnavailableBroadcaster::new(e.to_string()))
        }
    }
}

/// ABI from `contract_abi_path`, else from the inline JSON.
pub fn load_abi(chain: &ChainConfig) -> Result<Abi, BroadcastError> {
    let path = Path::new(&chain.contract_abi_path);
    let raw = if path.exists() {
        std::fs::read_to_string(path)
            .map_err(|e| BroadcastError::Abi(format!("{}: {}", path.display(), e)))?
    } else if let Some(inline) = chain.contract_abi_json.as_deref() {
        inline.to_string()
    } else {
        return Err(BroadcastError::Unavailable(format!(
            "no ABI at {} and no inline ABI",
            path.display()
        )));
    };
    serde_json::from_str(&raw).map_err(|e| BroadcastError::Abi(e.to_string()))
}

/// Calldata for `method(amount, nonce, deadline, signature)`.
pub fn encode_call(
    function: &Function,
    authorization: &WithdrawalAuthorization,
) -> Result<Bytes, BroadcastError> {
    let tokens = [
        Token::Uint(parse_uint("amount", &authorization.amount)?),
        Token::Uint(parse_uint("nonce", &authorization.nonce)?),
        Token::Uint(parse_uint("deadline", &authorization.deadline)?),
        Token::Bytes(parse_signature(&authorization.signature)?),
    ];
    function
        .encode_input(&tokens)
        .map(Bytes::from)
        .map_err(|e| BroadcastError::Abi(e.to_string()))
}

/// Integers arrive as JSON numbers, decimal strings, or `0x` hex strings.
pub fn parse_uint(field: &str, value: &Value) -> Result<U256, BroadcastError> {
    let invalid = || BroadcastError::InvalidAuthorization(format!("{}: {}", field, value));
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => Ok(U256::from(v)),
            None => U256::from_dec_str(&n.to_string()).map_err(|_| invalid()),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex_digits) => U256::from_str_radix(hex_digits, 16).map_err(|_| invalid()),
                None => U256::from_dec_str(s).map_err(|_| invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

fn parse_signature(signature: &str) -> Result<Vec<u8>, BroadcastError> {
    let digits = signature.trim().trim_start_matches("0x");
    hex::decode(digits)
        .map_err(|e| BroadcastError::InvalidAuthorization(format!("signature: {}", e)))
}
