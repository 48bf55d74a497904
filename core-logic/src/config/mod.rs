use serde::{Deserialize, Serialize};

/// Transport settings shared by every outbound HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    3_000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// On-chain settings used when a withdrawal needs a broadcast transaction.
///
/// Every field may be empty; an incomplete config simply means no broadcast
/// capability for this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default = "default_contract_method")]
    pub contract_method: String,
    #[serde(default = "default_contract_abi_path")]
    pub contract_abi_path: String,
    /// Inline ABI JSON, used when the ABI file is absent.
    #[serde(default)]
    pub contract_abi_json: Option<String>,
}

fn default_contract_method() -> String {
    "withdraw".to_string()
}

fn default_contract_abi_path() -> String {
    "contract_abi.json".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: 0,
            contract_address: String::new(),
            contract_method: default_contract_method(),
            contract_abi_path: default_contract_abi_path(),
            contract_abi_json: None,
        }
    }
}

impl ChainConfig {
    /// Names of the fields that must be set before a broadcast can be attempted.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.rpc_url.trim().is_empty() {
            missing.push("rpc_url");
        }
        if self.chain_id == 0 {
            missing.push("chain_id");
        }
        if self.contract_address.trim().is_empty() {
            missing.push("contract_address");
        }
        if self.contract_method.trim().is_empty() {
            missing.push("contract_method");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}
