use anyhow::{Context, Result};
use config::{Config, Environment, File};
use core_logic::{ChainConfig, GasConfig, HttpConfig};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DigxeConfig {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_cookie_file")]
    pub cookie_file: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub gas: GasConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_mining_duration_secs")]
    pub mining_duration_secs: u64,
    #[serde(default = "default_poll_ceiling_secs")]
    pub poll_ceiling_secs: u64,
    #[serde(default = "default_poll_floor_secs")]
    pub poll_floor_secs: u64,
    #[serde(default = "default_claim_cooldown_secs")]
    pub claim_cooldown_secs: u64,
    #[serde(default = "default_account_pause_ms")]
    pub account_pause_ms: u64,
    /// Try one claim + start per account on the first sweep of a run.
    #[serde(default = "default_true")]
    pub first_sweep_claim: bool,
    /// Redraw a combined countdown every second instead of sleeping silently.
    /// Unset means on for a single account and off for several.
    #[serde(default)]
    pub live_countdown: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    #[serde(default = "default_key_file")]
    pub key_file: String,
    #[serde(default = "default_tx_hash_file")]
    pub tx_hash_file: String,
    #[serde(default)]
    pub tx_hash_override: Option<String>,
    #[serde(default = "default_signature_path")]
    pub signature_path: String,
    #[serde(default = "default_withdraw_paths")]
    pub withdraw_paths: Vec<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_pause_secs")]
    pub attempt_pause_secs: u64,
    /// Never prompt the operator.
    #[serde(default)]
    pub non_interactive: bool,
}

fn default_origin() -> String {
    "https://game.digxe.com".to_string()
}
fn default_cookie_file() -> String {
    "cookie.txt".to_string()
}
fn default_mining_duration_secs() -> u64 {
    24 * 60 * 60
}
fn default_poll_ceiling_secs() -> u64 {
    15 * 60
}
fn default_poll_floor_secs() -> u64 {
    5
}
fn default_claim_cooldown_secs() -> u64 {
    60
}
fn default_account_pause_ms() -> u64 {
    2_000
}
fn default_true() -> bool {
    true
}
fn default_key_file() -> String {
    "pv.txt".to_string()
}
fn default_tx_hash_file() -> String {
    "txhash.txt".to_string()
}
fn default_signature_path() -> String {
    "/wallet/get-signature".to_string()
}
fn default_withdraw_paths() -> Vec<String> {
    vec!["/wallet/withdraw".to_string(), "/wallet/claim".to_string()]
}
fn default_max_attempts() -> u32 {
    2
}
fn default_attempt_pause_secs() -> u64 {
    5
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mining_duration_secs: default_mining_duration_secs(),
            poll_ceiling_secs: default_poll_ceiling_secs(),
            poll_floor_secs: default_poll_floor_secs(),
            claim_cooldown_secs: default_claim_cooldown_secs(),
            account_pause_ms: default_account_pause_ms(),
            first_sweep_claim: true,
            live_countdown: None,
        }
    }
}

impl ScheduleConfig {
    pub fn live_countdown_for(&self, accounts: usize) -> bool {
        self.live_countdown.unwrap_or(accounts == 1)
    }

    pub fn mining_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.mining_duration_secs as i64)
    }

    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_secs(self.poll_ceiling_secs)
    }

    pub fn poll_floor(&self) -> Duration {
        Duration::from_secs(self.poll_floor_secs)
    }

    pub fn claim_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_cooldown_secs as i64)
    }

    pub fn account_pause(&self) -> Duration {
        Duration::from_millis(self.account_pause_ms)
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
            tx_hash_file: default_tx_hash_file(),
            tx_hash_override: None,
            signature_path: default_signature_path(),
            withdraw_paths: default_withdraw_paths(),
            max_attempts: default_max_attempts(),
            attempt_pause_secs: default_attempt_pause_secs(),
            non_interactive: false,
        }
    }
}

impl WalletConfig {
    pub fn attempt_pause(&self) -> Duration {
        Duration::from_secs(self.attempt_pause_secs)
    }
}

impl Default for DigxeConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cookie_file: default_cookie_file(),
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
            wallet: WalletConfig::default(),
            chain: ChainConfig::default(),
            gas: GasConfig::default(),
        }
    }
}

impl DigxeConfig {
    /// Optional TOML file, then `DIGXE__SECTION__KEY` variables, then the
    /// flat variable names older setups export.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("DIGXE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let mut config: DigxeConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies the flat environment names. `lookup` is injected so tests do
    /// not have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("RPC_URL") {
            self.chain.rpc_url = v;
        }
        if let Some(v) = get("CHAIN_ID") {
            self.chain.chain_id = v
                .parse()
                .with_context(|| format!("CHAIN_ID must be an integer, got '{}'", v))?;
        }
        if let Some(v) = get("CONTRACT_ADDRESS") {
            self.chain.contract_address = v;
        }
        if let Some(v) = get("CONTRACT_ABI") {
            self.chain.contract_abi_path = v;
        }
        if let Some(v) = get("CONTRACT_ABI_JSON") {
            self.chain.contract_abi_json = Some(v);
        }
        if let Some(v) = get("CONTRACT_METHOD") {
            self.chain.contract_method = v;
        }
        if let Some(v) = get("TX_HASH") {
            self.wallet.tx_hash_override = Some(v);
        }
        if get("DIGXE_LIVE").is_some_and(|v| is_truthy(&v))
            || get("DIGXE_MULTI_LIVE").is_some_and(|v| is_truthy(&v))
        {
            self.schedule.live_countdown = Some(true);
        }
        if get("DIGXE_NO_ASK").is_some_and(|v| is_truthy(&v)) {
            self.wallet.non_interactive = true;
        }
        Ok(())
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}
