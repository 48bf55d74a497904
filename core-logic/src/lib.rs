//! # Core Logic - Shared Utilities for the Reward Bots
//!
//! This crate provides the service-agnostic plumbing used by the bot crates
//! under `chains/`: HTTP with bounded retry, key files, gas policy, logging
//! and shutdown handling.
//!
//! ## Modules
//!
//! - [`config`] - Shared configuration structures
//! - [`error`] - Typed error handling with thiserror
//! - `utils` - HTTP retry client, wallet keys, gas, logger, runner

pub mod config;
pub mod error;
pub(crate) mod utils;

// Selective exports - only public API types
pub use config::{ChainConfig, HttpConfig};
pub use error::{ConfigError, NetworkError, WalletError};

pub use utils::{
    parse_http_date_ms, setup_logger, GasConfig, HttpReply, HttpRetryClient, WalletKeys,
    WalletManager, WorkerRunner, CLAIM_RESULT_TARGET,
};

// Export retry utilities for testing
pub use utils::retry::{is_retryable_status, with_retry, RetryConfig};
