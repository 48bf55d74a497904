//! # Utilities Module
//!
//! Internal utility modules for the core-logic crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod gas;
pub(crate) mod http_client;
pub(crate) mod logger;
pub(crate) mod retry;
pub(crate) mod runner;
pub(crate) mod wallet_manager;

// Selective exports - only public utilities
pub use gas::GasConfig;
pub use http_client::{parse_http_date_ms, HttpReply, HttpRetryClient};
pub use logger::{setup_logger, CLAIM_RESULT_TARGET};
pub use runner::WorkerRunner;
pub use wallet_manager::{WalletKeys, WalletManager};
