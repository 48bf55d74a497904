//! Error taxonomy for the reward bot.
//!
//! Transient transport failures never show up here: the HTTP client absorbs
//! them and reports exhaustion as a missing response.

use thiserror::Error;

/// A scraped or free-text source that did not yield a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvidenceError {
    #[error("{source_name}: no match")]
    NotFound { source_name: &'static str },

    #[error("{source_name}: unparseable value '{raw}'")]
    Malformed {
        source_name: &'static str,
        raw: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("credential rejected (401/403)")]
    AuthExpired,

    #[error("no evidence source produced a deadline")]
    Unresolved,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClaimError {
    #[error("credential rejected (401/403)")]
    AuthExpired,

    #[error("no response after retries")]
    NoResponse,

    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("server did not report success")]
    NotSuccessful,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WithdrawalError {
    #[error("withdrawal rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("credential rejected (401/403)")]
    AuthExpired,

    #[error("no response from {step} after retries")]
    NoResponse { step: &'static str },

    #[error("transaction proof required but none could be obtained")]
    NoProof,

    #[error("no withdrawal endpoint accepted the request ({last})")]
    NoCandidateAccepted { last: String },

    #[error("malformed authorization: {0}")]
    MalformedAuthorization(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BroadcastError {
    #[error("on-chain broadcast unavailable: {0}")]
    Unavailable(String),

    #[error("contract ABI error: {0}")]
    Abi(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("authorization cannot be encoded: {0}")]
    InvalidAuthorization(String),
}
