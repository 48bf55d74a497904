//! # Withdrawal Coordinator
//!
//! get-signature -> submit -> (proof -> resubmit), at most
//! `min(2, max_attempts, remainingWithdrawals)` times per invocation. Any hard
//! failure ends the invocation; nothing here touches claim scheduling.

pub mod broadcaster;
pub mod proof;

use crate::api::{display_value, reports_success, DigxeApi};
use crate::config::WalletConfig;
use crate::credentials::AccountCredential;
use crate::error::WithdrawalError;
use crate::evidence::requires_tx_proof;
use core_logic::{HttpReply, CLAIM_RESULT_TARGET};
use proof::{ProofResolver, ProofSource};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Body of `/wallet/get-signature`. Numbers may arrive as strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub nonce: Value,
    #[serde(default)]
    pub deadline: Value,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub withdrawal_info: Option<WithdrawalInfo>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub claimable_amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalInfo {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub remaining_withdrawals: i64,
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

impl SignatureResponse {
    pub fn remaining_withdrawals(&self) -> i64 {
        self.withdrawal_info
            .as_ref()
            .map(|w| w.remaining_withdrawals)
            .unwrap_or(0)
    }

    pub fn authorization(&self) -> Result<WithdrawalAuthorization, WithdrawalError> {
        let signature = self
            .signature
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WithdrawalError::MalformedAuthorization("no signature".into()))?;
        for (name, value) in [
            ("amount", &self.amount),
            ("nonce", &self.nonce),
            ("deadline", &self.deadline),
        ] {
            if value.is_null() {
                return Err(WithdrawalError::MalformedAuthorization(format!(
                    "no {}",
                    name
                )));
            }
        }
        Ok(WithdrawalAuthorization {
            amount: self.amount.clone(),
            nonce: self.nonce.clone(),
            deadline: self.deadline.clone(),
            signature: signature.to_string(),
        })
    }
}

/// The time-boxed, server-signed permission to withdraw. Values are kept as
/// the server sent them so they are echoed back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalAuthorization {
    pub amount: Value,
    pub nonce: Value,
    pub deadline: Value,
    pub signature: String,
}

impl WithdrawalAuthorization {
    pub fn payload(&self, wallet_address: &str) -> Value {
        json!({
            "walletAddress": wallet_address,
            "amount": self.amount,
            "nonce": self.nonce,
            "deadline": self.deadline,
            "signature": self.signature,
        })
    }

    pub fn payload_with_proof(&self, wallet_address: &str, tx_hash: &str) -> Value {
        let mut payload = self.payload(wallet_address);
        payload["transactionHash"] = json!(tx_hash);
        payload["txHash"] = json!(tx_hash);
        payload
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Pending,
    Submitted,
    ProofRequired,
    Broadcast,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WithdrawalAttempt {
    pub number: u32,
    pub wallet_address: String,
    pub claimable_amount: f64,
    pub authorization: WithdrawalAuthorization,
    /// Once set, every later submission of this attempt reuses it.
    pub tx_hash: Option<String>,
    pub status: AttemptStatus,
    pub claimed: Option<String>,
    proof_consulted: bool,
}

impl WithdrawalAttempt {
    pub fn new(
        number: u32,
        wallet_address: &str,
        claimable_amount: f64,
        authorization: WithdrawalAuthorization,
    ) -> Self {
        Self {
            number,
            wallet_address: wallet_address.to_string(),
            claimable_amount,
            authorization,
            tx_hash: None,
            status: AttemptStatus::Pending,
            claimed: None,
            proof_consulted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalOutcome {
    /// Every planned attempt was confirmed.
    Completed,
    /// The server reports no withdrawals left today.
    QuotaExhausted,
    /// Nothing claimable, either up front or on a refreshed signature.
    NothingClaimable,
    /// A hard failure ended the invocation early.
    Stopped(WithdrawalError),
}

#[derive(Debug, Clone)]
pub struct WithdrawalReport {
    pub wallet_address: String,
    pub total_balance: f64,
    pub claimable_amount: f64,
    pub remaining_withdrawals: i64,
    pub attempts: Vec<WithdrawalAttempt>,
    pub outcome: WithdrawalOutcome,
}

impl WithdrawalReport {
    pub fn confirmed(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Confirmed)
            .count()
    }
}

/// Hard cap on submissions per invocation. `wallet.max_attempts` can only lower it.
pub const MAX_ATTEMPTS_PER_INVOCATION: u32 = 2;

pub struct WithdrawalCoordinator<'a> {
    api: &'a DigxeApi,
    config: &'a WalletConfig,
    proof: ProofResolver,
}

impl<'a> WithdrawalCoordinator<'a> {
    pub fn new(api: &'a DigxeApi, config: &'a WalletConfig, proof: ProofResolver) -> Self {
        Self { api, config, proof }
    }

    /// `&mut self` keeps one invocation per coordinator in flight.
    pub async fn run(
        &mut self,
        account: &AccountCredential,
        wallet_address: &str,
    ) -> Result<WithdrawalReport, WithdrawalError> {
        let summary = self.fetch_signature(account, wallet_address).await?;
        let remaining = summary.remaining_withdrawals();

        info!(
            target: CLAIM_RESULT_TARGET,
            "Wallet: {} | balance={} | claimable={} | remainingWithdrawals={}",
            wallet_address,
            summary.total_balance,
            summary.claimable_amount,
            remaining
        );

        let mut report = WithdrawalReport {
            wallet_address: wallet_address.to_string(),
            total_balance: summary.total_balance,
            claimable_amount: summary.claimable_amount,
            remaining_withdrawals: remaining,
            attempts: Vec::new(),
            outcome: WithdrawalOutcome::Completed,
        };

        if remaining <= 0 {
            info!("No withdrawal quota left. Done.");
            report.outcome = WithdrawalOutcome::QuotaExhausted;
            return Ok(report);
        }
        if summary.claimable_amount <= 0.0 {
            info!("Nothing claimable. Done.");
            report.outcome = WithdrawalOutcome::NothingClaimable;
            return Ok(report);
        }

        let cap = self.config.max_attempts.min(MAX_ATTEMPTS_PER_INVOCATION);
        let planned = (cap as i64).min(remaining).max(0) as u32;
        for number in 1..=planned {
            let signature = match self.fetch_signature(account, wallet_address).await {
                Ok(s) => s,
                Err(e) => {
                    report.outcome = WithdrawalOutcome::Stopped(e);
                    break;
                }
            };
            if signature.claimable_amount <= 0.0 {
                info!("claimableAmount=0 on refreshed signature. Stopping.");
                report.outcome = WithdrawalOutcome::NothingClaimable;
                break;
            }
            let authorization = match signature.authorization() {
                Ok(a) => a,
                Err(e) => {
                    report.outcome = WithdrawalOutcome::Stopped(e);
                    break;
                }
            };

            let mut attempt = WithdrawalAttempt::new(
                number,
                wallet_address,
                signature.claimable_amount,
                authorization,
            );
            match self.submit(account, &mut attempt).await {
                Ok(claimed) => {
                    attempt.status = AttemptStatus::Confirmed;
                    info!(
                        target: CLAIM_RESULT_TARGET,
                        "Withdraw {}/{} SUCCESS. amount={}", number, planned, claimed
                    );
                    attempt.claimed = Some(claimed);
                    report.attempts.push(attempt);
                }
                Err(e) => {
                    attempt.status = AttemptStatus::Failed;
                    warn!(
                        target: CLAIM_RESULT_TARGET,
                        "Withdraw {}/{} FAILED: {}", number, planned, e
                    );
                    report.attempts.push(attempt);
                    report.outcome = WithdrawalOutcome::Stopped(e);
                    break;
                }
            }

            if number < planned {
                tokio::time::sleep(self.config.attempt_pause()).await;
            }
        }

        Ok(report)
    }

    async fn fetch_signature(
        &self,
        account: &AccountCredential,
        wallet_address: &str,
    ) -> Result<SignatureResponse, WithdrawalError> {
        let reply = self
            .api
            .get_signature(account, &self.config.signature_path, wallet_address)
            .await
            .ok_or(WithdrawalError::NoResponse {
                step: "get-signature",
            })?;

        if reply.is_auth_failure() {
            return Err(WithdrawalError::AuthExpired);
        }
        match reply.json::<SignatureResponse>() {
            Some(body) if body.success == Some(true) => Ok(body),
            _ => Err(WithdrawalError::Rejected {
                status: reply.status.as_u16(),
                message: reply.message(),
            }),
        }
    }

    /// Tries each candidate path. A 404 moves on to the next path; a proof
    /// demand is answered and resubmitted on the same path.
    async fn submit(
        &self,
        account: &AccountCredential,
        attempt: &mut WithdrawalAttempt,
    ) -> Result<String, WithdrawalError> {
        let payload = attempt.authorization.payload(&attempt.wallet_address);
        let mut last: Option<String> = None;
        let mut proof_missing = false;

        for path in &self.config.withdraw_paths {
            let Some(reply) = self.api.submit_withdrawal(account, path, &payload).await else {
                last = Some(format!("{}: no response", path));
                continue;
            };
            if attempt.status == AttemptStatus::Pending {
                attempt.status = AttemptStatus::Submitted;
            }

            if reply.status.as_u16() == 404 {
                debug!("{} not found, trying next candidate", path);
                last = Some(format!("{}: HTTP 404", path));
                continue;
            }
            if reply.is_auth_failure() {
                return Err(WithdrawalError::AuthExpired);
            }

            if reply.status.as_u16() == 400 && requires_tx_proof(&reply.body) {
                if attempt.status != AttemptStatus::Broadcast {
                    attempt.status = AttemptStatus::ProofRequired;
                }
                let Some(hash) = self.obtain_proof(attempt).await else {
                    proof_missing = true;
                    last = Some(format!("{}: proof required", path));
                    continue;
                };

                let with_proof = attempt
                    .authorization
                    .payload_with_proof(&attempt.wallet_address, &hash);
                match self.api.submit_withdrawal(account, path, &with_proof).await {
                    Some(r) if accepted(&r) => return Ok(claimed_amount(&r, attempt)),
                    Some(r) if r.is_auth_failure() => return Err(WithdrawalError::AuthExpired),
                    Some(r) => {
                        last = Some(format!(
                            "{}: HTTP {} {}",
                            path,
                            r.status.as_u16(),
                            r.snippet()
                        ))
                    }
                    None => last = Some(format!("{}: no response", path)),
                }
                continue;
            }

            if accepted(&reply) {
                return Ok(claimed_amount(&reply, attempt));
            }
            return Err(WithdrawalError::Rejected {
                status: reply.status.as_u16(),
                message: reply.message(),
            });
        }

        if proof_missing {
            return Err(WithdrawalError::NoProof);
        }
        match last {
            Some(last) if attempt.status != AttemptStatus::Pending => {
                Err(WithdrawalError::NoCandidateAccepted { last })
            }
            _ => Err(WithdrawalError::NoResponse { step: "withdraw" }),
        }
    }

    /// The attempt's own hash if it already has one, otherwise the proof
    /// chain, consulted at most once per attempt so a failed broadcast is
    /// never followed by another.
    async fn obtain_proof(&self, attempt: &mut WithdrawalAttempt) -> Option<String> {
        if let Some(hash) = &attempt.tx_hash {
            return Some(hash.clone());
        }
        if attempt.proof_consulted {
            return None;
        }
        attempt.proof_consulted = true;
        let proof = self.proof.resolve(&attempt.authorization).await?;
        info!("Transaction proof from {:?}: {}", proof.source, proof.hash);
        if proof.source == ProofSource::Broadcast {
            attempt.status = AttemptStatus::Broadcast;
        }
        attempt.tx_hash = Some(proof.hash.clone());
        Some(proof.hash)
    }
}

fn accepted(reply: &HttpReply) -> bool {
    reply.is_success() && reports_success(reply)
}

/// `claimed`, else `amount`, else what the signature said was claimable.
fn claimed_amount(reply: &HttpReply, attempt: &WithdrawalAttempt) -> String {
    reply
        .json_value()
        .and_then(|body| {
            ["claimed", "amount"]
                .iter()
                .find_map(|key| body.get(*key).and_then(display_value))
        })
        .unwrap_or_else(|| attempt.claimable_amount.to_string())
}
