use async_trait::async_trait;
use core_logic::{HttpConfig, HttpRetryClient};
use digxe_project::api::DigxeApi;
use digxe_project::config::WalletConfig;
use digxe_project::credentials::AccountCredential;
use digxe_project::error::{BroadcastError, WithdrawalError};
use digxe_project::withdrawal::broadcaster::Broadcaster;
use digxe_project::withdrawal::proof::{ProofResolver, TxHashCache};
use digxe_project::withdrawal::{
    AttemptStatus, WithdrawalAuthorization, WithdrawalCoordinator, WithdrawalOutcome,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const WALLET: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

struct CountingBroadcaster {
    calls: AtomicUsize,
    result: Result<String, BroadcastError>,
}

impl CountingBroadcaster {
    fn new(result: Result<String, BroadcastError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broadcaster for CountingBroadcaster {
    fn describe(&self) -> String {
        "counting".to_string()
    }

    async fn broadcast(&self, _: &WithdrawalAuthorization) -> Result<String, BroadcastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

fn api(server: &MockServer) -> DigxeApi {
    let http = HttpRetryClient::new(&HttpConfig {
        timeout_secs: 5,
        max_attempts: 2,
        backoff_base_ms: 5,
    })
    .expect("client should build");
    DigxeApi::new(http, &server.base_url())
}

fn wallet_config() -> WalletConfig {
    WalletConfig {
        attempt_pause_secs: 0,
        non_interactive: true,
        ..WalletConfig::default()
    }
}

fn signature_body(remaining: i64, claimable: f64) -> Value {
    json!({
        "success": true,
        "amount": "100000000000000000000",
        "nonce": 7,
        "deadline": 1_900_000_000u64,
        "signature": format!("0x{}", "ab".repeat(65)),
        "withdrawalInfo": {"remainingWithdrawals": remaining},
        "totalBalance": 250.0,
        "claimableAmount": claimable,
    })
}

fn resolver(dir: &TempDir, broadcaster: Arc<CountingBroadcaster>) -> ProofResolver {
    ProofResolver::new(
        None,
        TxHashCache::new(dir.path().join("txhash.txt")),
        broadcaster,
        false,
    )
}

async fn mock_signature(
    server: &MockServer,
    remaining: i64,
    claimable: f64,
) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/wallet/get-signature")
                .json_body(json!({"walletAddress": WALLET}));
            then.status(200)
                .json_body(signature_body(remaining, claimable));
        })
        .await
}

#[tokio::test]
async fn test_attempts_bounded_by_two() {
    let server = MockServer::start_async().await;
    let signature = mock_signature(&server, 5, 100.0).await;
    let withdraw = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/wallet/withdraw")
                .body_contains("\"signature\"");
            then.status(200)
                .json_body(json!({"success": true, "claimed": "50"}));
        })
        .await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let broadcaster = CountingBroadcaster::new(Ok("0xunused".into()));
    let mut coordinator =
        WithdrawalCoordinator::new(&api, &config, resolver(&dir, broadcaster.clone()));

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(report.outcome, WithdrawalOutcome::Completed);
    assert_eq!(report.remaining_withdrawals, 5);
    assert_eq!(report.confirmed(), 2);
    assert_eq!(report.attempts[0].claimed.as_deref(), Some("50"));
    // one summary read plus a fresh signature per attempt
    assert_eq!(signature.hits_async().await, 3);
    assert_eq!(withdraw.hits_async().await, 2);
    assert_eq!(broadcaster.calls(), 0);
}

#[tokio::test]
async fn test_configured_attempts_cannot_exceed_two() {
    let server = MockServer::start_async().await;
    let signature = mock_signature(&server, 5, 100.0).await;
    let withdraw = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/withdraw");
            then.status(200)
                .json_body(json!({"success": true, "claimed": "10"}));
        })
        .await;

    let api = api(&server);
    let config = WalletConfig {
        max_attempts: 5,
        ..wallet_config()
    };
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = WithdrawalCoordinator::new(
        &api,
        &config,
        resolver(&dir, CountingBroadcaster::new(Ok("0xunused".into()))),
    );

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(report.confirmed(), 2);
    assert_eq!(signature.hits_async().await, 3);
    assert_eq!(withdraw.hits_async().await, 2);
}

#[tokio::test]
async fn test_not_found_falls_back_to_next_path() {
    let server = MockServer::start_async().await;
    mock_signature(&server, 1, 12.5).await;
    let primary = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/withdraw");
            then.status(404);
        })
        .await;
    let fallback = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/claim");
            then.status(200).json_body(json!({"status": "ok"}));
        })
        .await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = WithdrawalCoordinator::new(
        &api,
        &config,
        resolver(&dir, CountingBroadcaster::new(Ok("0xunused".into()))),
    );

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(report.outcome, WithdrawalOutcome::Completed);
    assert_eq!(report.attempts.len(), 1);
    // no amount in the reply: falls back to the signed claimable figure
    assert_eq!(report.attempts[0].claimed.as_deref(), Some("12.5"));
    assert_eq!(primary.hits_async().await, 1);
    assert_eq!(fallback.hits_async().await, 1);
}

#[tokio::test]
async fn test_proof_demand_broadcasts_once_across_paths() {
    let server = MockServer::start_async().await;
    mock_signature(&server, 1, 100.0).await;
    let primary_with_proof = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/wallet/withdraw")
                .body_contains("transactionHash");
            then.status(400)
                .json_body(json!({"error": "tx hash not recognised"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/withdraw");
            then.status(400)
                .json_body(json!({"error": "Transaction hash required"}));
        })
        .await;
    let fallback_with_proof = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/wallet/claim")
                .body_contains("0xfeed");
            then.status(200)
                .json_body(json!({"success": true, "amount": 100}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/claim");
            then.status(400)
                .json_body(json!({"error": "Transaction hash required"}));
        })
        .await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let broadcaster = CountingBroadcaster::new(Ok("0xfeed".into()));
    let mut coordinator =
        WithdrawalCoordinator::new(&api, &config, resolver(&dir, broadcaster.clone()));

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(report.outcome, WithdrawalOutcome::Completed);
    assert_eq!(broadcaster.calls(), 1);
    assert_eq!(primary_with_proof.hits_async().await, 1);
    assert_eq!(fallback_with_proof.hits_async().await, 1);

    let attempt = &report.attempts[0];
    assert_eq!(attempt.tx_hash.as_deref(), Some("0xfeed"));
    assert_eq!(attempt.status, AttemptStatus::Confirmed);
    assert_eq!(attempt.claimed.as_deref(), Some("100"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("txhash.txt")).unwrap(),
        "0xfeed\n"
    );
}

#[tokio::test]
async fn test_failed_broadcast_is_not_repeated() {
    let server = MockServer::start_async().await;
    mock_signature(&server, 1, 100.0).await;
    for path in ["/api/wallet/withdraw", "/api/wallet/claim"] {
        server
            .mock_async(|when, then| {
                when.method(POST).path(path);
                then.status(400)
                    .json_body(json!({"error": "Please provide the transaction hash"}));
            })
            .await;
    }

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let broadcaster =
        CountingBroadcaster::new(Err(BroadcastError::Rpc("insufficient funds".into())));
    let mut coordinator =
        WithdrawalCoordinator::new(&api, &config, resolver(&dir, broadcaster.clone()));

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(
        report.outcome,
        WithdrawalOutcome::Stopped(WithdrawalError::NoProof)
    );
    assert_eq!(report.attempts[0].status, AttemptStatus::Failed);
    assert_eq!(broadcaster.calls(), 1);
}

#[tokio::test]
async fn test_business_rejection_stops_invocation() {
    let server = MockServer::start_async().await;
    mock_signature(&server, 2, 100.0).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/withdraw");
            then.status(400)
                .json_body(json!({"error": "Minimum withdrawal is 500"}));
        })
        .await;
    let fallback = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/claim");
            then.status(200).json_body(json!({"success": true}));
        })
        .await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = WithdrawalCoordinator::new(
        &api,
        &config,
        resolver(&dir, CountingBroadcaster::new(Ok("0xunused".into()))),
    );

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(
        report.outcome,
        WithdrawalOutcome::Stopped(WithdrawalError::Rejected {
            status: 400,
            message: "Minimum withdrawal is 500".to_string(),
        })
    );
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(fallback.hits_async().await, 0);
}

#[tokio::test]
async fn test_exhausted_quota_submits_nothing() {
    let server = MockServer::start_async().await;
    let signature = mock_signature(&server, 0, 100.0).await;
    let withdraw = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/withdraw");
            then.status(200).json_body(json!({"success": true}));
        })
        .await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = WithdrawalCoordinator::new(
        &api,
        &config,
        resolver(&dir, CountingBroadcaster::new(Ok("0xunused".into()))),
    );

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(report.outcome, WithdrawalOutcome::QuotaExhausted);
    assert!(report.attempts.is_empty());
    assert_eq!(signature.hits_async().await, 1);
    assert_eq!(withdraw.hits_async().await, 0);
}

#[tokio::test]
async fn test_nothing_claimable_submits_nothing() {
    let server = MockServer::start_async().await;
    mock_signature(&server, 2, 0.0).await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = WithdrawalCoordinator::new(
        &api,
        &config,
        resolver(&dir, CountingBroadcaster::new(Ok("0xunused".into()))),
    );

    let account = AccountCredential::new("Account 1", "session=one");
    let report = coordinator.run(&account, WALLET).await.unwrap();

    assert_eq!(report.outcome, WithdrawalOutcome::NothingClaimable);
    assert!(report.attempts.is_empty());
}

#[tokio::test]
async fn test_rejected_cookie_on_signature_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/wallet/get-signature");
            then.status(403);
        })
        .await;

    let api = api(&server);
    let config = wallet_config();
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = WithdrawalCoordinator::new(
        &api,
        &config,
        resolver(&dir, CountingBroadcaster::new(Ok("0xunused".into()))),
    );

    let account = AccountCredential::new("Account 1", "session=one");
    let result = coordinator.run(&account, WALLET).await;

    assert!(matches!(result, Err(WithdrawalError::AuthExpired)));
}
