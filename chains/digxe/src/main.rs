use digxe_project::api::DigxeApi;
use digxe_project::config::DigxeConfig;
use digxe_project::credentials::{load_accounts, AccountCredential};
use digxe_project::scheduler::ClaimScheduler;
use digxe_project::session::AccountSession;
use digxe_project::time_source::TimeSource;
use digxe_project::wallet::resolve_wallet_address;
use digxe_project::withdrawal::broadcaster::build_broadcaster;
use digxe_project::withdrawal::proof::{ProofResolver, TxHashCache};
use digxe_project::withdrawal::{WithdrawalCoordinator, WithdrawalOutcome};

use anyhow::Result;
use clap::{Parser, Subcommand};
use core_logic::{setup_logger, HttpRetryClient, WalletManager, WorkerRunner};
use dotenv::dotenv;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/digxe/config.toml")]
    config: String,
    /// Redraw a combined countdown every second between sweeps
    #[arg(short, long, visible_alias = "live-all")]
    live: bool,
    /// Never prompt; missing wallet data or proof ends the withdrawal
    #[arg(long, visible_aliases = ["auto", "wallet-auto"])]
    no_ask: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep every account mining and claim each reward when it is due (default)
    Run,
    /// Withdraw the claimable balance of one account to its wallet
    Withdraw {
        /// 1-based line in the cookie file
        #[arg(short, long, default_value_t = 1)]
        account: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = setup_logger();
    dotenv().ok();

    let args = Args::parse();
    info!("Loading config from: {}", args.config);

    let mut config = match DigxeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Ok(());
        }
    };
    if args.live {
        config.schedule.live_countdown = Some(true);
    }
    if args.no_ask {
        config.wallet.non_interactive = true;
    }

    let accounts = match load_accounts(Path::new(&config.cookie_file)) {
        Ok(a) => a,
        Err(e) => {
            error!("{}", e);
            error!("Put one cookie per line in {}.", config.cookie_file);
            return Ok(());
        }
    };

    let http = HttpRetryClient::new(&config.http)?;
    let api = DigxeApi::new(http.clone(), &config.origin);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_claims(config, api, &http, accounts).await,
        Command::Withdraw { account } => {
            let Some(credential) = account.checked_sub(1).and_then(|i| accounts.get(i)) else {
                error!(
                    "No account {} ({} account(s) loaded)",
                    account,
                    accounts.len()
                );
                return Ok(());
            };
            run_withdrawal(&config, &api, &http, credential).await
        }
    }
}

async fn run_claims(
    config: DigxeConfig,
    api: DigxeApi,
    http: &HttpRetryClient,
    accounts: Vec<AccountCredential>,
) -> Result<()> {
    let sessions = accounts
        .into_iter()
        .enumerate()
        .map(|(i, credential)| AccountSession::new(i + 1, credential))
        .collect();
    let time = TimeSource::new(http, api.origin());

    let mut scheduler = ClaimScheduler::new(api, time, config.schedule, sessions);
    scheduler.run(WorkerRunner::shutdown_token()).await;
    Ok(())
}

async fn run_withdrawal(
    config: &DigxeConfig,
    api: &DigxeApi,
    http: &HttpRetryClient,
    account: &AccountCredential,
) -> Result<()> {
    let wallet_cfg = &config.wallet;
    let interactive = !wallet_cfg.non_interactive;
    let key_path = Path::new(&wallet_cfg.key_file);

    let keys = match WalletManager::load(key_path) {
        Ok(k) => k,
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    let Some(wallet_address) = resolve_wallet_address(keys.as_ref(), key_path, interactive).await
    else {
        error!(
            "No wallet address. Put WALLET_ADDRESS=0x... or a private key in {}.",
            key_path.display()
        );
        return Ok(());
    };

    let broadcaster = build_broadcaster(
        &config.chain,
        config.gas,
        keys.as_ref().and_then(|k| k.private_key()),
        http.retry_config(),
    );
    let proof = ProofResolver::new(
        wallet_cfg.tx_hash_override.clone(),
        TxHashCache::new(&wallet_cfg.tx_hash_file),
        broadcaster,
        interactive,
    );

    info!("[{}] Withdrawing to {}", account.label(), wallet_address);
    let mut coordinator = WithdrawalCoordinator::new(api, wallet_cfg, proof);
    let token = WorkerRunner::shutdown_token();

    match WorkerRunner::run_until_cancelled(token, coordinator.run(account, &wallet_address)).await
    {
        Some(Ok(report)) => {
            let confirmed = report.confirmed();
            match report.outcome {
                WithdrawalOutcome::Stopped(e) => {
                    error!("Withdrawal stopped after {} confirmed: {}", confirmed, e)
                }
                outcome => info!("Withdrawal finished ({:?}). {} confirmed.", outcome, confirmed),
            }
        }
        Some(Err(e)) => error!("Withdrawal failed: {}", e),
        None => {}
    }
    Ok(())
}
