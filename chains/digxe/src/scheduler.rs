//! # Claim Scheduler
//!
//! One sequential sweep over every account, then a single shared wait until
//! the nearest deadline (bounded by the poll ceiling and floor), then the next
//! sweep. The account table belongs to the scheduler and is only touched by
//! the sweep itself.

use crate::api::{ClaimOutcome, DigxeApi, PageFetch};
use crate::config::ScheduleConfig;
use crate::countdown;
use crate::deadline::{record_start, DeadlineResolver};
use crate::error::{ClaimError, ResolveError};
use crate::evidence::{BalanceFigure, DeviceCountdowns, EvidenceExtractor};
use crate::session::{AccountSession, ClaimState, ScheduleTarget};
use crate::time_source::{TimeAnchor, TimeSource};
use chrono::{DateTime, Utc};
use core_logic::CLAIM_RESULT_TARGET;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What one sweep learned.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub anchor: TimeAnchor,
    pub targets: Vec<ScheduleTarget>,
}

impl SweepReport {
    pub fn earliest(&self) -> Option<&ScheduleTarget> {
        self.targets.iter().min_by_key(|t| t.deadline)
    }
}

/// Everything a sweep reads while it mutates the account table.
struct SweepDeps<'a> {
    api: &'a DigxeApi,
    config: &'a ScheduleConfig,
    resolver: DeadlineResolver<'a>,
}

pub struct ClaimScheduler {
    api: DigxeApi,
    time: TimeSource,
    config: ScheduleConfig,
    sessions: Vec<AccountSession>,
    first_sweep: bool,
}

impl ClaimScheduler {
    pub fn new(
        api: DigxeApi,
        time: TimeSource,
        config: ScheduleConfig,
        sessions: Vec<AccountSession>,
    ) -> Self {
        let first_sweep = config.first_sweep_claim;
        Self {
            api,
            time,
            config,
            sessions,
            first_sweep,
        }
    }

    pub fn sessions(&self) -> &[AccountSession] {
        &self.sessions
    }

    pub async fn sweep(&mut self) -> SweepReport {
        let anchor = self.time.refresh().await;
        let deps = SweepDeps {
            api: &self.api,
            config: &self.config,
            resolver: DeadlineResolver::new(&self.api, self.config.mining_duration()),
        };

        let mut targets = Vec::new();
        for session in self.sessions.iter_mut() {
            if session.is_skipped() {
                continue;
            }
            if self.first_sweep {
                first_sweep_claim(&deps, session, &anchor).await;
            }
            if let Some(target) = process_account(&deps, session, &anchor).await {
                targets.push(target);
            }
        }

        self.first_sweep = false;
        SweepReport { anchor, targets }
    }

    /// Runs sweeps until `token` is cancelled.
    pub async fn run(&mut self, token: CancellationToken) {
        info!(
            "Start... Digxe auto start/claim ({} account(s))",
            self.sessions.len()
        );

        loop {
            let report = tokio::select! {
                _ = token.cancelled() => break,
                report = self.sweep() => report,
            };

            if self.sessions.iter().all(AccountSession::is_skipped) {
                warn!("Every account was rejected. Update the cookie file and restart.");
                break;
            }

            let live = self.config.live_countdown_for(self.sessions.len());
            let completed = if live && !report.targets.is_empty() {
                let devices: Vec<DateTime<Utc>> = self
                    .sessions
                    .iter()
                    .flat_map(|s| s.device_deadlines.iter().copied())
                    .collect();
                countdown::run_until_due(&report.targets, &devices, &report.anchor, &token).await
            } else {
                let now = report.anchor.now();
                let wait = sleep_interval(
                    &report.targets,
                    now,
                    self.config.poll_ceiling(),
                    self.config.poll_floor(),
                );
                if let Some(next) = report.earliest() {
                    info!(
                        "Next: [{}] in {}. Sleeping {}s.",
                        next.label,
                        countdown::format_hms((next.deadline - now).num_seconds()),
                        wait.as_secs()
                    );
                }
                tokio::select! {
                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(wait) => true,
                }
            };

            if !completed {
                break;
            }
        }

        if token.is_cancelled() {
            info!("Stopped by user.");
        }
    }
}

/// `min(nearest deadline - now, ceiling)`, never below `floor`. With no
/// deadline at all the ceiling is used.
pub fn sleep_interval(
    targets: &[ScheduleTarget],
    now: DateTime<Utc>,
    ceiling: Duration,
    floor: Duration,
) -> Duration {
    let Some(earliest) = targets.iter().map(|t| t.deadline).min() else {
        return ceiling;
    };
    let ahead = (earliest - now).to_std().unwrap_or(Duration::ZERO);
    ahead.min(ceiling).max(floor)
}

async fn first_sweep_claim(
    deps: &SweepDeps<'_>,
    session: &mut AccountSession,
    anchor: &TimeAnchor,
) {
    let claimed = matches!(
        deps.api.claim(&session.credential).await,
        ClaimOutcome::Claimed { .. }
    );
    if claimed {
        info!(
            target: CLAIM_RESULT_TARGET,
            "[{}] Claim SUCCESS (reward pending from before start-up)",
            session.label()
        );
        session.last_claim = Some(anchor.now());
    }
    let outcome = deps.api.start_mining(&session.credential).await;
    record_start(session, &outcome, anchor, deps.config.mining_duration());
    let pause = if claimed {
        deps.config.account_pause()
    } else {
        deps.config.account_pause() / 2
    };
    tokio::time::sleep(pause).await;
}

async fn process_account(
    deps: &SweepDeps<'_>,
    session: &mut AccountSession,
    anchor: &TimeAnchor,
) -> Option<ScheduleTarget> {
    let now = anchor.now();
    if session.in_cooldown(now) {
        return session.schedule_target();
    }

    match deps.resolver.resolve(session, anchor).await {
        Ok(_) => {}
        Err(ResolveError::AuthExpired) => {
            warn!(
                "[{}] Unauthorized/Forbidden. Cookie probably expired. Skipping account.",
                session.label()
            );
            session.transition(ClaimState::Skipped);
            return None;
        }
        Err(ResolveError::Unresolved) => {
            warn!("[{}] No time anchor yet. Skipping for now.", session.label());
            return None;
        }
    }

    if session.observe(anchor.now()) {
        info!("[{}] Claim time reached, claiming...", session.label());
        claim_and_restart(deps, session, anchor).await;
        tokio::time::sleep(deps.config.account_pause()).await;
    }

    session.schedule_target()
}

/// `Due -> Claiming -> Claimed -> (start) -> Mining`, or on failure
/// `ClaimFailed -> Mining` with a cooldown.
async fn claim_and_restart(
    deps: &SweepDeps<'_>,
    session: &mut AccountSession,
    anchor: &TimeAnchor,
) {
    session.transition(ClaimState::Claiming);

    match claim(deps.api, session).await {
        Ok(amount) => {
            session.transition(ClaimState::Claimed);
            session.last_claim = Some(anchor.now());
            session.cooldown_until = None;
            info!(
                target: CLAIM_RESULT_TARGET,
                "[{}] Claim SUCCESS. claimed={}",
                session.label(),
                amount.as_deref().unwrap_or("?")
            );
            report_balance(deps.api, session, anchor).await;

            session.transition(ClaimState::AwaitingStart);
            info!("[{}] Starting a new mining cycle...", session.label());
            let outcome = deps.api.start_mining(&session.credential).await;
            if record_start(session, &outcome, anchor, deps.config.mining_duration()).is_none() {
                // Resolved again next sweep.
                session.next_claim_at = None;
            }
        }
        Err(ClaimError::AuthExpired) => {
            warn!(
                target: CLAIM_RESULT_TARGET,
                "[{}] Claim FAILED: cookie rejected. Skipping account.",
                session.label()
            );
            session.transition(ClaimState::Skipped);
        }
        Err(e) => {
            warn!(
                target: CLAIM_RESULT_TARGET,
                "[{}] Claim FAILED: {}",
                session.label(),
                e
            );
            session.transition(ClaimState::ClaimFailed);
            session.cooldown_until = Some(anchor.now() + deps.config.claim_cooldown());
            session.transition(ClaimState::Mining);
        }
    }
}

async fn claim(api: &DigxeApi, session: &AccountSession) -> Result<Option<String>, ClaimError> {
    match api.claim(&session.credential).await {
        ClaimOutcome::Claimed { amount } => Ok(amount),
        ClaimOutcome::AuthExpired => Err(ClaimError::AuthExpired),
        ClaimOutcome::NoResponse => Err(ClaimError::NoResponse),
        ClaimOutcome::Rejected { status, message } => {
            Err(ClaimError::Rejected { status, message })
        }
        ClaimOutcome::NotSuccessful => Err(ClaimError::NotSuccessful),
    }
}

/// Best effort: balance and device counters from the mining page.
async fn report_balance(api: &DigxeApi, session: &mut AccountSession, anchor: &TimeAnchor) {
    let PageFetch::Body(text) = api.fetch_mining_page(&session.credential).await else {
        return;
    };
    if let Ok(balance) = BalanceFigure.extract(&text) {
        info!(
            target: CLAIM_RESULT_TARGET,
            "[{}] Total balance now: {}",
            session.label(),
            balance
        );
    }
    if let Ok(seconds) = DeviceCountdowns.extract(&text) {
        session.record_devices(anchor.now(), &seconds);
        if let Some(min) = seconds.first() {
            info!(
                "[{}] {} device(s), nearest in {}",
                session.label(),
                seconds.len(),
                countdown::format_hms(*min as i64)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn target(label: &str, deadline: DateTime<Utc>) -> ScheduleTarget {
        ScheduleTarget {
            label: label.to_string(),
            deadline,
        }
    }

    const CEILING: Duration = Duration::from_secs(900);
    const FLOOR: Duration = Duration::from_secs(5);

    #[test]
    fn test_sleep_until_nearest_deadline() {
        let now = Utc::now();
        let targets = vec![
            target("Account 1", now + ChronoDuration::seconds(100)),
            target("Account 2", now + ChronoDuration::seconds(40)),
        ];
        assert_eq!(
            sleep_interval(&targets, now, CEILING, FLOOR),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn test_sleep_is_capped_by_ceiling() {
        let now = Utc::now();
        let targets = vec![target("Account 1", now + ChronoDuration::hours(20))];
        assert_eq!(sleep_interval(&targets, now, CEILING, FLOOR), CEILING);
    }

    #[test]
    fn test_sleep_never_below_floor() {
        let now = Utc::now();
        let targets = vec![
            target("Account 1", now + ChronoDuration::seconds(1)),
            target("Account 2", now - ChronoDuration::seconds(30)),
        ];
        assert_eq!(sleep_interval(&targets, now, CEILING, FLOOR), FLOOR);
    }

    #[test]
    fn test_sleep_without_targets_uses_ceiling() {
        assert_eq!(sleep_interval(&[], Utc::now(), CEILING, FLOOR), CEILING);
    }
}
