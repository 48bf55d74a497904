//! # Deadline Resolution
//!
//! One account, one cycle, strongest evidence first:
//!
//! 1. `lastClaimTime` scraped from the dashboard, plus the mining duration.
//! 2. The start instant this process recorded earlier, plus the duration.
//! 3. A start action. A fresh start anchors a new cycle; an "already active"
//!    rejection is mined for the remaining time, falling back to the full
//!    duration when the text carries no quantity.
//!
//! Failures at one step fall through to the next. A rejected credential stops
//! resolution for the account.

use crate::api::{DigxeApi, PageFetch, StartOutcome};
use crate::error::ResolveError;
use crate::evidence::{EvidenceExtractor, LastClaimTimestamp, RemainingDuration};
use crate::session::{AccountSession, ClaimState, EvidenceSource};
use crate::time_source::{from_epoch_ms, TimeAnchor};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

pub struct DeadlineResolver<'a> {
    api: &'a DigxeApi,
    mining_duration: Duration,
}

impl<'a> DeadlineResolver<'a> {
    pub fn new(api: &'a DigxeApi, mining_duration: Duration) -> Self {
        Self {
            api,
            mining_duration,
        }
    }

    pub async fn resolve(
        &self,
        session: &mut AccountSession,
        anchor: &TimeAnchor,
    ) -> Result<DateTime<Utc>, ResolveError> {
        match self.api.fetch_dashboard(&session.credential).await {
            PageFetch::Body(text) => match LastClaimTimestamp.extract(&text) {
                Ok(last_claim_ms) => {
                    let deadline = from_epoch_ms(last_claim_ms) + self.mining_duration;
                    session.set_deadline(deadline, EvidenceSource::ServerTimestamp);
                    mark_mining(session);
                    return Ok(deadline);
                }
                Err(e) => debug!("[{}] Dashboard evidence: {}", session.label(), e),
            },
            PageFetch::AuthExpired => return Err(ResolveError::AuthExpired),
            PageFetch::Unavailable => {
                debug!("[{}] Dashboard unavailable", session.label())
            }
        }

        if let Some(last_start) = session.last_start {
            let deadline = last_start + self.mining_duration;
            session.set_deadline(deadline, EvidenceSource::LocalEstimate);
            mark_mining(session);
            return Ok(deadline);
        }

        info!("[{}] Syncing: trying to start mining...", session.label());
        let outcome = self.api.start_mining(&session.credential).await;
        match record_start(session, &outcome, anchor, self.mining_duration) {
            Some(deadline) => Ok(deadline),
            None if outcome == StartOutcome::AuthExpired => Err(ResolveError::AuthExpired),
            None => Err(ResolveError::Unresolved),
        }
    }
}

fn mark_mining(session: &mut AccountSession) {
    if session.state == ClaimState::AwaitingStart {
        session.transition(ClaimState::Mining);
    }
}

/// Folds a start response into the session. Returns the new deadline, or
/// `None` when the response established nothing.
pub fn record_start(
    session: &mut AccountSession,
    outcome: &StartOutcome,
    anchor: &TimeAnchor,
    mining_duration: Duration,
) -> Option<DateTime<Utc>> {
    match outcome {
        StartOutcome::Started { server_time_ms } => {
            let started_at = server_time_ms
                .map(from_epoch_ms)
                .unwrap_or_else(|| anchor.now());
            let deadline = started_at + mining_duration;
            session.last_start = Some(started_at);
            session.set_deadline(deadline, EvidenceSource::LocalEstimate);
            session.transition(ClaimState::Mining);
            info!("[{}] Mining started SUCCESS", session.label());
            Some(deadline)
        }
        StartOutcome::AlreadyActive { message } => {
            let remaining = match RemainingDuration.extract(message) {
                Ok(d) => Duration::from_std(d).unwrap_or(mining_duration),
                Err(_) => {
                    debug!(
                        "[{}] No duration in '{}'. Assuming a full cycle.",
                        session.label(),
                        message
                    );
                    mining_duration
                }
            };
            let (deadline, remaining) = match anchor.now().checked_add_signed(remaining) {
                Some(d) => (d, remaining),
                None => (anchor.now() + mining_duration, mining_duration),
            };
            session.last_start = Some(deadline - mining_duration);
            session.set_deadline(deadline, EvidenceSource::ServerErrorText);
            session.transition(ClaimState::Mining);
            info!(
                "[{}] Already mining. Claim in {}",
                session.label(),
                crate::countdown::format_hms(remaining.num_seconds())
            );
            Some(deadline)
        }
        StartOutcome::AuthExpired => {
            warn!(
                "[{}] Unauthorized/Forbidden. Cookie probably expired, update the cookie file.",
                session.label()
            );
            None
        }
        StartOutcome::Rejected { status, .. } => {
            warn!("[{}] Start mining FAILED: HTTP {}", session.label(), status);
            None
        }
        StartOutcome::NotSuccessful => {
            warn!("[{}] Start mining was not successful", session.label());
            None
        }
        StartOutcome::NoResponse => {
            warn!("[{}] Start FAILED: no response after retries", session.label());
            None
        }
    }
}
