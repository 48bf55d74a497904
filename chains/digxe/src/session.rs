use crate::credentials::AccountCredential;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

/// Per-account claim cycle.
///
/// `AwaitingStart -> Mining -> Due -> Claiming -> Claimed -> AwaitingStart`,
/// or `Claiming -> ClaimFailed -> Mining` with a cooldown. `Skipped` is
/// terminal: the credential was rejected and only an operator can fix it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    AwaitingStart,
    Mining,
    Due,
    Claiming,
    Claimed,
    ClaimFailed,
    Skipped,
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimState::AwaitingStart => "AwaitingStart",
            ClaimState::Mining => "Mining",
            ClaimState::Due => "Due",
            ClaimState::Claiming => "Claiming",
            ClaimState::Claimed => "Claimed",
            ClaimState::ClaimFailed => "ClaimFailed",
            ClaimState::Skipped => "Skipped",
        };
        f.write_str(name)
    }
}

/// Where the current deadline came from, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    ServerTimestamp,
    LocalEstimate,
    ServerErrorText,
    Unknown,
}

/// Label and deadline of one account, rebuilt every sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleTarget {
    pub label: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccountSession {
    pub id: usize,
    pub credential: AccountCredential,
    pub state: ClaimState,
    pub last_start: Option<DateTime<Utc>>,
    pub last_claim: Option<DateTime<Utc>>,
    pub next_claim_at: Option<DateTime<Utc>>,
    pub evidence_source: EvidenceSource,
    /// Set after a failed claim; the account is left alone until then.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Absolute end of each device counter seen on the mining page.
    pub device_deadlines: Vec<DateTime<Utc>>,
}

impl AccountSession {
    pub fn new(id: usize, credential: AccountCredential) -> Self {
        Self {
            id,
            credential,
            state: ClaimState::AwaitingStart,
            last_start: None,
            last_claim: None,
            next_claim_at: None,
            evidence_source: EvidenceSource::Unknown,
            cooldown_until: None,
            device_deadlines: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        self.credential.label()
    }

    pub fn transition(&mut self, to: ClaimState) {
        if self.state != to {
            debug!("[{}] {} -> {}", self.label(), self.state, to);
            self.state = to;
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.state == ClaimState::Skipped
    }

    pub fn set_deadline(&mut self, deadline: DateTime<Utc>, source: EvidenceSource) {
        self.next_claim_at = Some(deadline);
        self.evidence_source = source;
    }

    /// The instant the account should next be acted on: its claim deadline,
    /// pushed back by an active cooldown.
    pub fn effective_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.next_claim_at, self.cooldown_until) {
            (Some(d), Some(c)) => Some(d.max(c)),
            (Some(d), None) => Some(d),
            (None, c) => c,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|c| now < c)
    }

    /// `Mining -> Due` once the deadline has passed. Returns whether the
    /// transition happened.
    pub fn observe(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != ClaimState::Mining || self.in_cooldown(now) {
            return false;
        }
        match self.next_claim_at {
            Some(deadline) if now >= deadline => {
                self.cooldown_until = None;
                self.transition(ClaimState::Due);
                true
            }
            _ => false,
        }
    }

    pub fn schedule_target(&self) -> Option<ScheduleTarget> {
        if self.is_skipped() {
            return None;
        }
        self.effective_deadline().map(|deadline| ScheduleTarget {
            label: self.label().to_string(),
            deadline,
        })
    }

    pub fn record_devices(&mut self, now: DateTime<Utc>, seconds: &[u64]) {
        self.device_deadlines = seconds
            .iter()
            .map(|s| now + chrono::Duration::seconds(*s as i64))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> AccountSession {
        AccountSession::new(1, AccountCredential::new("Account 1", "c=1"))
    }

    #[test]
    fn test_new_session_awaits_start() {
        let s = session();
        assert_eq!(s.state, ClaimState::AwaitingStart);
        assert_eq!(s.evidence_source, EvidenceSource::Unknown);
        assert!(s.schedule_target().is_none());
    }

    #[test]
    fn test_observe_marks_due_only_after_deadline() {
        let now = Utc::now();
        let mut s = session();
        s.set_deadline(now + Duration::seconds(5), EvidenceSource::ServerTimestamp);
        s.transition(ClaimState::Mining);

        assert!(!s.observe(now));
        assert_eq!(s.state, ClaimState::Mining);
        assert!(s.observe(now + Duration::seconds(5)));
        assert_eq!(s.state, ClaimState::Due);
    }

    #[test]
    fn test_cooldown_delays_due() {
        let now = Utc::now();
        let mut s = session();
        s.set_deadline(now - Duration::seconds(1), EvidenceSource::ServerTimestamp);
        s.cooldown_until = Some(now + Duration::seconds(60));
        s.transition(ClaimState::Mining);

        assert!(!s.observe(now));
        assert_eq!(
            s.schedule_target().map(|t| t.deadline),
            Some(now + Duration::seconds(60))
        );
        assert!(s.observe(now + Duration::seconds(60)));
        assert!(s.cooldown_until.is_none());
    }

    #[test]
    fn test_skipped_has_no_target() {
        let mut s = session();
        s.set_deadline(Utc::now(), EvidenceSource::LocalEstimate);
        s.transition(ClaimState::Skipped);
        assert!(s.schedule_target().is_none());
    }
}
