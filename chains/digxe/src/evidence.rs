//! # Evidence Extractors
//!
//! The game serves its pages as React Server Component payloads and phrases
//! rejections as free text. Neither is a documented API, so every value we
//! read out of them goes through one narrow extractor per source. If the
//! service changes its wording or payload shape, the extractor reports
//! `NotFound` and the caller falls through to its next source.

use crate::error::EvidenceError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static LAST_CLAIM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""lastClaimTime"\s*:\s*(\d{10,13})"#).expect("static regex"));
static BALANCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""dxeBalance"\s*:\s*([0-9]+(?:\.[0-9]+)?)"#).expect("static regex")
});
static DEVICE_SECONDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:seconds_remaining|secondsRemaining)"\s*:\s*(\d+)"#).expect("static regex")
});
static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:hour|hr)").expect("static regex"));
static MINUTES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*min").expect("static regex"));
static SECONDS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*sec").expect("static regex"));

/// Epoch values below this are seconds, not milliseconds.
const SECONDS_EPOCH_LIMIT: i64 = 10_000_000_000;

pub trait EvidenceExtractor {
    type Output;

    fn name(&self) -> &'static str;

    fn extract(&self, text: &str) -> Result<Self::Output, EvidenceError>;
}

/// `"lastClaimTime": <epoch>` on the dashboard payload, normalized to ms.
pub struct LastClaimTimestamp;

impl EvidenceExtractor for LastClaimTimestamp {
    type Output = i64;

    fn name(&self) -> &'static str {
        "lastClaimTime"
    }

    fn extract(&self, text: &str) -> Result<i64, EvidenceError> {
        let raw = first_capture(&LAST_CLAIM_RE, text, self.name())?;
        let value: i64 = raw.parse().map_err(|_| EvidenceError::Malformed {
            source_name: self.name(),
            raw: raw.to_string(),
        })?;
        if value < SECONDS_EPOCH_LIMIT {
            Ok(value * 1000)
        } else {
            Ok(value)
        }
    }
}

/// Remaining time from a rejection such as
/// `"Mining already active. Come back in 5 hours 12 minutes"`.
pub struct RemainingDuration;

impl EvidenceExtractor for RemainingDuration {
    type Output = Duration;

    fn name(&self) -> &'static str {
        "remaining duration"
    }

    fn extract(&self, text: &str) -> Result<Duration, EvidenceError> {
        let lower = text.to_lowercase();
        let malformed = || EvidenceError::Malformed {
            source_name: self.name(),
            raw: text.to_string(),
        };
        let count = |re: &Regex| -> Result<u64, EvidenceError> {
            match re.captures(&lower).and_then(|c| c.get(1)) {
                Some(m) => m.as_str().parse().map_err(|_| malformed()),
                None => Ok(0),
            }
        };

        let hours = count(&HOURS_RE)?;
        let minutes = count(&MINUTES_RE)?;
        let seconds = count(&SECONDS_RE)?;
        if hours == 0 && minutes == 0 && seconds == 0 {
            return Err(EvidenceError::NotFound {
                source_name: self.name(),
            });
        }
        hours
            .checked_mul(3600)
            .and_then(|s| minutes.checked_mul(60).and_then(|m| s.checked_add(m)))
            .and_then(|s| s.checked_add(seconds))
            .map(Duration::from_secs)
            .ok_or_else(malformed)
    }
}

/// `"dxeBalance": <number>` on the mining payload.
pub struct BalanceFigure;

impl EvidenceExtractor for BalanceFigure {
    type Output = f64;

    fn name(&self) -> &'static str {
        "dxeBalance"
    }

    fn extract(&self, text: &str) -> Result<f64, EvidenceError> {
        let raw = first_capture(&BALANCE_RE, text, self.name())?;
        raw.parse().map_err(|_| EvidenceError::Malformed {
            source_name: self.name(),
            raw: raw.to_string(),
        })
    }
}

/// Every per-device seconds counter on the mining payload, deduplicated and
/// sorted ascending.
pub struct DeviceCountdowns;

impl EvidenceExtractor for DeviceCountdowns {
    type Output = Vec<u64>;

    fn name(&self) -> &'static str {
        "device seconds"
    }

    fn extract(&self, text: &str) -> Result<Vec<u64>, EvidenceError> {
        let mut secs: Vec<u64> = DEVICE_SECONDS_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        secs.sort_unstable();
        secs.dedup();
        if secs.is_empty() {
            return Err(EvidenceError::NotFound {
                source_name: self.name(),
            });
        }
        Ok(secs)
    }
}

fn first_capture<'t>(
    re: &Regex,
    text: &'t str,
    source_name: &'static str,
) -> Result<&'t str, EvidenceError> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or(EvidenceError::NotFound { source_name })
}

/// A start rejection meaning a cycle is already running.
pub fn is_already_active(message: &str) -> bool {
    message.to_lowercase().contains("already active")
}

/// A withdrawal rejection asking for an on-chain transaction hash.
pub fn requires_tx_proof(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("transaction hash") || lower.contains("tx hash")
}
