//! Combined single-line countdown across accounts.
//!
//! Ticks once a second off a [`TimeAnchor`]; nothing here touches the
//! network.

use crate::session::ScheduleTarget;
use crate::time_source::TimeAnchor;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use std::io::Write;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// `HH:MM:SS`; negative values render as zero. Hours are not wrapped.
pub fn format_hms(total_secs: i64) -> String {
    let total = total_secs.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn remaining_secs(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_seconds().max(0)
}

/// The plain countdown text and the smallest remaining seconds across
/// `targets`. Device counters are shown but never end the countdown.
pub fn render_line(
    targets: &[ScheduleTarget],
    devices: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> (String, i64) {
    let mut parts = Vec::with_capacity(targets.len() + 1);
    let mut min_remaining = i64::MAX;

    for target in targets {
        let rem = remaining_secs(target.deadline, now);
        min_remaining = min_remaining.min(rem);
        parts.push(format!("[{}] Claim in {}", target.label, format_hms(rem)));
    }

    if let Some(device_min) = devices.iter().map(|d| remaining_secs(*d, now)).min() {
        parts.push(format!("Device min {}", format_hms(device_min)));
    }

    if targets.is_empty() {
        min_remaining = 0;
    }
    (parts.join(" | "), min_remaining)
}

/// Redraws the line every second until the nearest target is due. Returns
/// `false` if cancelled first.
pub async fn run_until_due(
    targets: &[ScheduleTarget],
    devices: &[DateTime<Utc>],
    anchor: &TimeAnchor,
    token: &CancellationToken,
) -> bool {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut prev_len = 0usize;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                clear_inline(prev_len);
                return false;
            }
            _ = ticker.tick() => {
                let now = anchor.at(Instant::now());
                let (line, min_remaining) = render_line(targets, devices, now);
                if min_remaining <= 0 {
                    clear_inline(prev_len);
                    return true;
                }
                prev_len = draw_inline(&line, prev_len);
            }
        }
    }
}

/// Same prefix the console log lines carry, plus its printable width.
fn prefix() -> (String, usize) {
    let stamp = format!("[ {} ]", Local::now().format("%x %X %Z"));
    let width = stamp.chars().count() + 3;
    (format!("{}{}", stamp.cyan().bold(), " | ".white().bold()), width)
}

fn draw_inline(line: &str, prev_len: usize) -> usize {
    let (prefix, prefix_width) = prefix();
    let text = format!("{}{}", prefix, line.white().bold());
    let visible = prefix_width + line.chars().count();
    let pad = prev_len.saturating_sub(visible);
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r{}{}", text, " ".repeat(pad));
    let _ = out.flush();
    visible
}

fn clear_inline(prev_len: usize) {
    if prev_len == 0 {
        return;
    }
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r{}\r", " ".repeat(prev_len));
    let _ = out.flush();
}
