//! # Time Source
//!
//! The game computes every deadline on its own clock. Instead of asking for
//! the time on every countdown tick, one `HEAD` request captures a
//! [`TimeAnchor`] (server epoch + local monotonic instant) and everything in
//! between is extrapolated locally.

use chrono::{DateTime, TimeZone, Utc};
use core_logic::HttpRetryClient;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct TimeAnchor {
    server_epoch_ms: i64,
    captured_at: Instant,
    degraded: bool,
}

impl TimeAnchor {
    pub fn new(server_epoch_ms: i64, captured_at: Instant) -> Self {
        Self {
            server_epoch_ms,
            captured_at,
            degraded: false,
        }
    }

    /// Anchored on the local wall clock. Used when the server clock could not
    /// be read.
    pub fn local() -> Self {
        Self {
            server_epoch_ms: Utc::now().timestamp_millis(),
            captured_at: Instant::now(),
            degraded: true,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn server_epoch_ms(&self) -> i64 {
        self.server_epoch_ms
    }

    /// Server time at local instant `local`. Instants before the capture are
    /// clamped to the capture itself.
    pub fn epoch_ms_at(&self, local: Instant) -> i64 {
        let elapsed = local.saturating_duration_since(self.captured_at);
        self.server_epoch_ms
            .saturating_add(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }

    pub fn at(&self, local: Instant) -> DateTime<Utc> {
        from_epoch_ms(self.epoch_ms_at(local))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.at(Instant::now())
    }
}

pub fn from_epoch_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

pub struct TimeSource {
    http: HttpRetryClient,
    url: String,
}

impl TimeSource {
    /// `http` is reduced to a single attempt: a stale clock beats a slow one.
    pub fn new(http: &HttpRetryClient, url: &str) -> Self {
        Self {
            http: http.single_shot(),
            url: url.to_string(),
        }
    }

    pub async fn refresh(&self) -> TimeAnchor {
        let sent_at = Instant::now();
        match self.http.head(&self.url).await {
            Some(reply) => match reply.server_date_ms() {
                Some(ms) => {
                    debug!("Server clock anchored at {}", from_epoch_ms(ms));
                    TimeAnchor::new(ms, sent_at)
                }
                None => {
                    warn!("No usable Date header from {}. Using local clock.", self.url);
                    TimeAnchor::local()
                }
            },
            None => {
                warn!("Server clock unreachable. Using local clock.");
                TimeAnchor::local()
            }
        }
    }
}
