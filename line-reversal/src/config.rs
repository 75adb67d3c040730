//! Tunable protocol parameters.
//!
//! None of these are hard protocol requirements; the defaults match what
//! peers of the line-reversal service expect.  The binary exposes each one
//! as a CLI flag.

use std::time::Duration;

/// Idle time after which the reaper closes a session.
pub const SESSION_EXPIRY: Duration = Duration::from_secs(60);

/// Time without an acknowledgement before outstanding data is resent.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum unescaped payload bytes carried by one outbound `data` packet.
pub const MAX_CHUNK: usize = 500;

/// Floor for timer periods; `tokio::time::interval` rejects a zero period.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Adjustable timeout and chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Idle window before a session is reaped.
    pub session_expiry: Duration,
    /// Retransmission timeout (RTO); fixed, no back-off.
    pub retransmit_timeout: Duration,
    /// Payload cap per outbound `data` packet, measured before escaping.
    pub max_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_expiry: SESSION_EXPIRY,
            retransmit_timeout: RETRANSMIT_TIMEOUT,
            max_chunk: MAX_CHUNK,
        }
    }
}

impl Config {
    /// How often the reaper scans the session table.
    pub fn reap_interval(&self) -> Duration {
        (self.session_expiry / 10).max(MIN_TICK)
    }

    /// How often each session checks for a retransmission timeout.
    pub fn retransmit_interval(&self) -> Duration {
        (self.retransmit_timeout / 10).max(MIN_TICK)
    }
}
