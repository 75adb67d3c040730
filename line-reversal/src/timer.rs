//! Retransmit and expiration background tasks.
//!
//! Reliable delivery and session cleanup must make progress even when no
//! datagrams arrive.  This module provides two periodic tokio tasks:
//! - [`spawn_retransmitter`]: one per session; every `RTO / 10` it asks the
//!   session to resend unacknowledged data that has been in flight longer
//!   than the RTO.  It exits once the session is closed.
//! - [`spawn_reaper`]: one per server; every `expiry / 10` it closes and
//!   removes sessions idle for the whole expiry window.
//!
//! The RTO is fixed: there is no RTT estimation or back-off.

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::session::{lock, SharedSession};
use crate::table::SessionTable;

/// Start the retransmission timer for `session`.
pub fn spawn_retransmitter(session: SharedSession, config: &Config) -> JoinHandle<()> {
    let timeout = config.retransmit_timeout;
    let mut ticker = time::interval(config.retransmit_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            let mut s = lock(&session);
            if s.is_closed() {
                log::debug!("[retransmit] session {} closed; timer stopped", s.id());
                break;
            }
            s.poll_retransmit(Instant::now(), timeout);
        }
    })
}

/// Start the idle-session reaper for `table`.
pub fn spawn_reaper(table: SessionTable, config: &Config) -> JoinHandle<()> {
    let expiry = config.session_expiry;
    let mut ticker = time::interval(config.reap_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            table.reap_expired(Instant::now(), expiry);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::session::Session;

    fn fast_config() -> Config {
        Config {
            session_expiry: Duration::from_millis(200),
            retransmit_timeout: Duration::from_millis(100),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn retransmitter_resends_unacked_data() {
        let config = fast_config();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Mutex::new(Session::new(5, Arc::new(tx), &config)));
        lock(&session).write(b"olleh\n");
        assert_eq!(rx.recv().await.unwrap(), b"/data/5/0/olleh\n/");

        let handle = spawn_retransmitter(Arc::clone(&session), &config);
        let resent = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("retransmission within timeout")
            .unwrap();
        assert_eq!(resent, b"/data/5/0/olleh\n/");

        lock(&session).close();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("timer stops after close")
            .unwrap();
    }

    #[tokio::test]
    async fn reaper_removes_idle_sessions() {
        let config = fast_config();
        let table = SessionTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        table.get_or_create(8, Arc::new(tx), &config);

        let reaper = spawn_reaper(table.clone(), &config);
        let close = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("session reaped")
            .unwrap();
        assert_eq!(close, b"/close/8/");
        assert!(!table.contains(8));
        reaper.abort();
    }
}
