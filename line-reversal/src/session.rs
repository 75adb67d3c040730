//! Per-session reliable stream state machine.
//!
//! A [`Session`] owns the complete state for one peer-chosen session id:
//!
//! ```text
//!  inbound                                     outbound
//!  ───────                                     ────────
//!   data(pos, bytes) ─▶ received_to ─▶ LineReverser ─▶ send_buffer
//!                                                         │
//!          ack_to ≤ sent_to ≤ send_buffer.len() ◀─────────┘
//!               ▲                                chunked data(pos, ≤ max_chunk)
//!   ack(length) ┘
//! ```
//!
//! Sessions are `Open` from creation until they become `Closed`, which is
//! terminal.  Every handler is a no-op on a closed session.
//!
//! This module only manages state; the caller provides locking (see
//! [`crate::table`]) and the [`Transmit`] capability does the I/O.
//!
//! The peer address behind `transmit` is assumed fixed for the lifetime of
//! the session.  It is captured from the first `connect` and never re-checked.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::{Duration, Instant};

use crate::config::Config;
use crate::packet::{Packet, SessionId};
use crate::reverse::LineReverser;
use crate::socket::Transmit;

/// A session shared between the dispatcher, the reaper and its retransmitter.
pub type SharedSession = Arc<Mutex<Session>>;

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reliable stream state for one session.
pub struct Session {
    id: SessionId,
    closed: bool,

    /// Contiguous bytes of peer stream accepted so far.
    received_to: u64,

    /// Everything the application has produced, indexed by stream offset.
    send_buffer: Vec<u8>,
    /// Offset up to which bytes have been transmitted at least once.
    sent_to: u64,
    /// Highest offset the peer has acknowledged.
    ack_to: u64,
    last_send: Instant,

    max_chunk: usize,
    transmit: Arc<dyn Transmit>,
    app: LineReverser,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("received_to", &self.received_to)
            .field("sent_to", &self.sent_to)
            .field("ack_to", &self.ack_to)
            .field("buffered", &self.send_buffer.len())
            .finish()
    }
}

impl Session {
    /// Create an open session with all offsets at zero.
    pub fn new(id: SessionId, transmit: Arc<dyn Transmit>, config: &Config) -> Self {
        Self {
            id,
            closed: false,
            received_to: 0,
            send_buffer: Vec::new(),
            sent_to: 0,
            ack_to: 0,
            last_send: Instant::now(),
            max_chunk: config.max_chunk.max(1),
            transmit,
            app: LineReverser::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn received_to(&self) -> u64 {
        self.received_to
    }

    pub fn sent_to(&self) -> u64 {
        self.sent_to
    }

    pub fn ack_to(&self) -> u64 {
        self.ack_to
    }

    /// Total bytes the application has queued for the peer.
    pub fn buffered(&self) -> u64 {
        self.send_buffer.len() as u64
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    /// Dispatch one decoded packet addressed to this session.
    pub fn on_packet(&mut self, packet: &Packet) {
        debug_assert_eq!(packet.session(), self.id);
        match packet {
            Packet::Connect { .. } => self.on_connect(),
            Packet::Data {
                position, payload, ..
            } => self.on_data(*position, payload),
            Packet::Ack { length, .. } => self.on_ack(*length),
            Packet::Close { .. } => self.on_close(),
        }
    }

    /// Acknowledge a (possibly repeated) `connect` with the current offset.
    ///
    /// Never resets state: a duplicate connect means our first ack was lost.
    pub fn on_connect(&mut self) {
        if self.closed {
            return;
        }
        self.send_ack();
    }

    /// Accept stream bytes starting at `position`.
    ///
    /// A gap (`position > received_to`) only re-acks the current offset so the
    /// peer retransmits.  Otherwise the already-seen prefix is dropped and the
    /// rest is delivered to the application.
    pub fn on_data(&mut self, position: u64, payload: &[u8]) {
        if self.closed {
            return;
        }

        if position > self.received_to {
            log::debug!(
                "[lrcp] session {} gap: data at {} but received_to={}",
                self.id,
                position,
                self.received_to
            );
            self.send_ack();
            return;
        }

        let overlap = (self.received_to - position).min(payload.len() as u64) as usize;
        let fresh = &payload[overlap..];
        self.received_to += fresh.len() as u64;
        log::debug!(
            "[lrcp] ← DATA session={} pos={} len={} new={}",
            self.id,
            position,
            payload.len(),
            fresh.len()
        );
        self.send_ack();

        let out = self.app.feed(fresh);
        self.write(&out);
    }

    /// Process an acknowledgement of `length` bytes of our stream.
    pub fn on_ack(&mut self, length: u64) {
        if self.closed {
            return;
        }

        if length < self.ack_to {
            // Delayed duplicate.
            return;
        }

        if length > self.sent_to {
            log::warn!(
                "[lrcp] session {} acked {} bytes but only {} were sent; closing",
                self.id,
                length,
                self.sent_to
            );
            self.close();
            return;
        }

        self.ack_to = length;
        log::debug!(
            "[lrcp] ← ACK session={} ack_to={} sent_to={}",
            self.id,
            self.ack_to,
            self.sent_to
        );
        self.flush();
    }

    /// Peer-initiated close.
    pub fn on_close(&mut self) {
        if self.closed {
            return;
        }
        self.close();
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send `close` to the peer and enter the terminal state.
    ///
    /// Any unterminated input line is discarded.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.emit(&Packet::Close { session: self.id });
        self.closed = true;
        log::info!("[lrcp] session {} closed", self.id);
    }

    /// Queue application output and transmit whatever has not been sent yet.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.closed || bytes.is_empty() {
            return;
        }
        self.send_buffer.extend_from_slice(bytes);
        self.flush();
    }

    /// Transmit `send_buffer[sent_to..]` in chunks of at most `max_chunk` bytes.
    fn flush(&mut self) {
        let len = self.send_buffer.len();
        while (self.sent_to as usize) < len {
            let start = self.sent_to as usize;
            let end = (start + self.max_chunk).min(len);
            let packet = Packet::Data {
                session: self.id,
                position: self.sent_to,
                payload: self.send_buffer[start..end].to_vec(),
            };
            self.emit(&packet);
            log::debug!(
                "[lrcp] → DATA session={} pos={} len={}",
                self.id,
                start,
                end - start
            );
            self.sent_to = end as u64;
            self.last_send = Instant::now();
        }
    }

    /// Resend everything past `ack_to` if it has gone unacknowledged for
    /// longer than `timeout`.
    ///
    /// Returns `true` when a retransmission happened.
    pub fn poll_retransmit(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.closed || self.ack_to >= self.sent_to {
            return false;
        }
        if now.saturating_duration_since(self.last_send) <= timeout {
            return false;
        }

        log::debug!(
            "[retransmit] session {} timeout; resending from {} (sent_to={})",
            self.id,
            self.ack_to,
            self.sent_to
        );
        self.sent_to = self.ack_to;
        self.flush();
        true
    }

    fn send_ack(&self) {
        self.emit(&Packet::Ack {
            session: self.id,
            length: self.received_to,
        });
    }

    fn emit(&self, packet: &Packet) {
        self.transmit.transmit(&packet.encode());
    }
}
