//! Datagram dispatcher and receive loop.
//!
//! [`Server::handle_datagram`] is the single inbound path shared by every
//! session:
//!
//! ```text
//!  bytes ─▶ Packet::decode ──(error)──▶ dropped silently
//!                │
//!                ▼
//!         SessionTable::lookup ──(miss, not connect)──▶ close reply
//!                │ (miss, connect) ─▶ get_or_create + retransmitter
//!                ▼
//!         Session::on_packet ──(now closed)──▶ SessionTable::remove_if_same
//! ```
//!
//! [`Server::run`] is the listener that feeds it from a UDP socket.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::packet::Packet;
use crate::session::lock;
use crate::socket::{Socket, SocketError, Transmit};
use crate::table::SessionTable;
use crate::timer;

/// Line-reversal service state: the session table plus its tunables.
#[derive(Clone, Default)]
pub struct Server {
    table: SessionTable,
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            table: SessionTable::new(),
            config,
        }
    }

    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one received datagram from the peer behind `transmit`.
    ///
    /// Must be called from within a tokio runtime: opening a session starts
    /// its retransmission timer.
    pub fn handle_datagram(&self, datagram: &[u8], transmit: Arc<dyn Transmit>) {
        let packet = match Packet::decode(datagram) {
            Ok(p) => p,
            Err(e) => {
                log::trace!("[lrcp] dropping malformed datagram: {e}");
                return;
            }
        };
        let id = packet.session();

        let session = match (self.table.lookup(id), &packet) {
            (Some(session), _) => session,
            (None, Packet::Connect { .. }) => {
                let (session, created) = self.table.get_or_create(id, transmit, &self.config);
                if created {
                    timer::spawn_retransmitter(Arc::clone(&session), &self.config);
                }
                session
            }
            (None, _) => {
                log::debug!("[lrcp] {} for unknown session {id}; closing", packet.kind());
                transmit.transmit(&Packet::Close { session: id }.encode());
                return;
            }
        };

        let closed = {
            let mut session = lock(&session);
            session.on_packet(&packet);
            session.is_closed()
        };
        if closed {
            self.table.remove_if_same(id, &session);
        }
    }

    /// Start the idle-session reaper for this server's table.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        timer::spawn_reaper(self.table.clone(), &self.config)
    }

    /// Serve datagrams from `socket` until a receive error occurs.
    pub async fn run(self, socket: Socket) -> Result<(), SocketError> {
        log::info!("[lrcp] listening on {}", socket.local_addr);
        let reaper = self.spawn_reaper();

        let result = loop {
            let (bytes, addr) = match socket.recv_from().await {
                Ok(v) => v,
                Err(e) => break Err(e),
            };
            log::debug!("[lrcp] ← {} bytes from {addr}", bytes.len());
            self.handle_datagram(&bytes, Arc::new(socket.peer(addr)));
        };

        reaper.abort();
        result
    }
}
