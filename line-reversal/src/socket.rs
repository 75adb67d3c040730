//! Datagram transport boundary.
//!
//! The protocol core never owns a socket.  It is handed a [`Transmit`]
//! capability bound to one peer and fires encoded packets at it.  This module
//! defines that capability and the two implementations the crate uses:
//! - [`UdpPeer`]: a shared tokio `UdpSocket` plus a fixed peer address.
//! - `mpsc::UnboundedSender<Vec<u8>>`: in-process capture, used by tests.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that owns only
//! byte I/O; decoding happens in [`crate::server`].

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Largest datagram the receive loop will read in one call.
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Transmit
// ---------------------------------------------------------------------------

/// Fire-and-forget datagram send capability bound to one peer.
///
/// Implementations must not block.  A failed send is indistinguishable from a
/// dropped packet; retransmission is the only recovery.
pub trait Transmit: Send + Sync {
    fn transmit(&self, datagram: &[u8]);
}

impl Transmit for mpsc::UnboundedSender<Vec<u8>> {
    fn transmit(&self, datagram: &[u8]) {
        // Receiver gone means nobody is listening; same as a lost packet.
        let _ = self.send(datagram.to_vec());
    }
}

/// Send capability for one remote UDP address.
#[derive(Debug, Clone)]
pub struct UdpPeer {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
}

impl UdpPeer {
    /// Remote address this capability sends to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transmit for UdpPeer {
    fn transmit(&self, datagram: &[u8]) {
        if let Err(e) = self.socket.try_send_to(datagram, self.addr) {
            log::debug!("[socket] send to {} failed: {e}", self.addr);
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async UDP socket shared between the receive loop and every peer handle.
#[derive(Debug, Clone)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: Arc<UdpSocket>,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        // `try_send_to` reports WouldBlock until writability has been
        // observed once, which would silently drop the first outbound packet.
        inner.writable().await?;
        Ok(Self {
            local_addr,
            inner: Arc::new(inner),
        })
    }

    /// Receive the next datagram.
    ///
    /// Returns `(bytes, sender_address)`.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    /// Build a send capability bound to `addr`.
    pub fn peer(&self, addr: SocketAddr) -> UdpPeer {
        UdpPeer {
            socket: Arc::clone(&self.inner),
            addr,
        }
    }
}
