//! `line-reversal`: reliable, ordered byte streams over UDP, serving a
//! line-reversal application.
//!
//! # Architecture
//!
//! ```text
//!  UDP datagram + peer
//!       │
//!  ┌────▼──────────────┐   decode    ┌──────────┐
//!  │      Server       │────────────▶│  Packet  │
//!  │   (dispatcher)    │             └──────────┘
//!  └────┬──────────────┘
//!       │ lookup / get_or_create          ┌──────────────┐
//!  ┌────▼──────────────┐   reap_expired   │    reaper    │
//!  │   SessionTable    │◀─────────────────│ (timer task) │
//!  └────┬──────────────┘                  └──────────────┘
//!       │ Arc<Mutex<Session>>             ┌──────────────┐
//!  ┌────▼──────────────┐ poll_retransmit  │ retransmitter│
//!  │      Session      │◀─────────────────│ (per session)│
//!  │  + LineReverser   │                  └──────────────┘
//!  └────┬──────────────┘
//!       │ encoded packets
//!  ┌────▼──────┐
//!  │ Transmit  │  (fire-and-forget send capability for one peer)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (escape / encode / decode)
//! - [`session`]: per-session state machine and send-side chunking
//! - [`reverse`]: line-reversal application layer
//! - [`table`]: locked session registry with idle expiration
//! - [`timer`]: retransmission and reaper background tasks
//! - [`server`]: inbound dispatch and the UDP receive loop
//! - [`socket`]: transmit capability and async UDP socket
//! - [`config`]: tunable timeouts and chunk size
//! - [`simulator`]: lossy/reordering transmit wrapper for testing

pub mod config;
pub mod packet;
pub mod reverse;
pub mod server;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod table;
pub mod timer;

pub use config::Config;
pub use packet::{Packet, PacketError, SessionId};
pub use server::Server;
pub use socket::{Socket, SocketError, Transmit};
