//! Wire-format definitions for protocol messages.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the textual on-wire layout (kind keyword, session id, fields).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], rejecting the
//!   whole datagram if any part of it is malformed.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! Packets are ASCII, slash-delimited, and wrapped in a leading and trailing
//! delimiter:
//!
//! ```text
//!  /connect/SESSION/
//!  /data/SESSION/POSITION/DATA/
//!  /ack/SESSION/LENGTH/
//!  /close/SESSION/
//! ```
//!
//! A `/` or `\` inside a field is prefixed with `\`.  A backslash escapes
//! whichever byte follows it.  `SESSION`, `POSITION` and `LENGTH` are
//! decimal integers in `[0, 2^31)`.

use thiserror::Error;

/// Identifier chosen by the peer for one session.
pub type SessionId = u32;

/// Field separator.
pub const DELIMITER: u8 = b'/';

/// Escape prefix for a literal delimiter or backslash.
pub const ESCAPE: u8 = b'\\';

/// Exclusive upper bound for every numeric field on the wire.
pub const MAX_INTEGER: u64 = 1 << 31;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Open a session, or re-confirm an open one.
    Connect { session: SessionId },
    /// `payload` holds the unescaped stream bytes starting at `position`.
    Data {
        session: SessionId,
        position: u64,
        payload: Vec<u8>,
    },
    /// The peer has received `length` contiguous bytes of our stream.
    Ack { session: SessionId, length: u64 },
    /// Tear the session down.
    Close { session: SessionId },
}

impl Packet {
    /// Session this packet is addressed to.
    pub fn session(&self) -> SessionId {
        match self {
            Packet::Connect { session }
            | Packet::Data { session, .. }
            | Packet::Ack { session, .. }
            | Packet::Close { session } => *session,
        }
    }

    /// Wire keyword for this packet kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Data { .. } => "data",
            Packet::Ack { .. } => "ack",
            Packet::Close { .. } => "close",
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Every field is escaped, so payloads may contain any byte.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![DELIMITER];
        push_field(&mut buf, self.kind().as_bytes());
        push_field(&mut buf, self.session().to_string().as_bytes());

        match self {
            Packet::Connect { .. } | Packet::Close { .. } => {}
            Packet::Data {
                position, payload, ..
            } => {
                push_field(&mut buf, position.to_string().as_bytes());
                push_field(&mut buf, payload);
            }
            Packet::Ack { length, .. } => {
                push_field(&mut buf, length.to_string().as_bytes());
            }
        }

        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` does not start and end with an unescaped delimiter,
    /// - the kind keyword is unknown,
    /// - a numeric field is not all digits or is out of range, or
    /// - the field count does not match the kind.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let mut fields = Fields::new(split(buf)?);

        let kind = fields.next()?;
        let session = fields.next_integer()?;
        // `next_integer` already bounds the value below 2^31.
        let session = session as SessionId;

        let packet = match kind.as_slice() {
            b"connect" => Packet::Connect { session },
            b"data" => {
                let position = fields.next_integer()?;
                let payload = fields.next()?;
                Packet::Data {
                    session,
                    position,
                    payload,
                }
            }
            b"ack" => Packet::Ack {
                session,
                length: fields.next_integer()?,
            },
            b"close" => Packet::Close { session },
            _ => return Err(PacketError::UnknownKind),
        };

        fields.finish()?;
        Ok(packet)
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The datagram is not wrapped in unescaped delimiters.
    #[error("packet must start and end with an unescaped '/'")]
    MissingDelimiter,
    /// The first field is not a known message keyword.
    #[error("unknown message kind")]
    UnknownKind,
    /// The kind requires more fields than the packet carries.
    #[error("packet has too few fields")]
    MissingField,
    /// A numeric field is empty, contains a non-digit, or is `>= 2^31`.
    #[error("numeric field is not a decimal integer in [0, 2^31)")]
    InvalidInteger,
    /// Fields remain after the kind-specific ones were consumed.
    #[error("packet has too many fields")]
    TrailingFields,
}

/// Prefix every `/` and `\` in `data` with a backslash.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == DELIMITER || b == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(b);
    }
    out
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&escape(field));
    buf.push(DELIMITER);
}

/// Split the interior of a delimited packet into unescaped fields.
fn split(buf: &[u8]) -> Result<Vec<Vec<u8>>, PacketError> {
    let Some((&DELIMITER, rest)) = buf.split_first() else {
        return Err(PacketError::MissingDelimiter);
    };

    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut escaped = false;
    // True only while the last byte consumed was an unescaped delimiter.
    let mut terminated = false;

    for &b in rest {
        if escaped {
            field.push(b);
            escaped = false;
            terminated = false;
        } else if b == ESCAPE {
            escaped = true;
            terminated = false;
        } else if b == DELIMITER {
            fields.push(std::mem::take(&mut field));
            terminated = true;
        } else {
            field.push(b);
            terminated = false;
        }
    }

    if !terminated {
        return Err(PacketError::MissingDelimiter);
    }
    Ok(fields)
}

/// Sequential reader over decoded fields.
struct Fields {
    inner: std::vec::IntoIter<Vec<u8>>,
}

impl Fields {
    fn new(fields: Vec<Vec<u8>>) -> Self {
        Self {
            inner: fields.into_iter(),
        }
    }

    fn next(&mut self) -> Result<Vec<u8>, PacketError> {
        self.inner.next().ok_or(PacketError::MissingField)
    }

    fn next_integer(&mut self) -> Result<u64, PacketError> {
        parse_integer(&self.next()?)
    }

    fn finish(mut self) -> Result<(), PacketError> {
        match self.inner.next() {
            Some(_) => Err(PacketError::TrailingFields),
            None => Ok(()),
        }
    }
}

fn parse_integer(field: &[u8]) -> Result<u64, PacketError> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(PacketError::InvalidInteger);
    }

    let mut n: u64 = 0;
    for &d in field {
        n = n * 10 + u64::from(d - b'0');
        if n >= MAX_INTEGER {
            return Err(PacketError::InvalidInteger);
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(session: SessionId, position: u64, payload: &[u8]) -> Packet {
        Packet::Data {
            session,
            position,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn decode_connect() {
        assert_eq!(
            Packet::decode(b"/connect/1234567/"),
            Ok(Packet::Connect { session: 1234567 })
        );
    }

    #[test]
    fn decode_data_with_escapes() {
        let pkt = Packet::decode(br"/data/7/3/foo\/bar\\baz/").unwrap();
        assert_eq!(pkt, data(7, 3, br"foo/bar\baz"));
    }

    #[test]
    fn decode_ack_and_close() {
        assert_eq!(
            Packet::decode(b"/ack/5/1024/"),
            Ok(Packet::Ack {
                session: 5,
                length: 1024
            })
        );
        assert_eq!(
            Packet::decode(b"/close/5/"),
            Ok(Packet::Close { session: 5 })
        );
    }

    #[test]
    fn encode_produces_wire_text() {
        assert_eq!(Packet::Connect { session: 1234 }.encode(), b"/connect/1234/");
        assert_eq!(
            Packet::Ack {
                session: 1234,
                length: 6
            }
            .encode(),
            b"/ack/1234/6/"
        );
        assert_eq!(data(1234, 0, b"olleh\n").encode(), b"/data/1234/0/olleh\n/");
        assert_eq!(Packet::Close { session: 1234 }.encode(), b"/close/1234/");
    }

    #[test]
    fn escaping_survives_encode_decode() {
        let payloads: [&[u8]; 5] = [br"/", br"\", br"\/", br"a//b\\c", br"\\\/\\/"];
        for payload in payloads {
            let pkt = data(1, 0, payload);
            assert_eq!(Packet::decode(&pkt.encode()), Ok(pkt), "{payload:?}");
        }
    }

    #[test]
    fn random_payloads_survive_encode_decode() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x11c9);
        for _ in 0..5_000 {
            let len = rng.random_range(0..=64);
            // Bias towards the bytes the codec has to treat specially.
            let payload: Vec<u8> = (0..len)
                .map(|_| match rng.random_range(0..4) {
                    0 => DELIMITER,
                    1 => ESCAPE,
                    2 => b'\n',
                    _ => rng.random_range(0..=255u8),
                })
                .collect();
            let session = rng.random_range(0..MAX_INTEGER) as SessionId;
            let position = rng.random_range(0..MAX_INTEGER);
            let pkt = data(session, position, &payload);
            assert_eq!(Packet::decode(&pkt.encode()), Ok(pkt), "{payload:?}");
        }
    }

    #[test]
    fn escape_prefixes_delimiter_and_backslash() {
        assert_eq!(escape(br"a/b\c"), br"a\/b\\c".to_vec());
        assert_eq!(escape(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn missing_outer_delimiters_rejected() {
        assert_eq!(
            Packet::decode(b"connect/1/"),
            Err(PacketError::MissingDelimiter)
        );
        assert_eq!(
            Packet::decode(b"/connect/1"),
            Err(PacketError::MissingDelimiter)
        );
        assert_eq!(Packet::decode(b""), Err(PacketError::MissingDelimiter));
        assert_eq!(Packet::decode(b"/"), Err(PacketError::MissingDelimiter));
    }

    #[test]
    fn escaped_trailing_delimiter_rejected() {
        assert_eq!(
            Packet::decode(br"/data/1/0/abc\/"),
            Err(PacketError::MissingDelimiter)
        );
        assert_eq!(
            Packet::decode(br"/data/1/0/abc\"),
            Err(PacketError::MissingDelimiter)
        );
    }

    #[test]
    fn unknown_kind_rejected() {
        assert_eq!(Packet::decode(b"/open/1/"), Err(PacketError::UnknownKind));
        assert_eq!(Packet::decode(b"/CONNECT/1/"), Err(PacketError::UnknownKind));
    }

    #[test]
    fn integers_must_be_digits_in_range() {
        let bad_packets: [&[u8]; 7] = [
            b"/connect/-1/",
            b"/connect/+1/",
            b"/connect/1a/",
            b"/connect//",
            b"/connect/2147483648/",
            b"/connect/99999999999999999999999/",
            b"/ack/1/ 5/",
        ];
        for bad in bad_packets {
            assert_eq!(Packet::decode(bad), Err(PacketError::InvalidInteger));
        }
        assert_eq!(
            Packet::decode(b"/connect/2147483647/"),
            Ok(Packet::Connect {
                session: 2147483647
            })
        );
        assert_eq!(
            Packet::decode(b"/connect/007/"),
            Ok(Packet::Connect { session: 7 })
        );
    }

    #[test]
    fn field_count_must_match_kind() {
        assert_eq!(Packet::decode(b"/connect/"), Err(PacketError::MissingField));
        assert_eq!(Packet::decode(b"/data/1/0/"), Err(PacketError::MissingField));
        assert_eq!(Packet::decode(b"/ack/1/"), Err(PacketError::MissingField));
        assert_eq!(
            Packet::decode(b"/connect/1/extra/"),
            Err(PacketError::TrailingFields)
        );
        assert_eq!(
            Packet::decode(b"/data/1/0/a/b/"),
            Err(PacketError::TrailingFields)
        );
        assert_eq!(
            Packet::decode(b"/close/1/2/"),
            Err(PacketError::TrailingFields)
        );
    }

    #[test]
    fn empty_payload_is_a_field() {
        assert_eq!(Packet::decode(b"/data/1/0//"), Ok(data(1, 0, b"")));
    }

    #[test]
    fn session_accessor_covers_every_kind() {
        assert_eq!(Packet::Connect { session: 1 }.session(), 1);
        assert_eq!(data(2, 0, b"").session(), 2);
        assert_eq!(Packet::Ack { session: 3, length: 0 }.session(), 3);
        assert_eq!(Packet::Close { session: 4 }.session(), 4);
    }
}
