//! Line-reversal application layer.
//!
//! Consumes the reconstructed byte stream of one session and produces the
//! bytes the session should send back: every complete line, reversed, with
//! its newline restored.  A trailing partial line is held until its newline
//! arrives and is simply dropped if the session closes first.

/// Line terminator.
pub const NEWLINE: u8 = b'\n';

/// Per-session application state.
#[derive(Debug, Default)]
pub struct LineReverser {
    /// Bytes received since the last newline.
    pending: Vec<u8>,
}

impl LineReverser {
    /// Create an empty reverser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed in-order stream bytes and return the output they complete.
    ///
    /// The returned buffer is empty unless `bytes` contained at least one
    /// newline.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in bytes {
            if b != NEWLINE {
                self.pending.push(b);
                continue;
            }
            out.extend(self.pending.drain(..).rev());
            out.push(NEWLINE);
        }
        out
    }

    /// Bytes of the current unterminated line.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
