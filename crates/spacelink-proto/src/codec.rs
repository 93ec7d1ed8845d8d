//! Line-delimited JSON stanza codec for tokio.
//!
//! Each stanza is one JSON object terminated by `\n`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::{self, ProtocolError};
use crate::stanza::Stanza;

/// Default maximum frame length in bytes.
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Tokio codec encoding and decoding [`Stanza`]s.
#[derive(Debug)]
pub struct StanzaCodec {
    inner: LinesCodec,
    max_len: usize,
}

impl StanzaCodec {
    /// Create a codec with [`DEFAULT_MAX_FRAME`].
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME)
    }

    /// Create a codec with a custom frame limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_len),
            max_len,
        }
    }

    fn map_err(&self, err: LinesCodecError) -> ProtocolError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                ProtocolError::FrameTooLong { max: self.max_len }
            }
            LinesCodecError::Io(e) => ProtocolError::Io(e),
        }
    }
}

impl Default for StanzaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StanzaCodec {
    type Item = Stanza;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Stanza>> {
        loop {
            let line = match self.inner.decode(src) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.map_err(e)),
            };
            // Blank lines are keepalives.
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line).map(Some).map_err(Into::into);
        }
    }
}

impl Encoder<Stanza> for StanzaCodec {
    type Error = ProtocolError;

    fn encode(&mut self, stanza: Stanza, dst: &mut BytesMut) -> error::Result<()> {
        let line = serde_json::to_string(&stanza)?;
        self.inner.encode(line, dst).map_err(|e| self.map_err(e))
    }
}
