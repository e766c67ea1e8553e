//! Framing for [`GossipEnvelope`] over a stream transport.
//!
//! Wire format per frame:
//!   [4 bytes big-endian length][UTF-8 JSON payload]
//!
//! Max frame payload: 65 535 bytes. JSON uses compact separators so the
//! same encoder is reusable for BLE, where MTU is tight.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::types::GossipEnvelope;

pub const MAX_FRAME_BYTES: usize = 65_535;

/// Encode `envelope` as compact JSON. Returns `Err` if the encoded payload
/// would exceed [`MAX_FRAME_BYTES`].
pub fn encode(envelope: &GossipEnvelope) -> io::Result<Vec<u8>> {
    let payload = serde_json::to_vec(envelope)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("envelope of {} bytes exceeds max frame size", payload.len()),
        ));
    }
    Ok(payload)
}

/// Parse a single frame's payload bytes into a [`GossipEnvelope`].
///
/// A frame whose JSON fails to parse, or that lacks any of `topic`,
/// `payload`, `sender_id`, `message_id`, is rejected — this is a normal
/// outcome, not a connection-ending error; the caller decides whether to
/// keep reading.
pub fn decode(bytes: &[u8]) -> Result<GossipEnvelope, FrameError> {
    serde_json::from_slice(bytes).map_err(|_| FrameError::Malformed)
}

/// Outcome of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Malformed,
}

/// Write one length-prefixed frame to `io`.
pub async fn write_frame<W>(io: &mut W, envelope: &GossipEnvelope) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode(envelope)?;
    let len = payload.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&payload).await?;
    io.flush().await
}

/// Read one length-prefixed frame from `io`.
///
/// Returns `Ok(None)` on a clean EOF before any bytes of a new frame have
/// arrived. A length prefix declaring more than [`MAX_FRAME_BYTES`] is
/// treated as a fatal framing error — the caller MUST close the connection,
/// since the stream can no longer be trusted to resynchronize.
pub async fn read_frame<R>(io: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match io.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("incoming frame of {len} bytes exceeds max frame size"),
        ));
    }
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await?;
    Ok(Some(payload))
}
