//! Length-prefixed JSON envelopes on the tunnel transport (§4.1).
//!
//! Each frame is an 8-byte big-endian length `L` followed by `L` bytes of
//! UTF-8 JSON. Reads/writes go straight to the socket with `read`/
//! `write_all` rather than through a buffering `Decoder`/`Encoder`: a proxy
//! connection switches from framed messages to raw spliced bytes mid-life,
//! and a buffering codec could absorb bytes that belong to the splice.

use crate::error::Error;
use protocol::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected without reading the body.
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

/// Encode `message` as one envelope and write `length || body` to `stream`.
pub async fn write_msg<W>(stream: &mut W, message: &Message) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let body = protocol::encode_envelope(message)?;
    stream.write_u64(body.len() as u64).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame and decode it into a `Message`. A clean EOF before any
/// byte of the length prefix is read surfaces as `Error::Eof`; anything else
/// short of a complete frame is `Io`.
pub async fn read_msg<R>(stream: &mut R) -> Result<Message, Error>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 8];
    let mut filled = 0;
    loop {
        let n = stream.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(Error::Eof);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
        if filled == len_buf.len() {
            break;
        }
    }
    let len = u64::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    let message = protocol::decode_envelope(&body)?;
    Ok(message)
}

/// Convenience used by call sites that expect exactly one variant next
/// (e.g. the control handshake waiting for `Auth`).
pub async fn read_msg_into<R>(stream: &mut R, expected: &'static str) -> Result<Message, Error>
where
    R: AsyncRead + Unpin,
{
    let message = read_msg(stream).await?;
    if message.type_name() != expected {
        return Err(protocol::Error::UnexpectedType {
            expected,
            got: message.type_name().to_string(),
        }
        .into());
    }
    Ok(message)
}
