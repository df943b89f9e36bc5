//! Length-prefixed frame I/O.
//!
//! Each frame is a little-endian `u32` payload length followed by the payload.
//! A zero length is a heartbeat.

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dispatch::wire::WireError;

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<Option<Bytes>, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if len > max_len {
        return Err(WireError::FrameTooLarge {
            len: len as usize,
            max: max_len,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_len: u32) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= max_len)
        .ok_or(WireError::FrameTooLarge {
            len: payload.len(),
            max: max_len,
        })?;

    writer.write_u32_le(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
