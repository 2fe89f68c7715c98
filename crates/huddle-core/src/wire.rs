//! Frame I/O over async byte streams.
//!
//! Frames are self-delimiting: read the 12-byte header, validate it, then read
//! exactly `payload_size` more bytes. The header is validated before the
//! payload buffer is sized, so a hostile length cannot make us allocate more
//! than [`FrameHeader::MAX_PAYLOAD_SIZE`].

use std::io::ErrorKind;

use bytes::BytesMut;
use huddle_proto::{Frame, FrameHeader};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChannelError;

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream before a header starts.
///
/// # Errors
///
/// - `ChannelError::Protocol` if the header is invalid
/// - `ChannelError::Io` if the stream fails or ends mid-frame
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);

    let first = reader.read(&mut buf[..]).await?;
    if first == 0 {
        return Ok(None);
    }
    if first < FrameHeader::SIZE {
        reader.read_exact(&mut buf[first..]).await?;
    }

    let payload_size = FrameHeader::from_bytes(&buf)?.payload_size() as usize;
    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;
    }

    Ok(Some(Frame::decode(&buf)?))
}

/// Write one frame to `writer` and flush.
///
/// # Errors
///
/// - `ChannelError::Protocol` if the frame is oversized
/// - `ChannelError::Closed` if the peer hung up
/// - `ChannelError::Io` for other stream failures
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf)?;

    writer.write_all(&buf).await.map_err(|e| match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => ChannelError::Closed,
        _ => ChannelError::from(e),
    })?;
    writer.flush().await?;

    Ok(())
}
