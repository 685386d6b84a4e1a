//! Length-prefixed frames: a 4-byte big-endian length, then the payload.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("empty frame")]
    Empty,
}

/// Read one frame. `Ok(None)` means the peer closed the connection
/// cleanly between frames.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWriteExt + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_back_written_frames_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"{\"a\":1}").await.unwrap();
        write_frame(&mut buf, b"[]").await.unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 7]);

        let mut reader = buf.as_slice();
        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), b"{\"a\":1}");
        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), b"[]");
        assert!(read_frame(&mut reader, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_and_empty_frames_are_rejected() {
        let mut reader: &[u8] = &[0, 0, 1, 0];
        assert!(matches!(
            read_frame(&mut reader, 255).await,
            Err(FrameError::TooLarge { len: 256, max: 255 })
        ));

        let mut reader: &[u8] = &[0, 0, 0, 0];
        assert!(matches!(read_frame(&mut reader, 255).await, Err(FrameError::Empty)));
    }

    #[tokio::test]
    async fn truncated_payload_is_an_io_error() {
        let mut reader: &[u8] = &[0, 0, 0, 5, b'a', b'b'];
        assert!(matches!(read_frame(&mut reader, 64).await, Err(FrameError::Io(_))));
    }
}
