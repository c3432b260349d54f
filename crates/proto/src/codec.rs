//! Length-prefixed postcard framing for endpoint connections.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::EndpointFrame;

/// Largest frame body accepted from a peer, in bytes.
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Errors produced while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
	/// Socket-level failure, including EOF.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// The frame body could not be encoded or decoded.
	#[error("postcard error: {0}")]
	Postcard(#[from] postcard::Error),
	/// The peer announced a frame larger than [`MAX_FRAME_LEN`].
	#[error("frame of {0} bytes exceeds limit of {MAX_FRAME_LEN}")]
	TooLarge(u32),
}

impl CodecError {
	/// Returns true if the peer closed the connection at a frame boundary.
	#[must_use]
	pub fn is_disconnect(&self) -> bool {
		matches!(self, Self::Io(e) if matches!(
			e.kind(),
			io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
		))
	}
}

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// Returns an error if encoding fails, the body exceeds [`MAX_FRAME_LEN`], or
/// the stream rejects the write.
pub async fn write_frame<W>(output: &mut W, frame: &EndpointFrame) -> Result<(), CodecError>
where
	W: AsyncWrite + Unpin,
{
	let buf = postcard::to_allocvec(frame)?;
	let len = u32::try_from(buf.len()).map_err(|_| CodecError::TooLarge(u32::MAX))?;
	if len > MAX_FRAME_LEN {
		return Err(CodecError::TooLarge(len));
	}
	output.write_u32_le(len).await?;
	output.write_all(&buf).await?;
	output.flush().await?;
	Ok(())
}

/// Reads one frame.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] before allocating if the announced length
/// is over the limit, and an I/O error with [`CodecError::is_disconnect`] set
/// when the peer hung up between frames.
pub async fn read_frame<R>(input: &mut R) -> Result<EndpointFrame, CodecError>
where
	R: AsyncRead + Unpin,
{
	let len = input.read_u32_le().await?;
	if len > MAX_FRAME_LEN {
		return Err(CodecError::TooLarge(len));
	}
	let mut buf = vec![0u8; len as usize];
	input.read_exact(&mut buf).await?;
	Ok(postcard::from_bytes(&buf)?)
}
