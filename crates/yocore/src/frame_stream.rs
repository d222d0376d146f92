//! One frame per read, one atomic frame per write.

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::Mutex;

use yoframe::Frame;
use yoframe::FrameError;
use yoframe::FrameKind;
use yoframe::MAX_FRAME_SIZE;

use crate::error::StreamError;
use crate::transport::ByteStream;

/// Binds a bidirectional byte stream to the frame codec.
///
/// Reads are linearized behind the read lock; concurrent writers are
/// permitted and never interleave bytes — on-wire order is the order writers
/// acquire the write lock.
pub struct FrameStream {
    reader: Mutex<ReadHalf<Box<dyn ByteStream>>>,
    writer: Mutex<WriteHalf<Box<dyn ByteStream>>>,
}

impl FrameStream {
    pub fn new(stream: Box<dyn ByteStream>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self { reader: Mutex::new(reader), writer: Mutex::new(writer) }
    }

    /// Blocks until one complete frame arrives.
    ///
    /// End-of-stream at a frame boundary is `EndOfStream`; truncation inside
    /// a frame is a transport failure; undecodable bytes are `Malformed`.
    pub async fn read_frame(&self) -> Result<Frame, StreamError> {
        let mut reader = self.reader.lock().await;
        read_frame_from(&mut *reader).await
    }

    /// Writes one frame atomically.
    pub async fn write_frame(&self, frame: &Frame) -> Result<(), StreamError> {
        let bytes = yoframe::encode(frame);
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await.map_err(StreamError::Transport)?;
        writer.flush().await.map_err(StreamError::Transport)
    }

    /// Shuts down the write half. The peer's pending read observes
    /// `EndOfStream`; later local writes observe a transport failure.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Reads exactly one frame from any byte reader.
///
/// The pipe-stream path uses this directly on a raw substream before taking
/// over the stream for bulk copying.
pub async fn read_frame_from<R>(reader: &mut R) -> Result<Frame, StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // Leading byte: node flag | frame kind.
    let mut first = [0u8; 1];
    match reader.read(&mut first).await {
        Ok(0) => return Err(StreamError::EndOfStream),
        Ok(_) => {}
        Err(e) => return Err(StreamError::Transport(e)),
    }
    if first[0] & yopack::NODE_FLAG == 0 {
        return Err(StreamError::Malformed(FrameError::Wire(yopack::Error::MissingNodeFlag(
            first[0],
        ))));
    }
    let kind_byte = first[0] & !yopack::NODE_FLAG;
    let kind = FrameKind::from_u8(kind_byte)
        .ok_or(StreamError::Malformed(FrameError::UnknownKind(kind_byte)))?;

    // Body length, one uvarint byte at a time.
    let mut len: u32 = 0;
    for i in 0.. {
        if i >= 5 {
            return Err(StreamError::Malformed(FrameError::Wire(yopack::Error::VarintOverflow)));
        }
        let byte = read_byte(reader).await?;
        if len > (u32::MAX >> 7) {
            return Err(StreamError::Malformed(FrameError::Wire(yopack::Error::VarintOverflow)));
        }
        len = (len << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            break;
        }
    }
    if len as usize > MAX_FRAME_SIZE {
        return Err(StreamError::Malformed(FrameError::FrameTooLarge {
            declared: len as usize,
            limit: MAX_FRAME_SIZE,
        }));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await.map_err(StreamError::Transport)?;

    yoframe::decode_body(kind, &body).map_err(StreamError::Malformed)
}

async fn read_byte<R>(reader: &mut R) -> Result<u8, StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut byte = [0u8; 1];
    match reader.read_exact(&mut byte).await {
        Ok(_) => Ok(byte[0]),
        Err(e) => Err(StreamError::Transport(e)),
    }
}
