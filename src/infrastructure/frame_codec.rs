// Length-prefixed frame decoding for the realtime stream
//
// Each frame is a 4 byte big-endian length followed by that many bytes of JSON,
// optionally brotli-compressed frame by frame.
use crate::application::channels::ChannelError;
use async_compression::tokio::bufread::BrotliDecoder;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::AsyncReadExt;

const LENGTH_PREFIX: usize = 4;
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete frame, if the buffer holds one
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ChannelError> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX]);
        let length = u32::from_be_bytes(prefix) as usize;
        if length > MAX_FRAME_LEN {
            return Err(ChannelError::Frame(format!(
                "frame of {} bytes exceeds limit",
                length
            )));
        }
        if self.buffer.len() < LENGTH_PREFIX + length {
            return Ok(None);
        }
        self.buffer.advance(LENGTH_PREFIX);
        Ok(Some(self.buffer.split_to(length).freeze()))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Undo per-frame compression
pub async fn decode_payload(frame: Bytes, compressed: bool) -> Result<Bytes, ChannelError> {
    if !compressed {
        return Ok(frame);
    }
    let mut decoder = BrotliDecoder::new(std::io::Cursor::new(frame));
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Encode one frame the way the realtime server does
#[cfg(test)]
pub(crate) async fn encode_frame(message: &serde_json::Value, compress: bool) -> Bytes {
    use async_compression::tokio::bufread::BrotliEncoder;
    use bytes::BufMut;

    let json = serde_json::to_vec(message).unwrap();
    let payload = if compress {
        let mut encoder = BrotliEncoder::new(std::io::Cursor::new(json));
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).await.unwrap();
        compressed
    } else {
        json
    };

    let mut chunk = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);
    chunk.freeze()
}
