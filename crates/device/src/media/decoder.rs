//! Decoder wrapper contracts (§4.4): header-first probing, steady-state
//! decode, and the optional pluggable framebuffer for zero-copy video
//! render.

use device_protocol::{AudioFrameInfo, CoreResult, VideoFrameInfo};

/// Result of the first `decode` call on a fresh stream: the negotiated
/// frame shape plus the buffer size the caller must allocate before
/// retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProbe {
    pub frame_info: AudioFrameInfo,
    pub required_buf_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProbe {
    pub frame_info: VideoFrameInfo,
    pub required_buf_size: usize,
}

pub trait AudioDecoder: Send {
    fn start(&mut self) -> CoreResult<()>;
    /// First call on a header-bearing input returns the probe; afterwards
    /// returns `None` and `decode` is used directly.
    fn probe(&mut self, input: &[u8]) -> CoreResult<Option<AudioProbe>>;
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> CoreResult<usize>;
    fn stop(&mut self) -> CoreResult<()>;
}

/// Lets a renderer hand its own backbuffer to the decoder, skipping a copy.
pub trait FramebufferProvider: Send {
    fn fetch(&mut self, size: usize) -> CoreResult<Vec<u8>>;
    fn give_back(&mut self, buf: Vec<u8>, discard: bool);
}

pub trait VideoDecoder: Send {
    fn start(&mut self) -> CoreResult<()>;
    fn probe(&mut self, input: &[u8]) -> CoreResult<Option<VideoProbe>>;
    /// Decodes one frame, applying the configured color-convert stage if the
    /// decoder's native output doesn't match the renderer's requested
    /// format.
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> CoreResult<usize>;
    fn stop(&mut self) -> CoreResult<()>;
}
