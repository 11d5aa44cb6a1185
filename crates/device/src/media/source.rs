//! Producer contracts for raw capture backends (§4.3, source half).

use device_protocol::{AudioInfo, CoreResult, VideoInfo};

/// A live audio producer (microphone, line-in, synthetic generator).
pub trait AudioSource: Send {
    /// Negotiates the best of `wanted` this source can natively produce.
    /// Returning `None` means the source cannot satisfy any candidate.
    fn negotiate(&self, wanted: &[AudioInfo]) -> Option<AudioInfo>;
    fn open(&mut self) -> CoreResult<()>;
    fn start(&mut self, info: AudioInfo) -> CoreResult<()>;
    /// Reads exactly one frame's worth of PCM/encoded bytes into `buf`,
    /// returning the number of bytes written. A return of `0` is EOS.
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize>;
    fn stop(&mut self) -> CoreResult<()>;
    fn close(&mut self) -> CoreResult<()>;
    fn info(&self) -> AudioInfo;
}

/// A live video producer (camera, screen grabber, synthetic generator).
pub trait VideoSource: Send {
    fn negotiate(&self, wanted: &[VideoInfo]) -> Option<VideoInfo>;
    fn open(&mut self) -> CoreResult<()>;
    fn start(&mut self, info: VideoInfo) -> CoreResult<()>;
    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize>;
    fn stop(&mut self) -> CoreResult<()>;
    fn close(&mut self) -> CoreResult<()>;
    fn info(&self) -> VideoInfo;
}
