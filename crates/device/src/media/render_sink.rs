//! Hardware sink contracts (§4.7): the terminal consumers `AVRender`
//! drives, one per stream.

use device_protocol::{AudioFrameInfo, CoreResult, VideoFrameInfo};

pub trait AudioRender: Send {
    fn configure(&mut self, info: AudioFrameInfo) -> CoreResult<()>;
    fn write(&mut self, pcm: &[u8]) -> CoreResult<()>;
    fn set_volume(&mut self, volume: u8) -> CoreResult<()>;
}

pub trait VideoRender: Send {
    fn configure(&mut self, info: VideoFrameInfo) -> CoreResult<()>;
    fn draw(&mut self, frame: &[u8]) -> CoreResult<()>;
}
