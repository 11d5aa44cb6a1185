//! In-memory stand-ins for the real hardware/codec backends that spec.md
//! puts out of scope (§1). Used by the integration tests and by
//! `device-agent`'s default loopback run mode.

use device_protocol::{
    AudioCodec, AudioFrameInfo, AudioInfo, CoreError, CoreResult, VideoCodec, VideoFrameInfo,
    VideoInfo,
};

use super::decoder::{AudioDecoder, AudioProbe, VideoDecoder, VideoProbe};
use super::encoder::{AudioEncoder, VideoEncoder};
use super::render_sink::{AudioRender, VideoRender};
use super::source::{AudioSource, VideoSource};

/// Produces silence (or a configurable tone byte) at a fixed PCM shape.
pub struct SyntheticAudioSource {
    info: AudioInfo,
    fill_byte: u8,
    frames_remaining: Option<u64>,
}

impl SyntheticAudioSource {
    pub fn new(info: AudioInfo) -> Self {
        Self {
            info,
            fill_byte: 0,
            frames_remaining: None,
        }
    }

    /// Stops producing data (returns EOS) after `count` more reads.
    pub fn with_frame_budget(mut self, count: u64) -> Self {
        self.frames_remaining = Some(count);
        self
    }
}

impl AudioSource for SyntheticAudioSource {
    fn negotiate(&self, wanted: &[AudioInfo]) -> Option<AudioInfo> {
        wanted.iter().find(|w| w.codec == self.info.codec).copied()
    }

    fn open(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn start(&mut self, info: AudioInfo) -> CoreResult<()> {
        self.info = info;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        if let Some(remaining) = self.frames_remaining.as_mut() {
            if *remaining == 0 {
                return Ok(0);
            }
            *remaining -= 1;
        }
        buf.fill(self.fill_byte);
        self.fill_byte = self.fill_byte.wrapping_add(1);
        Ok(buf.len())
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn info(&self) -> AudioInfo {
        self.info
    }
}

/// Produces a solid-color raw frame at a fixed resolution.
pub struct SyntheticVideoSource {
    info: VideoInfo,
    color: u8,
}

impl SyntheticVideoSource {
    pub fn new(info: VideoInfo) -> Self {
        Self { info, color: 0x40 }
    }
}

impl VideoSource for SyntheticVideoSource {
    fn negotiate(&self, wanted: &[VideoInfo]) -> Option<VideoInfo> {
        wanted.iter().find(|w| w.codec == self.info.codec).copied()
    }

    fn open(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn start(&mut self, info: VideoInfo) -> CoreResult<()> {
        self.info = info;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        buf.fill(self.color);
        Ok(buf.len())
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn info(&self) -> VideoInfo {
        self.info
    }
}

/// Pass-through "encoder" used to model the Opus leg of the loopback
/// scenario without a real Opus dependency: it frames PCM as fixed-size
/// chunks tagged with the negotiated codec, satisfying the encode contract
/// without claiming to produce a real bitstream.
#[derive(Clone)]
pub struct NullAudioEncoder {
    codecs: Vec<AudioCodec>,
    in_frame: usize,
    out_frame: usize,
}

impl NullAudioEncoder {
    pub fn new(codec: AudioCodec, in_frame: usize, out_frame: usize) -> Self {
        Self {
            codecs: vec![codec],
            in_frame,
            out_frame,
        }
    }
}

impl AudioEncoder for NullAudioEncoder {
    fn supported_codecs(&self) -> &[AudioCodec] {
        &self.codecs
    }

    fn start(&mut self, _info: AudioInfo) -> CoreResult<()> {
        Ok(())
    }

    fn frame_sizes(&self) -> (usize, usize) {
        (self.in_frame, self.out_frame)
    }

    fn set_bitrate(&mut self, _bps: u32) -> CoreResult<()> {
        Ok(())
    }

    fn encode(&mut self, input: &[u8], out: &mut [u8]) -> CoreResult<usize> {
        let n = input.len().min(out.len());
        if n < input.len() {
            return Err(CoreError::NotEnough("encoder output buffer too small".into()));
        }
        out[..n].copy_from_slice(&input[..n]);
        Ok(n)
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn AudioEncoder> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
pub struct NullVideoEncoder {
    out_codecs: Vec<VideoCodec>,
    in_codecs: Vec<VideoCodec>,
}

impl NullVideoEncoder {
    pub fn new(out_codec: VideoCodec, in_codec: VideoCodec) -> Self {
        Self {
            out_codecs: vec![out_codec],
            in_codecs: vec![in_codec],
        }
    }
}

impl VideoEncoder for NullVideoEncoder {
    fn supported_codecs(&self) -> &[VideoCodec] {
        &self.out_codecs
    }

    fn input_codecs(&self, _out_codec: VideoCodec) -> &[VideoCodec] {
        &self.in_codecs
    }

    fn start(&mut self, _info: VideoInfo) -> CoreResult<()> {
        Ok(())
    }

    fn frame_sizes(&self) -> (usize, usize) {
        (0, 0)
    }

    fn set_bitrate(&mut self, _bps: u32) -> CoreResult<()> {
        Ok(())
    }

    fn encode(&mut self, input: &[u8], out: &mut [u8]) -> CoreResult<usize> {
        let n = input.len().min(out.len());
        if n < input.len() {
            return Err(CoreError::NotEnough("encoder output buffer too small".into()));
        }
        out[..n].copy_from_slice(&input[..n]);
        Ok(n)
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn VideoEncoder> {
        Box::new(self.clone())
    }
}

/// Decodes by treating input as already-PCM (mirrors `NullAudioEncoder`).
pub struct NullAudioDecoder {
    frame_info: AudioFrameInfo,
    probed: bool,
}

impl NullAudioDecoder {
    pub fn new(frame_info: AudioFrameInfo) -> Self {
        Self {
            frame_info,
            probed: false,
        }
    }
}

impl AudioDecoder for NullAudioDecoder {
    fn start(&mut self) -> CoreResult<()> {
        self.probed = false;
        Ok(())
    }

    fn probe(&mut self, input: &[u8]) -> CoreResult<Option<AudioProbe>> {
        if self.probed {
            return Ok(None);
        }
        self.probed = true;
        Ok(Some(AudioProbe {
            frame_info: self.frame_info,
            required_buf_size: input.len(),
        }))
    }

    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> CoreResult<usize> {
        let n = input.len().min(out.len());
        if n < input.len() {
            return Err(CoreError::NotEnough("decoder output buffer too small".into()));
        }
        out[..n].copy_from_slice(&input[..n]);
        Ok(n)
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Decodes MJPEG-shaped test frames as raw already-RGB565 bytes, i.e. it
/// models the "decode + convert" path without a real JPEG codec.
pub struct NullVideoDecoder {
    frame_info: VideoFrameInfo,
    probed: bool,
}

impl NullVideoDecoder {
    pub fn new(frame_info: VideoFrameInfo) -> Self {
        Self {
            frame_info,
            probed: false,
        }
    }
}

impl VideoDecoder for NullVideoDecoder {
    fn start(&mut self) -> CoreResult<()> {
        self.probed = false;
        Ok(())
    }

    fn probe(&mut self, input: &[u8]) -> CoreResult<Option<VideoProbe>> {
        if self.probed {
            return Ok(None);
        }
        self.probed = true;
        let out_size = match self.frame_info.codec {
            VideoCodec::Rgb565 => {
                self.frame_info.width as usize * self.frame_info.height as usize * 2
            }
            _ => input.len(),
        };
        Ok(Some(VideoProbe {
            frame_info: self.frame_info,
            required_buf_size: out_size,
        }))
    }

    fn decode(&mut self, _input: &[u8], out: &mut [u8]) -> CoreResult<usize> {
        let expected = self.frame_info.width as usize * self.frame_info.height as usize * 2;
        if out.len() < expected {
            return Err(CoreError::NotEnough("decoder output buffer too small".into()));
        }
        out[..expected].fill(0xAB);
        Ok(expected)
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Records every write for inspection by tests; optionally sleeps to
/// simulate a slow hardware sink (backpressure scenario).
pub struct RecordingAudioRender {
    pub written: Vec<Vec<u8>>,
    pub slow_write_delay: Option<std::time::Duration>,
}

impl RecordingAudioRender {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            slow_write_delay: None,
        }
    }

    pub fn with_write_delay(mut self, delay: std::time::Duration) -> Self {
        self.slow_write_delay = Some(delay);
        self
    }
}

impl Default for RecordingAudioRender {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRender for RecordingAudioRender {
    fn configure(&mut self, _info: AudioFrameInfo) -> CoreResult<()> {
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> CoreResult<()> {
        if let Some(delay) = self.slow_write_delay {
            std::thread::sleep(delay);
        }
        self.written.push(pcm.to_vec());
        Ok(())
    }

    fn set_volume(&mut self, _volume: u8) -> CoreResult<()> {
        Ok(())
    }
}

pub struct RecordingVideoRender {
    pub frames: Vec<Vec<u8>>,
}

impl RecordingVideoRender {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }
}

impl Default for RecordingVideoRender {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoRender for RecordingVideoRender {
    fn configure(&mut self, _info: VideoFrameInfo) -> CoreResult<()> {
        Ok(())
    }

    fn draw(&mut self, frame: &[u8]) -> CoreResult<()> {
        self.frames.push(frame.to_vec());
        Ok(())
    }
}
