//! One enabled sink's pipeline: source → optional encoder → [`DataQueue`]
//! (§4.5). Negotiation decides, once, whether the encoder is needed at all;
//! the per-frame loop afterwards never re-checks it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use device_protocol::{AudioCodec, AudioInfo, CoreError, CoreResult, VideoCodec, VideoInfo};
use tracing::{debug, info, warn};

use crate::media::{AudioEncoder, AudioSource, VideoEncoder, VideoSource};
use crate::queue::{DataQueue, MsgQueue};
use crate::scheduler::{spawn_sized, ThreadSizing};

const AUDIO_FRAME_MS: u32 = 20;

fn audio_frame_samples(info: &AudioInfo, encoder_in_frame_bytes: Option<usize>) -> usize {
    match encoder_in_frame_bytes {
        Some(bytes) => bytes / info.bytes_per_frame().max(1),
        None => (info.sample_rate as usize * AUDIO_FRAME_MS as usize) / 1000,
    }
}

/// Negotiation outcome for one stream: either a workable (possibly
/// bypassed) pipeline, or the stream demoted to `None` (§4.5).
enum Negotiated<I> {
    Active { info: I, bypass: bool },
    Demoted,
}

fn negotiate_audio(
    source: &dyn AudioSource,
    encoder_codecs: &[AudioCodec],
    wanted: AudioInfo,
) -> Negotiated<AudioInfo> {
    if !encoder_codecs.contains(&wanted.codec) {
        return Negotiated::Demoted;
    }
    if source.negotiate(&[wanted]).is_some() {
        return Negotiated::Active {
            info: wanted,
            bypass: true,
        };
    }
    // Source cannot hand us the sink codec directly; assume it can at least
    // produce PCM for the encoder to consume (encoder path, not bypassed).
    let pcm_request = AudioInfo {
        codec: AudioCodec::Pcm,
        ..wanted
    };
    match source.negotiate(&[pcm_request]) {
        Some(info) => Negotiated::Active { info, bypass: false },
        None => Negotiated::Demoted,
    }
}

fn negotiate_video(
    source: &dyn VideoSource,
    encoder_codecs: &[VideoCodec],
    wanted: VideoInfo,
) -> Negotiated<VideoInfo> {
    if !encoder_codecs.contains(&wanted.codec) {
        return Negotiated::Demoted;
    }
    if source.negotiate(&[wanted]).is_some() {
        return Negotiated::Active {
            info: wanted,
            bypass: true,
        };
    }
    let raw_request = VideoInfo {
        codec: VideoCodec::Yuv420p,
        ..wanted
    };
    match source.negotiate(&[raw_request]) {
        Some(info) => Negotiated::Active { info, bypass: false },
        None => Negotiated::Demoted,
    }
}

/// Per-stream disable timeout (§4.5, §9 open question): audio and video are
/// kept as two distinct configurable bounds rather than unified.
pub struct PathTimeouts {
    pub audio_disable: Duration,
    pub video_disable: Duration,
}

impl Default for PathTimeouts {
    fn default() -> Self {
        Self {
            audio_disable: Duration::from_millis(100_000),
            video_disable: Duration::from_millis(10_000),
        }
    }
}

struct EncodeThread {
    enabled: Arc<AtomicBool>,
    exit_queue: Arc<MsgQueue>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EncodeThread {
    fn spawn<F: FnOnce(Arc<AtomicBool>) + Send + 'static>(
        name: &str,
        scheduler: &dyn ThreadSizing,
        body: F,
    ) -> Self {
        let enabled = Arc::new(AtomicBool::new(true));
        let exit_queue = Arc::new(MsgQueue::new(1, 1));
        let enabled_for_thread = enabled.clone();
        let exit_queue_for_thread = exit_queue.clone();
        let handle = spawn_sized(name, scheduler, move || {
            body(enabled_for_thread);
            let _ = exit_queue_for_thread.send(&[0u8]);
        })
        .expect("spawn capture encode thread");
        Self {
            enabled,
            exit_queue,
            handle: Mutex::new(Some(handle)),
        }
    }

    fn disable_and_join(&self, queue: &DataQueue, timeout: Duration) {
        self.enabled.store(false, Ordering::SeqCst);
        queue.wakeup();
        if self.exit_queue.recv_timeout(timeout).ok().flatten().is_none() {
            warn!("capture encode thread did not exit within {:?}", timeout);
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Audio leg of a capture sink: source → optional encoder → sink queue.
pub struct AudioCapturePath {
    info: AudioInfo,
    bypass: bool,
    queue: Arc<DataQueue>,
    thread: Mutex<Option<EncodeThread>>,
    timeout: Duration,
    encoder: Arc<Mutex<Option<Box<dyn AudioEncoder>>>>,
}

impl AudioCapturePath {
    /// Negotiates and wires the pipeline; does not start the encode thread
    /// (that happens in `enable`).
    pub fn new(
        source: &dyn AudioSource,
        encoder_codecs: &[AudioCodec],
        wanted: AudioInfo,
        ring_bytes: usize,
        disable_timeout: Duration,
    ) -> Option<Self> {
        match negotiate_audio(source, encoder_codecs, wanted) {
            Negotiated::Demoted => {
                info!("audio sink codec {:?} demoted to None", wanted.codec);
                None
            }
            Negotiated::Active { info, bypass } => {
                debug!(?info, bypass, "audio capture path negotiated");
                Some(Self {
                    info,
                    bypass,
                    queue: Arc::new(DataQueue::new(ring_bytes)),
                    thread: Mutex::new(None),
                    timeout: disable_timeout,
                    encoder: Arc::new(Mutex::new(None)),
                })
            }
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn info(&self) -> AudioInfo {
        self.info
    }

    pub fn queue(&self) -> Arc<DataQueue> {
        self.queue.clone()
    }

    pub fn frame_samples(&self, encoder_in_frame_bytes: Option<usize>) -> usize {
        audio_frame_samples(&self.info, encoder_in_frame_bytes)
    }

    /// Forwards a live bitrate change to the running encoder. A no-op on a
    /// bypassed path, which has no encoder to adjust.
    pub fn set_bitrate(&self, bps: u32) -> CoreResult<()> {
        match self.encoder.lock().unwrap().as_mut() {
            Some(enc) => enc.set_bitrate(bps),
            None => Ok(()),
        }
    }

    /// Starts the per-stream encode thread. `source` and `encoder` are
    /// moved into the thread; `encoder` is `None` when bypassed. Opens and
    /// starts `source` (and, when not bypassed, `encoder`) before the
    /// thread's per-frame loop begins.
    pub fn enable(
        &self,
        mut source: Box<dyn AudioSource>,
        encoder: Option<Box<dyn AudioEncoder>>,
        frame_bytes: usize,
        scheduler: &dyn ThreadSizing,
    ) -> CoreResult<()> {
        let info = self.info;
        source.open()?;
        source.start(info)?;
        *self.encoder.lock().unwrap() = encoder;
        let encoder_handle = self.encoder.clone();
        if !self.bypass {
            if let Some(enc) = encoder_handle.lock().unwrap().as_mut() {
                enc.start(info)?;
            }
        }

        let queue = self.queue.clone();
        let bypass = self.bypass;
        let thread = EncodeThread::spawn("aenc", scheduler, move |enabled| {
            let mut in_buf = vec![0u8; frame_bytes];
            let mut out_buf = vec![0u8; frame_bytes.max(4096)];
            while enabled.load(Ordering::SeqCst) {
                let n = match source.read(&mut in_buf) {
                    Ok(0) => break, // EOS
                    Ok(n) => n,
                    Err(e) => {
                        warn!("audio source read failed: {e}");
                        break;
                    }
                };
                let payload = &in_buf[..n];
                let result = if bypass {
                    queue.reserve(payload.len())
                } else {
                    let mut guard = encoder_handle.lock().unwrap();
                    let enc = guard.as_mut().expect("encoder present when not bypassed");
                    match enc.encode(payload, &mut out_buf) {
                        Ok(size) => {
                            drop(guard);
                            let r = queue.reserve(size.max(1));
                            if let Ok(Some(res)) = r {
                                let _ = res.write_and_commit(&out_buf[..size]);
                            }
                            continue;
                        }
                        Err(CoreError::NotEnough(_)) => continue,
                        Err(e) => {
                            warn!("audio encode failed: {e}");
                            continue;
                        }
                    }
                };
                match result {
                    Ok(Some(res)) => {
                        let _ = res.write_and_commit(payload);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("audio sink reserve failed: {e}");
                        break;
                    }
                }
            }
            let _ = source.stop();
            let _ = source.close();
            if let Some(enc) = encoder_handle.lock().unwrap().as_mut() {
                let _ = enc.stop();
            }
        });
        *self.thread.lock().unwrap() = Some(thread);
        Ok(())
    }

    pub fn disable(&self) {
        if let Some(thread) = self.thread.lock().unwrap().take() {
            thread.disable_and_join(&self.queue, self.timeout);
        }
    }
}

/// Video leg of a capture sink: mirrors [`AudioCapturePath`].
pub struct VideoCapturePath {
    info: VideoInfo,
    bypass: bool,
    queue: Arc<DataQueue>,
    thread: Mutex<Option<EncodeThread>>,
    timeout: Duration,
    encoder: Arc<Mutex<Option<Box<dyn VideoEncoder>>>>,
}

impl VideoCapturePath {
    pub fn new(
        source: &dyn VideoSource,
        encoder_codecs: &[VideoCodec],
        wanted: VideoInfo,
        ring_bytes: usize,
        disable_timeout: Duration,
    ) -> Option<Self> {
        match negotiate_video(source, encoder_codecs, wanted) {
            Negotiated::Demoted => {
                info!("video sink codec {:?} demoted to None", wanted.codec);
                None
            }
            Negotiated::Active { info, bypass } => {
                debug!(?info, bypass, "video capture path negotiated");
                Some(Self {
                    info,
                    bypass,
                    queue: Arc::new(DataQueue::new(ring_bytes)),
                    thread: Mutex::new(None),
                    timeout: disable_timeout,
                    encoder: Arc::new(Mutex::new(None)),
                })
            }
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    pub fn queue(&self) -> Arc<DataQueue> {
        self.queue.clone()
    }

    /// Forwards a live bitrate change to the running encoder. A no-op on a
    /// bypassed path, which has no encoder to adjust.
    pub fn set_bitrate(&self, bps: u32) -> CoreResult<()> {
        match self.encoder.lock().unwrap().as_mut() {
            Some(enc) => enc.set_bitrate(bps),
            None => Ok(()),
        }
    }

    pub fn enable(
        &self,
        mut source: Box<dyn VideoSource>,
        encoder: Option<Box<dyn VideoEncoder>>,
        raw_frame_bytes: usize,
        out_frame_bytes: usize,
        scheduler: &dyn ThreadSizing,
    ) -> CoreResult<()> {
        let info = self.info;
        source.open()?;
        source.start(info)?;
        *self.encoder.lock().unwrap() = encoder;
        let encoder_handle = self.encoder.clone();
        if !self.bypass {
            if let Some(enc) = encoder_handle.lock().unwrap().as_mut() {
                enc.start(info)?;
            }
        }

        let queue = self.queue.clone();
        let bypass = self.bypass;
        let thread = EncodeThread::spawn("venc", scheduler, move |enabled| {
            let mut in_buf = vec![0u8; raw_frame_bytes];
            let mut out_buf = vec![0u8; out_frame_bytes.max(raw_frame_bytes)];
            while enabled.load(Ordering::SeqCst) {
                let n = match source.read(&mut in_buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        warn!("video source read failed: {e}");
                        break;
                    }
                };
                let payload = &in_buf[..n];
                if bypass {
                    match queue.reserve(payload.len()) {
                        Ok(Some(res)) => {
                            let _ = res.write_and_commit(payload);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("video sink reserve failed: {e}");
                            break;
                        }
                    }
                    continue;
                }
                let mut guard = encoder_handle.lock().unwrap();
                let enc = guard.as_mut().expect("encoder present when not bypassed");
                match enc.encode(payload, &mut out_buf) {
                    Ok(size) => {
                        drop(guard);
                        if let Ok(Some(res)) = queue.reserve(size.max(1)) {
                            let _ = res.write_and_commit(&out_buf[..size]);
                        }
                    }
                    Err(CoreError::NotEnough(_)) => {
                        // Abandon this frame's output reservation and move on.
                        continue;
                    }
                    Err(e) => warn!("video encode failed: {e}"),
                }
            }
            let _ = source.stop();
            let _ = source.close();
            if let Some(enc) = encoder_handle.lock().unwrap().as_mut() {
                let _ = enc.stop();
            }
        });
        *self.thread.lock().unwrap() = Some(thread);
        Ok(())
    }

    pub fn disable(&self) {
        if let Some(thread) = self.thread.lock().unwrap().take() {
            thread.disable_and_join(&self.queue, self.timeout);
        }
    }
}

pub fn default_timeouts() -> PathTimeouts {
    PathTimeouts::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testdouble::{NullAudioEncoder, SyntheticAudioSource};

    #[test]
    fn bypass_when_source_matches_sink_codec() {
        let wanted = AudioInfo {
            codec: AudioCodec::Opus,
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
        };
        let source = SyntheticAudioSource::new(wanted);
        let path = AudioCapturePath::new(
            &source,
            &[AudioCodec::Opus],
            wanted,
            4096,
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(path.is_bypassed());
    }

    #[test]
    fn demoted_when_no_matching_encoder_codec() {
        let wanted = AudioInfo {
            codec: AudioCodec::Aac,
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
        };
        let source = SyntheticAudioSource::new(wanted);
        let path = AudioCapturePath::new(
            &source,
            &[AudioCodec::Opus],
            wanted,
            4096,
            Duration::from_millis(100),
        );
        assert!(path.is_none());
    }

    #[test]
    fn non_bypass_path_requires_pcm_source_fallback() {
        let wanted = AudioInfo {
            codec: AudioCodec::Opus,
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
        };
        let pcm_source_info = AudioInfo {
            codec: AudioCodec::Pcm,
            ..wanted
        };
        let source = SyntheticAudioSource::new(pcm_source_info);
        let path = AudioCapturePath::new(
            &source,
            &[AudioCodec::Opus],
            wanted,
            4096,
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(!path.is_bypassed());
        let _ = NullAudioEncoder::new(AudioCodec::Opus, 320, 320);
    }
}
