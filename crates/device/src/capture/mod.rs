//! Owns the source(s) and the capture path(s) for one sink (§4.6). Only a
//! single sink is supported in the core; the handle shape leaves room for
//! more.

pub mod path;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use device_protocol::{
    AudioCodec, AudioInfo, CoreError, CoreResult, FrameKind, SinkConfig, StreamFrame, SyncMode,
    VideoCodec, VideoInfo,
};
use tracing::info;

use crate::media::encoder::video_out_frame_size;
use crate::media::{AudioEncoder, AudioSource, VideoEncoder, VideoSource};
use crate::scheduler::ThreadSizing;
use path::{AudioCapturePath, PathTimeouts, VideoCapturePath};

/// How a configured path should run once started (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRunType {
    Disable,
    Always,
    Once,
}

/// Configuration accepted by [`Capture::open`].
pub struct CaptureOpenConfig {
    pub sync_mode: SyncMode,
    pub audio_ring_bytes: usize,
    pub video_ring_bytes: usize,
    pub timeouts: PathTimeouts,
}

impl Default for CaptureOpenConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            audio_ring_bytes: 1 << 20,
            video_ring_bytes: 1 << 20,
            timeouts: PathTimeouts::default(),
        }
    }
}

enum PathState {
    Unset,
    Added {
        audio: Option<AudioCapturePath>,
        video: Option<VideoCapturePath>,
        run_type: PathRunType,
    },
}

/// Owns one capture sink's audio/video paths end to end.
pub struct Capture {
    cfg: CaptureOpenConfig,
    path: Mutex<PathState>,
    started: AtomicBool,
    scheduler: Arc<dyn ThreadSizing>,
}

impl Capture {
    pub fn open(cfg: CaptureOpenConfig, scheduler: Arc<dyn ThreadSizing>) -> Self {
        Self {
            cfg,
            path: Mutex::new(PathState::Unset),
            started: AtomicBool::new(false),
            scheduler,
        }
    }

    /// Negotiates and builds the audio/video capture paths for `sink`.
    /// Fails with `WrongState` if a path was already set up without an
    /// intervening `close`.
    pub fn setup_path(
        &self,
        sink: SinkConfig,
        audio_source: Option<&dyn AudioSource>,
        audio_encoder_codecs: &[AudioCodec],
        video_source: Option<&dyn VideoSource>,
        video_encoder_codecs: &[VideoCodec],
    ) -> CoreResult<()> {
        let mut guard = self.path.lock().unwrap();
        if matches!(*guard, PathState::Added { .. }) {
            return Err(CoreError::WrongState(
                "path already added; close before setting up again".into(),
            ));
        }

        let audio = if sink.audio.is_enabled() {
            audio_source.and_then(|src| {
                AudioCapturePath::new(
                    src,
                    audio_encoder_codecs,
                    sink.audio.0,
                    self.cfg.audio_ring_bytes,
                    self.cfg.timeouts.audio_disable,
                )
            })
        } else {
            None
        };

        let video = if sink.video.is_enabled() {
            video_source.and_then(|src| {
                VideoCapturePath::new(
                    src,
                    video_encoder_codecs,
                    sink.video.0,
                    self.cfg.video_ring_bytes,
                    self.cfg.timeouts.video_disable,
                )
            })
        } else {
            None
        };

        info!(
            audio_active = audio.is_some(),
            video_active = video.is_some(),
            "capture path set up"
        );

        *guard = PathState::Added {
            audio,
            video,
            run_type: PathRunType::Disable,
        };
        Ok(())
    }

    /// Starts (or stops) the per-stream encode threads. `sources`/`encoders`
    /// are consumed here since the spawned threads own them for their
    /// lifetime.
    pub fn enable_path(
        &self,
        run_type: PathRunType,
        audio_source: Option<Box<dyn AudioSource>>,
        audio_encoder: Option<Box<dyn AudioEncoder>>,
        video_source: Option<Box<dyn VideoSource>>,
        video_encoder: Option<Box<dyn VideoEncoder>>,
    ) -> CoreResult<()> {
        let mut guard = self.path.lock().unwrap();
        let PathState::Added { audio, video, run_type: rt } = &mut *guard else {
            return Err(CoreError::WrongState("no path configured".into()));
        };
        *rt = run_type;
        if matches!(run_type, PathRunType::Disable) {
            if let Some(a) = audio.as_ref() {
                a.disable();
            }
            if let Some(v) = video.as_ref() {
                v.disable();
            }
            return Ok(());
        }

        if let (Some(a), Some(src)) = (audio.as_ref(), audio_source) {
            let frame_samples = a.frame_samples(audio_encoder.as_ref().map(|e| e.frame_sizes().0));
            let frame_bytes = frame_samples * a.info().bytes_per_frame();
            a.enable(src, audio_encoder, frame_bytes.max(1), self.scheduler.as_ref())?;
        }
        if let (Some(v), Some(src)) = (video.as_ref(), video_source) {
            let raw_bytes = v.info().raw_size_bytes();
            let out_bytes = video_out_frame_size(v.info().codec, raw_bytes);
            v.enable(src, video_encoder, raw_bytes, out_bytes, self.scheduler.as_ref())?;
        }
        Ok(())
    }

    pub fn start(&self) -> CoreResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&self) -> CoreResult<()> {
        self.started.store(false, Ordering::SeqCst);
        let guard = self.path.lock().unwrap();
        if let PathState::Added { audio, video, .. } = &*guard {
            if let Some(a) = audio {
                a.disable();
            }
            if let Some(v) = video {
                v.disable();
            }
        }
        Ok(())
    }

    pub fn close(&self) -> CoreResult<()> {
        self.stop()?;
        *self.path.lock().unwrap() = PathState::Unset;
        Ok(())
    }

    /// Non-destructively acquires the next encoded frame for `kind`.
    /// `no_wait`: if set and no data is ready, returns `Ok(None)` instead of
    /// blocking.
    pub fn acquire_path_frame(
        &self,
        kind: FrameKind,
        no_wait: bool,
    ) -> CoreResult<Option<StreamFrame>> {
        let guard = self.path.lock().unwrap();
        let PathState::Added { audio, video, .. } = &*guard else {
            return Err(CoreError::WrongState("no path configured".into()));
        };
        let queue = match kind {
            FrameKind::Audio => audio.as_ref().map(|a| a.queue()),
            FrameKind::Video => video.as_ref().map(|v| v.queue()),
            FrameKind::Data => None,
        };
        let Some(queue) = queue else {
            return Err(CoreError::NotSupported(format!("{kind:?} stream not active")));
        };
        drop(guard);

        if no_wait {
            let (count, _) = queue.query();
            if count == 0 {
                return Ok(None);
            }
        }
        match queue.read_lock()? {
            None => Ok(None),
            Some(view) => {
                let data = view.bytes().to_vec();
                view.peek_unlock();
                Ok(Some(StreamFrame::new(kind, 0, data)))
            }
        }
    }

    /// Advances the underlying queue's read pointer past the frame most
    /// recently acquired for `kind`.
    pub fn release_path_frame(&self, kind: FrameKind) -> CoreResult<()> {
        let guard = self.path.lock().unwrap();
        let PathState::Added { audio, video, .. } = &*guard else {
            return Err(CoreError::WrongState("no path configured".into()));
        };
        let queue = match kind {
            FrameKind::Audio => audio.as_ref().map(|a| a.queue()),
            FrameKind::Video => video.as_ref().map(|v| v.queue()),
            FrameKind::Data => None,
        };
        drop(guard);
        if let Some(queue) = queue {
            if let Some(view) = queue.read_lock()? {
                view.read_unlock();
            }
        }
        Ok(())
    }

    pub fn set_path_bitrate(&self, stream: FrameKind, bitrate: u32) -> CoreResult<()> {
        let guard = self.path.lock().unwrap();
        let PathState::Added { audio, video, .. } = &*guard else {
            return Err(CoreError::WrongState("no path configured".into()));
        };
        match stream {
            FrameKind::Audio => match audio.as_ref() {
                Some(a) => a.set_bitrate(bitrate),
                None => Err(CoreError::NotSupported("audio stream not active".into())),
            },
            FrameKind::Video => match video.as_ref() {
                Some(v) => v.set_bitrate(bitrate),
                None => Err(CoreError::NotSupported("video stream not active".into())),
            },
            FrameKind::Data => Err(CoreError::NotSupported("data stream has no bitrate".into())),
        }
    }
}

/// Grace period the path's disable call honours before the stop is forced;
/// exposed for callers that want to report progress while waiting.
pub fn disable_timeout_for(kind: FrameKind, timeouts: &PathTimeouts) -> Duration {
    match kind {
        FrameKind::Audio => timeouts.audio_disable,
        FrameKind::Video | FrameKind::Data => timeouts.video_disable,
    }
}
