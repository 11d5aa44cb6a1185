//! The decode/render pipeline (§4.7): per-stream decode and render
//! threads, FIFOs in between, clock-based A/V sync, pause/flush/reset and
//! EOS handling.

pub mod fifo;
pub mod sync;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use device_protocol::{
    AudioFrameInfo, AvRenderConfig, CoreError, CoreResult, FrameKind, StreamFrame, SyncMode,
    VideoFrameInfo,
};
use tracing::{debug, warn};

use crate::media::{AudioDecoder, AudioRender, VideoDecoder, VideoRender};
use crate::scheduler::{spawn_sized, ThreadSizing};
use fifo::FrameFifo;

/// Lifecycle state of one stream within AVRender (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Configured,
    Running,
    Paused,
    Flushed,
    Closed,
}

/// Events AVRender emits asynchronously through the caller's callback.
#[derive(Debug, Clone)]
pub enum AvEvent {
    AudioRendered { pts: u32 },
    VideoRendered { pts: u32 },
    AudioEos,
    VideoEos,
    AudioDecodeErr(String),
    VideoDecodeErr(String),
}

pub type EventCb = Arc<dyn Fn(AvEvent) + Send + Sync>;
pub type PoolFreeCb = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

struct PauseGate {
    paused: Mutex<bool>,
    cond: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn set(&self, value: bool) {
        let mut p = self.paused.lock().unwrap();
        *p = value;
        self.cond.notify_all();
    }

    fn wait_while_paused(&self, quit: &AtomicBool) {
        let mut p = self.paused.lock().unwrap();
        while *p && !quit.load(Ordering::SeqCst) {
            p = self.cond.wait(p).unwrap();
        }
    }
}

struct AudioStream {
    state: Mutex<StreamState>,
    raw_fifo: Option<Arc<FrameFifo>>,
    render_fifo: Arc<FrameFifo>,
    /// Used to decode inline on the caller's thread when `raw_fifo` is
    /// disabled (no decode thread exists to do it).
    inline_decoder: Option<Arc<Mutex<Box<dyn AudioDecoder>>>>,
    quit: Arc<AtomicBool>,
    pause: Arc<PauseGate>,
    decode_handle: Mutex<Option<JoinHandle<()>>>,
    render_handle: Mutex<Option<JoinHandle<()>>>,
}

struct VideoStream {
    state: Mutex<StreamState>,
    raw_fifo: Option<Arc<FrameFifo>>,
    render_fifo: Arc<FrameFifo>,
    inline_decoder: Option<Arc<Mutex<Box<dyn VideoDecoder>>>>,
    quit: Arc<AtomicBool>,
    pause: Arc<PauseGate>,
    decode_handle: Mutex<Option<JoinHandle<()>>>,
    render_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the full decode/render pipeline for up to one audio and one video
/// stream, the master clock they synchronize against, and policy state.
pub struct AVRender {
    cfg: AvRenderConfig,
    audio: Mutex<Option<AudioStream>>,
    video: Mutex<Option<VideoStream>>,
    event_cb: Arc<Mutex<Option<EventCb>>>,
    pool_free: Arc<Mutex<Option<PoolFreeCb>>>,
    audio_clock_ms: Arc<AtomicU32>,
    video_start_pts: Arc<AtomicU32>,
    speed_millis: Arc<AtomicU32>, // speed * 1000, read lazily at audio frame boundaries
    scheduler: Arc<dyn ThreadSizing>,
}

const DEFAULT_SPEED_MILLIS: u32 = 1000;

fn emit_event(cb: &Arc<Mutex<Option<EventCb>>>, event: AvEvent) {
    if let Some(f) = cb.lock().unwrap().as_ref() {
        f(event);
    }
}

impl AVRender {
    pub fn open(cfg: AvRenderConfig, scheduler: Arc<dyn ThreadSizing>) -> Self {
        Self {
            cfg,
            audio: Mutex::new(None),
            video: Mutex::new(None),
            event_cb: Arc::new(Mutex::new(None)),
            pool_free: Arc::new(Mutex::new(None)),
            audio_clock_ms: Arc::new(AtomicU32::new(0)),
            video_start_pts: Arc::new(AtomicU32::new(0)),
            speed_millis: Arc::new(AtomicU32::new(DEFAULT_SPEED_MILLIS)),
            scheduler,
        }
    }

    pub fn set_event_cb(&self, cb: EventCb) {
        *self.event_cb.lock().unwrap() = Some(cb);
    }

    /// Data pushed via `add_*_data` while pool mode is active is handed
    /// back to `cb` exactly once when the pipeline is done with it,
    /// whatever path it took (rendered, dropped, or flushed).
    pub fn use_data_pool(&self, cb: PoolFreeCb) {
        *self.pool_free.lock().unwrap() = Some(cb);
    }

    fn free_pool_buffer(&self, data: Vec<u8>) {
        if let Some(cb) = self.pool_free.lock().unwrap().as_ref() {
            cb(data);
        }
    }

    pub fn set_video_start_pts(&self, pts: u32) {
        self.video_start_pts.store(pts, Ordering::SeqCst);
    }

    /// FollowAudio-only. Takes effect at the next audio frame boundary
    /// (§9 open question resolution), never mid-frame.
    pub fn set_speed(&self, speed: f32) -> CoreResult<()> {
        if !matches!(self.cfg.sync_mode, SyncMode::FollowAudio) {
            return Err(CoreError::WrongState("set_speed requires FollowAudio sync".into()));
        }
        if speed <= 0.0 {
            return Err(CoreError::InvalidArg("speed must be positive".into()));
        }
        self.speed_millis.store((speed * 1000.0) as u32, Ordering::SeqCst);
        Ok(())
    }

    pub fn get_render_pts(&self) -> u32 {
        self.audio_clock_ms.load(Ordering::SeqCst)
    }

    /// Adds and starts the audio decode/render thread pair. `render_fifo`
    /// and `raw_fifo` sizes of `0` inline that stage on the pushing
    /// thread's caller instead of spawning a worker.
    pub fn add_audio_stream(
        &self,
        decoder: Box<dyn AudioDecoder>,
        render: Box<dyn AudioRender>,
        frame_info: AudioFrameInfo,
        raw_fifo_size: usize,
        render_fifo_size: usize,
    ) -> CoreResult<()> {
        let quit = Arc::new(AtomicBool::new(false));
        let pause = Arc::new(PauseGate::new());
        let render_fifo = Arc::new(FrameFifo::new(render_fifo_size.max(1)));
        let raw_fifo = if raw_fifo_size > 0 {
            Some(Arc::new(FrameFifo::new(raw_fifo_size)))
        } else {
            None
        };

        let decoder = Arc::new(Mutex::new(decoder));
        let render = Arc::new(Mutex::new(render));
        {
            let mut r = render.lock().unwrap();
            r.configure(frame_info)
                .map_err(|e| CoreError::Internal(format!("audio render configure: {e}")))?;
        }
        {
            let mut d = decoder.lock().unwrap();
            d.start().map_err(|e| CoreError::Internal(format!("audio decoder start: {e}")))?;
        }

        let decode_handle = raw_fifo.as_ref().map(|raw| {
            let raw = raw.clone();
            let render_fifo = render_fifo.clone();
            let decoder = decoder.clone();
            let quit = quit.clone();
            let event_cb = self.event_cb.clone();
            let pool_free = self.pool_free.clone();
            spawn_sized("adec", self.scheduler.as_ref(), move || {
                while !quit.load(Ordering::SeqCst) {
                    let Some(mut frame) = raw.pop() else { break };
                    if frame.is_eos_marker() {
                        render_fifo.push(frame);
                        continue;
                    }
                    let mut out = vec![0u8; frame.size().max(4096)];
                    let mut dec = decoder.lock().unwrap();
                    let result = dec.decode(frame.data.as_deref().unwrap_or(&[]), &mut out);
                    drop(dec);
                    let pts = frame.pts;
                    if let Some(buf) = frame.data.take() {
                        if let Some(cb) = pool_free.lock().unwrap().as_ref() {
                            cb(buf);
                        }
                    }
                    match result {
                        Ok(n) => {
                            out.truncate(n);
                            render_fifo.push(StreamFrame::new(FrameKind::Audio, pts, out));
                        }
                        Err(e) => {
                            warn!("audio decode error: {e}");
                            emit_event(&event_cb, AvEvent::AudioDecodeErr(e.to_string()));
                        }
                    }
                }
            })
            .expect("spawn audio decode thread")
        });

        let render_handle = {
            let render_fifo = render_fifo.clone();
            let render = render.clone();
            let quit = quit.clone();
            let pause = pause.clone();
            let pause_render_only = self.cfg.pause_render_only;
            let quit_when_eos = self.cfg.quit_when_eos;
            let pause_on_first_frame = self.cfg.pause_on_first_frame;
            let audio_clock_ms = self.audio_clock_ms.clone();
            let event_cb = self.event_cb.clone();
            let sample_rate = frame_info.sample_rate;
            let channels = frame_info.channels as u32;
            let bits = frame_info.bits_per_sample as u32;
            spawn_sized("arender", self.scheduler.as_ref(), move || {
                    let mut first_frame = true;
                    loop {
                        if quit.load(Ordering::SeqCst) && !pause_render_only {
                            break;
                        }
                        pause.wait_while_paused(&quit);
                        let Some(frame) = render_fifo.pop() else { break };
                        if frame.is_eos_marker() {
                            audio_clock_ms.store(0, Ordering::SeqCst);
                            emit_event(&event_cb, AvEvent::AudioEos);
                            if quit_when_eos {
                                break;
                            }
                            continue;
                        }
                        let bytes_per_sample_frame = (channels * bits / 8).max(1);
                        let samples = frame.size() as u32 / bytes_per_sample_frame;
                        let mut r = render.lock().unwrap();
                        if let Err(e) = r.write(frame.data.as_deref().unwrap_or(&[])) {
                            warn!("audio render write failed: {e}");
                        }
                        drop(r);
                        let ms = sync::samples_to_ms(samples as u64, sample_rate);
                        let new_pts = audio_clock_ms.fetch_add(ms, Ordering::SeqCst) + ms;
                        emit_event(&event_cb, AvEvent::AudioRendered { pts: new_pts });
                        if first_frame && pause_on_first_frame {
                            pause.set(true);
                            first_frame = false;
                        }
                    }
            })
            .expect("spawn audio render thread")
        };

        let inline_decoder = if raw_fifo.is_none() {
            Some(decoder.clone())
        } else {
            None
        };
        *self.audio.lock().unwrap() = Some(AudioStream {
            state: Mutex::new(StreamState::Configured),
            raw_fifo,
            render_fifo,
            inline_decoder,
            quit,
            pause,
            decode_handle: Mutex::new(decode_handle),
            render_handle: Mutex::new(Some(render_handle)),
        });
        Ok(())
    }

    pub fn add_video_stream(
        &self,
        decoder: Box<dyn VideoDecoder>,
        render: Box<dyn VideoRender>,
        frame_info: VideoFrameInfo,
        raw_fifo_size: usize,
        render_fifo_size: usize,
    ) -> CoreResult<()> {
        let quit = Arc::new(AtomicBool::new(false));
        let pause = Arc::new(PauseGate::new());
        let render_fifo = Arc::new(FrameFifo::new(render_fifo_size.max(1)));
        let raw_fifo = if raw_fifo_size > 0 {
            Some(Arc::new(FrameFifo::new(raw_fifo_size)))
        } else {
            None
        };

        let decoder = Arc::new(Mutex::new(decoder));
        let render = Arc::new(Mutex::new(render));
        {
            let mut r = render.lock().unwrap();
            r.configure(frame_info)
                .map_err(|e| CoreError::Internal(format!("video render configure: {e}")))?;
        }
        {
            let mut d = decoder.lock().unwrap();
            d.start().map_err(|e| CoreError::Internal(format!("video decoder start: {e}")))?;
        }

        let decode_handle = raw_fifo.as_ref().map(|raw| {
            let raw = raw.clone();
            let render_fifo = render_fifo.clone();
            let decoder = decoder.clone();
            let quit = quit.clone();
            let video_start_pts = self.video_start_pts.clone();
            let event_cb = self.event_cb.clone();
            let pool_free = self.pool_free.clone();
            spawn_sized("vdec", self.scheduler.as_ref(), move || {
                while !quit.load(Ordering::SeqCst) {
                    let Some(mut frame) = raw.pop() else { break };
                    if frame.is_eos_marker() {
                        render_fifo.push(frame);
                        continue;
                    }
                    if frame.pts < video_start_pts.load(Ordering::SeqCst) {
                        if let Some(buf) = frame.data.take() {
                            if let Some(cb) = pool_free.lock().unwrap().as_ref() {
                                cb(buf);
                            }
                        }
                        continue;
                    }
                    let mut out = vec![0u8; frame.size().max(4096)];
                    let mut dec = decoder.lock().unwrap();
                    let result = dec.decode(frame.data.as_deref().unwrap_or(&[]), &mut out);
                    drop(dec);
                    let pts = frame.pts;
                    if let Some(buf) = frame.data.take() {
                        if let Some(cb) = pool_free.lock().unwrap().as_ref() {
                            cb(buf);
                        }
                    }
                    match result {
                        Ok(n) => {
                            out.truncate(n);
                            render_fifo.push(StreamFrame::new(FrameKind::Video, pts, out));
                        }
                        Err(e) => {
                            warn!("video decode error: {e}");
                            emit_event(&event_cb, AvEvent::VideoDecodeErr(e.to_string()));
                        }
                    }
                }
            })
            .expect("spawn video decode thread")
        });

        let render_handle = {
            let render_fifo = render_fifo.clone();
            let render = render.clone();
            let quit = quit.clone();
            let pause = pause.clone();
            let sync_mode = self.cfg.sync_mode;
            let allow_drop_data = self.cfg.allow_drop_data;
            let quit_when_eos = self.cfg.quit_when_eos;
            let audio_clock_ms = self.audio_clock_ms.clone();
            let event_cb = self.event_cb.clone();
            // The fixed-frame-info hint doesn't carry fps; 25fps is the
            // pacing default used for the FollowAudio drop threshold.
            let fps = 25u8;
            spawn_sized("vrender", self.scheduler.as_ref(), move || loop {
                if quit.load(Ordering::SeqCst) {
                    break;
                }
                pause.wait_while_paused(&quit);
                let Some(frame) = render_fifo.pop() else { break };
                if frame.is_eos_marker() {
                    emit_event(&event_cb, AvEvent::VideoEos);
                    if quit_when_eos {
                        break;
                    }
                    continue;
                }
                let master = match sync_mode {
                    SyncMode::FollowAudio => audio_clock_ms.load(Ordering::SeqCst),
                    SyncMode::FollowTime | SyncMode::None => frame.pts,
                };
                if matches!(sync_mode, SyncMode::FollowAudio) {
                    match sync::decide(sync_mode, frame.pts, master, fps, allow_drop_data) {
                        sync::SyncDecision::Drop => continue,
                        sync::SyncDecision::WaitThen => {
                            std::thread::sleep(sync::wait_duration(frame.pts, master));
                        }
                        sync::SyncDecision::RenderNow => {}
                    }
                }
                let mut r = render.lock().unwrap();
                if let Err(e) = r.draw(frame.data.as_deref().unwrap_or(&[])) {
                    warn!("video render draw failed: {e}");
                }
                drop(r);
                emit_event(&event_cb, AvEvent::VideoRendered { pts: frame.pts });
            })
            .expect("spawn video render thread")
        };

        let inline_decoder = if raw_fifo.is_none() {
            Some(decoder.clone())
        } else {
            None
        };
        *self.video.lock().unwrap() = Some(VideoStream {
            state: Mutex::new(StreamState::Configured),
            raw_fifo,
            render_fifo,
            inline_decoder,
            quit,
            pause,
            decode_handle: Mutex::new(decode_handle),
            render_handle: Mutex::new(Some(render_handle)),
        });
        Ok(())
    }

    fn mark_running(state: &Mutex<StreamState>) {
        let mut s = state.lock().unwrap();
        if *s == StreamState::Configured {
            *s = StreamState::Running;
        }
    }

    pub fn add_audio_data(&self, data: Vec<u8>, pts: u32, eos: bool) -> CoreResult<()> {
        let guard = self.audio.lock().unwrap();
        let Some(stream) = guard.as_ref() else {
            return Err(CoreError::WrongState("no audio stream configured".into()));
        };
        Self::mark_running(&stream.state);
        if eos {
            // The incoming buffer is never queued or decoded on this path;
            // the pipeline is done with it the moment we return.
            stream.render_fifo.push(StreamFrame::eos(FrameKind::Audio));
            drop(guard);
            self.free_pool_buffer(data);
        } else if let Some(raw) = &stream.raw_fifo {
            // Ownership moves into the raw fifo; the decode thread frees it
            // once `decode` has consumed it.
            raw.push(StreamFrame::new(FrameKind::Audio, pts, data));
        } else {
            // No decode thread exists; decode inline on this call before
            // handing the result to the render FIFO.
            let decoder = stream
                .inline_decoder
                .as_ref()
                .expect("inline decoder present when raw_fifo is disabled");
            let render_fifo = stream.render_fifo.clone();
            let mut out = vec![0u8; data.len().max(4096)];
            let mut dec = decoder.lock().unwrap();
            let result = dec.decode(&data, &mut out);
            drop(dec);
            drop(guard);
            self.free_pool_buffer(data);
            match result {
                Ok(n) => {
                    out.truncate(n);
                    render_fifo.push(StreamFrame::new(FrameKind::Audio, pts, out));
                }
                Err(e) => {
                    emit_event(&self.event_cb, AvEvent::AudioDecodeErr(e.to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn add_video_data(&self, data: Vec<u8>, pts: u32, eos: bool) -> CoreResult<()> {
        let guard = self.video.lock().unwrap();
        let Some(stream) = guard.as_ref() else {
            return Err(CoreError::WrongState("no video stream configured".into()));
        };
        Self::mark_running(&stream.state);
        if eos {
            stream.render_fifo.push(StreamFrame::eos(FrameKind::Video));
            drop(guard);
            self.free_pool_buffer(data);
        } else if let Some(raw) = &stream.raw_fifo {
            raw.push(StreamFrame::new(FrameKind::Video, pts, data));
        } else {
            let decoder = stream
                .inline_decoder
                .as_ref()
                .expect("inline decoder present when raw_fifo is disabled");
            let render_fifo = stream.render_fifo.clone();
            let mut out = vec![0u8; data.len().max(4096)];
            let mut dec = decoder.lock().unwrap();
            let result = dec.decode(&data, &mut out);
            drop(dec);
            drop(guard);
            self.free_pool_buffer(data);
            match result {
                Ok(n) => {
                    out.truncate(n);
                    render_fifo.push(StreamFrame::new(FrameKind::Video, pts, out));
                }
                Err(e) => {
                    emit_event(&self.event_cb, AvEvent::VideoDecodeErr(e.to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn audio_fifo_enough(&self, size: usize) -> bool {
        self.audio
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.raw_fifo.as_ref().unwrap_or(&s.render_fifo).fifo_enough(size))
            .unwrap_or(false)
    }

    pub fn video_fifo_enough(&self, size: usize) -> bool {
        self.video
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.raw_fifo.as_ref().unwrap_or(&s.render_fifo).fifo_enough(size))
            .unwrap_or(false)
    }

    pub fn get_audio_fifo_level(&self) -> usize {
        self.audio
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.render_fifo.level())
            .unwrap_or(0)
    }

    pub fn get_video_fifo_level(&self) -> usize {
        self.video
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.render_fifo.level())
            .unwrap_or(0)
    }

    /// Pausing twice in a row is a no-op (§8 pause idempotence).
    pub fn pause(&self, paused: bool) {
        if let Some(a) = self.audio.lock().unwrap().as_ref() {
            a.pause.set(paused);
        }
        if let Some(v) = self.video.lock().unwrap().as_ref() {
            v.pause.set(paused);
        }
    }

    /// Clears both FIFOs and resets the audio clock to 0.
    /// Frees any pool-tracked originals still sitting in `raw`, leaving
    /// `render_fifo`'s already-decoded copies to just drop.
    fn drain_and_free_raw(&self, raw: &FrameFifo) {
        for frame in raw.flush() {
            if let Some(buf) = frame.data {
                self.free_pool_buffer(buf);
            }
        }
    }

    pub fn flush(&self) {
        if let Some(a) = self.audio.lock().unwrap().as_ref() {
            if let Some(raw) = &a.raw_fifo {
                self.drain_and_free_raw(raw);
            }
            a.render_fifo.flush();
        }
        if let Some(v) = self.video.lock().unwrap().as_ref() {
            if let Some(raw) = &v.raw_fifo {
                self.drain_and_free_raw(raw);
            }
            v.render_fifo.flush();
        }
        self.audio_clock_ms.store(0, Ordering::SeqCst);
    }

    /// Stops stream threads and tears down decoder state. Streams can be
    /// re-added afterwards.
    pub fn reset(&self) {
        if let Some(a) = self.audio.lock().unwrap().take() {
            a.quit.store(true, Ordering::SeqCst);
            a.pause.set(false);
            if let Some(raw) = &a.raw_fifo {
                raw.quit();
            }
            a.render_fifo.quit();
            if let Some(h) = a.decode_handle.lock().unwrap().take() {
                let _ = h.join();
            }
            if let Some(h) = a.render_handle.lock().unwrap().take() {
                let _ = h.join();
            }
            if let Some(raw) = &a.raw_fifo {
                self.drain_and_free_raw(raw);
            }
        }
        if let Some(v) = self.video.lock().unwrap().take() {
            v.quit.store(true, Ordering::SeqCst);
            v.pause.set(false);
            if let Some(raw) = &v.raw_fifo {
                raw.quit();
            }
            v.render_fifo.quit();
            if let Some(h) = v.decode_handle.lock().unwrap().take() {
                let _ = h.join();
            }
            if let Some(h) = v.render_handle.lock().unwrap().take() {
                let _ = h.join();
            }
            if let Some(raw) = &v.raw_fifo {
                self.drain_and_free_raw(raw);
            }
        }
        self.audio_clock_ms.store(0, Ordering::SeqCst);
        debug!("avrender reset: streams torn down");
    }

    pub fn close(&self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testdouble::{NullAudioDecoder, NullVideoDecoder, RecordingAudioRender, RecordingVideoRender};
    use crate::scheduler::DefaultThreadSizing;
    use device_protocol::{AudioCodec, VideoCodec};
    use std::sync::atomic::AtomicU32 as StdAtomicU32;
    use std::time::Duration;

    fn default_scheduler() -> Arc<dyn ThreadSizing> {
        Arc::new(DefaultThreadSizing)
    }

    fn audio_cfg() -> AvRenderConfig {
        AvRenderConfig {
            sync_mode: SyncMode::FollowAudio,
            raw_fifo_len: 0,
            render_fifo_len: 1 << 16,
            quit_when_eos: false,
            allow_drop_data: false,
            pause_render_only: false,
            pause_on_first_frame: false,
        }
    }

    #[test]
    fn render_pts_is_monotonic_then_resets_on_flush() {
        let av = AVRender::open(audio_cfg(), default_scheduler());
        let frame_info = AudioFrameInfo {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            samples: 320,
        };
        av.add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            0,
            1 << 16,
        )
        .unwrap();

        for _ in 0..5 {
            av.add_audio_data(vec![0u8; 640], 0, false).unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));
        let pts_before = av.get_render_pts();
        assert!(pts_before > 0);

        av.flush();
        assert_eq!(av.get_render_pts(), 0);
        av.reset();
    }

    #[test]
    fn eos_emits_exactly_once() {
        let av = AVRender::open(audio_cfg(), default_scheduler());
        let frame_info = AudioFrameInfo {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            samples: 320,
        };
        let eos_count = Arc::new(StdAtomicU32::new(0));
        let counter = eos_count.clone();
        av.set_event_cb(Arc::new(move |ev| {
            if matches!(ev, AvEvent::AudioEos) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        av.add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            0,
            1 << 16,
        )
        .unwrap();
        av.add_audio_data(vec![0u8; 640], 0, false).unwrap();
        av.add_audio_data(Vec::new(), 0, true).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(eos_count.load(Ordering::SeqCst), 1);
        av.reset();
    }

    #[test]
    fn data_pool_buffer_is_freed_exactly_once() {
        let av = AVRender::open(audio_cfg(), default_scheduler());
        let frame_info = AudioFrameInfo {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            samples: 320,
        };
        let free_count = Arc::new(StdAtomicU32::new(0));
        let counter = free_count.clone();
        av.use_data_pool(Arc::new(move |_buf| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        av.add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            0,
            1 << 16,
        )
        .unwrap();
        av.add_audio_data(vec![0u8; 640], 0, false).unwrap();
        assert_eq!(free_count.load(Ordering::SeqCst), 1);
        av.reset();
    }

    #[test]
    fn pool_buffer_on_raw_fifo_path_is_freed_once_decode_consumes_it() {
        let av = AVRender::open(audio_cfg(), default_scheduler());
        let frame_info = AudioFrameInfo {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            samples: 320,
        };
        let free_count = Arc::new(StdAtomicU32::new(0));
        let counter = free_count.clone();
        av.use_data_pool(Arc::new(move |_buf| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        av.add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            1 << 16,
            1 << 16,
        )
        .unwrap();
        for _ in 0..5 {
            av.add_audio_data(vec![0u8; 640], 0, false).unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));
        av.reset();
        assert_eq!(free_count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn pause_twice_is_idempotent() {
        let av = AVRender::open(audio_cfg(), default_scheduler());
        let frame_info = AudioFrameInfo {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
            samples: 320,
        };
        av.add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            0,
            1 << 16,
        )
        .unwrap();
        av.pause(true);
        av.pause(true);
        av.pause(false);
        av.reset();
    }

    #[test]
    fn video_frames_render_in_pts_order() {
        let mut cfg = audio_cfg();
        cfg.sync_mode = SyncMode::None;
        let av = AVRender::open(cfg, default_scheduler());
        let frame_info = VideoFrameInfo {
            codec: VideoCodec::Rgb565,
            width: 4,
            height: 4,
        };
        av.add_video_stream(
            Box::new(NullVideoDecoder::new(frame_info)),
            Box::new(RecordingVideoRender::new()),
            frame_info,
            0,
            1 << 16,
        )
        .unwrap();
        av.add_video_data(vec![0u8; 32], 0, false).unwrap();
        av.add_video_data(vec![0u8; 32], 33, false).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        av.reset();
        let _ = AudioCodec::Opus;
    }
}
