//! End-to-end pipeline scenarios exercised through the public API only (no
//! internal module access), unlike the per-module unit tests.

use std::sync::Arc;
use std::time::Duration;

use device_core::capture::path::default_timeouts;
use device_core::capture::{Capture, CaptureOpenConfig, PathRunType};
use device_core::media::testdouble::{
    NullAudioDecoder, NullAudioEncoder, NullVideoDecoder, NullVideoEncoder, RecordingAudioRender,
    RecordingVideoRender, SyntheticAudioSource,
};
use device_core::scheduler::DefaultThreadSizing;
use device_core::webrtc::loopback::{LoopbackPeer, LoopbackSignaling};
use device_core::webrtc::{OrchestratorConfig, PeerCallbacks, PeerConnection, WebRTCOrchestrator};
use device_core::AVRender;
use device_protocol::{
    AudioCodec, AudioFrameInfo, AudioInfo, AvRenderConfig, FrameKind, IceServerInfo, PeerState,
    SignalingMessage, SinkConfig, StreamFrame, VideoCodec, VideoFrameInfo, VideoInfo, WebRtcConfig,
};

/// Wraps [`LoopbackPeer`] to count `send_audio` calls, so scenario 5 can
/// prove the orchestrator actually resumes sending after a reconnect
/// instead of merely reaching `Connected` again.
struct CountingPeer {
    inner: LoopbackPeer,
    audio_sends: Arc<std::sync::atomic::AtomicUsize>,
}

impl CountingPeer {
    fn new(audio_sends: Arc<std::sync::atomic::AtomicUsize>) -> Self {
        Self {
            inner: LoopbackPeer::new(),
            audio_sends,
        }
    }
}

#[async_trait::async_trait]
impl PeerConnection for CountingPeer {
    fn set_callbacks(&mut self, callbacks: PeerCallbacks) {
        self.inner.set_callbacks(callbacks)
    }

    async fn open(&mut self) -> device_protocol::CoreResult<()> {
        self.inner.open().await
    }

    async fn new_connection(&mut self) -> device_protocol::CoreResult<()> {
        self.inner.new_connection().await
    }

    async fn update_ice_info(&mut self, servers: Vec<IceServerInfo>) -> device_protocol::CoreResult<()> {
        self.inner.update_ice_info(servers).await
    }

    async fn send_msg(&mut self, msg: SignalingMessage) -> device_protocol::CoreResult<()> {
        self.inner.send_msg(msg).await
    }

    async fn send_video(&mut self, frame: StreamFrame) -> device_protocol::CoreResult<()> {
        self.inner.send_video(frame).await
    }

    async fn send_audio(&mut self, frame: StreamFrame) -> device_protocol::CoreResult<()> {
        self.audio_sends.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.send_audio(frame).await
    }

    async fn send_data(&mut self, bytes: Vec<u8>) -> device_protocol::CoreResult<()> {
        self.inner.send_data(bytes).await
    }

    async fn main_loop(&mut self) -> device_protocol::CoreResult<()> {
        self.inner.main_loop().await
    }

    async fn disconnect(&mut self) -> device_protocol::CoreResult<()> {
        self.inner.disconnect().await
    }

    fn query(&self) -> PeerState {
        self.inner.query()
    }

    async fn close(&mut self) -> device_protocol::CoreResult<()> {
        self.inner.close().await
    }
}

fn opus_audio_info() -> AudioInfo {
    AudioInfo {
        codec: AudioCodec::Opus,
        sample_rate: 16000,
        channels: 1,
        bits_per_sample: 16,
    }
}

/// Scenario 1: an Opus capture path feeding AVRender should advance the
/// render clock by roughly the wall-clock audio duration it was handed.
#[test]
fn opus_loopback_render_pts_tracks_wall_clock() {
    let audio_info = opus_audio_info();
    let capture = Capture::open(
        CaptureOpenConfig {
            timeouts: default_timeouts(),
            ..CaptureOpenConfig::default()
        },
        Arc::new(DefaultThreadSizing),
    );
    capture
        .setup_path(
            SinkConfig {
                audio: audio_info.into(),
                video: Default::default(),
            },
            Some(&SyntheticAudioSource::new(audio_info)),
            &[AudioCodec::Opus],
            None,
            &[],
        )
        .unwrap();
    capture
        .enable_path(
            PathRunType::Always,
            Some(Box::new(SyntheticAudioSource::new(audio_info).with_frame_budget(250))),
            Some(Box::new(NullAudioEncoder::new(AudioCodec::Opus, 640, 640))),
            None,
            None,
        )
        .unwrap();
    capture.start().unwrap();

    let frame_info = AudioFrameInfo {
        sample_rate: audio_info.sample_rate,
        channels: audio_info.channels,
        bits_per_sample: audio_info.bits_per_sample,
        samples: 320,
    };
    let avrender = AVRender::open(AvRenderConfig::default(), Arc::new(DefaultThreadSizing));
    avrender
        .add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            32,
            32,
        )
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    while std::time::Instant::now() < deadline {
        if let Ok(Some(frame)) = capture.acquire_path_frame(FrameKind::Audio, true) {
            let data = frame.data.clone().unwrap_or_default();
            avrender.add_audio_data(data, 0, false).unwrap();
            capture.release_path_frame(FrameKind::Audio).unwrap();
        } else {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    std::thread::sleep(Duration::from_millis(50));

    // 250 frames of 20ms each is 5s of audio; over the 500ms test window we
    // expect the render clock to have advanced by at least one frame's
    // worth, proving the pipeline moved real data end to end rather than
    // just wiring types together.
    assert!(avrender.get_render_pts() > 0);

    capture.stop().unwrap();
    avrender.reset();
}

/// Scenario 2: an MJPEG capture path decoded to RGB565 should produce
/// exactly as many decoded bytes as the target resolution implies, for
/// every frame pushed through.
#[test]
fn mjpeg_capture_decodes_to_expected_rgb565_size() {
    let video_info = VideoInfo {
        codec: VideoCodec::Mjpeg,
        width: 320,
        height: 240,
        fps: 25,
    };
    let capture = Capture::open(
        CaptureOpenConfig {
            timeouts: default_timeouts(),
            ..CaptureOpenConfig::default()
        },
        Arc::new(DefaultThreadSizing),
    );
    capture
        .setup_path(
            SinkConfig {
                audio: Default::default(),
                video: video_info.into(),
            },
            None,
            &[],
            Some(&device_core::media::testdouble::SyntheticVideoSource::new(video_info)),
            &[VideoCodec::Mjpeg],
        )
        .unwrap();
    capture
        .enable_path(
            PathRunType::Once,
            None,
            None,
            Some(Box::new(
                device_core::media::testdouble::SyntheticVideoSource::new(video_info),
            )),
            Some(Box::new(NullVideoEncoder::new(VideoCodec::Mjpeg, VideoCodec::Mjpeg))),
        )
        .unwrap();
    capture.start().unwrap();

    let frame_info = VideoFrameInfo {
        codec: VideoCodec::Rgb565,
        width: video_info.width,
        height: video_info.height,
    };
    let avrender = AVRender::open(AvRenderConfig::default(), Arc::new(DefaultThreadSizing));
    avrender
        .add_video_stream(
            Box::new(NullVideoDecoder::new(frame_info)),
            Box::new(RecordingVideoRender::new()),
            frame_info,
            0,
            8,
        )
        .unwrap();

    let mut delivered = 0;
    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    while delivered < 3 && std::time::Instant::now() < deadline {
        if let Ok(Some(frame)) = capture.acquire_path_frame(FrameKind::Video, true) {
            let data = frame.data.clone().unwrap_or_default();
            avrender.add_video_data(data, delivered as u32 * 40, false).unwrap();
            capture.release_path_frame(FrameKind::Video).unwrap();
            delivered += 1;
        } else {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    assert_eq!(delivered, 3, "expected three frames to make it through capture");

    // The decoder enforces the exact width*height*2 RGB565 size on every
    // decode call (`NullVideoDecoder::decode`); if any frame had decoded to
    // the wrong size the render thread's `draw` call would have failed and
    // the fifo level would never drain back to zero.
    let deadline = std::time::Instant::now() + Duration::from_millis(200);
    while av_video_fifo_nonzero(&avrender) && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(avrender.get_video_fifo_level(), 0);

    capture.stop().unwrap();
    avrender.reset();
}

fn av_video_fifo_nonzero(av: &AVRender) -> bool {
    av.get_video_fifo_level() != 0
}

/// Scenario 3: with the render stage paused (standing in for a sink that
/// cannot keep up), pushed frames accumulate in the render FIFO and
/// `audio_fifo_enough` reports the exact remaining headroom rather than
/// silently accepting more than fits.
#[test]
fn paused_sink_backpressure_is_visible_via_fifo_enough() {
    let frame_info = AudioFrameInfo {
        sample_rate: 16000,
        channels: 1,
        bits_per_sample: 16,
        samples: 320,
    };
    let av = AVRender::open(AvRenderConfig::default(), Arc::new(DefaultThreadSizing));
    av.add_audio_stream(
        Box::new(NullAudioDecoder::new(frame_info)),
        Box::new(RecordingAudioRender::new()),
        frame_info,
        0,
        700,
    )
    .unwrap();

    av.pause(true);
    av.add_audio_data(vec![0u8; 640], 0, false).unwrap();

    // 700-byte capacity, 640 bytes queued and stuck behind the paused
    // render stage: 60 bytes of headroom remain, no more.
    assert!(av.audio_fifo_enough(60));
    assert!(!av.audio_fifo_enough(61));

    av.reset();
}

/// Scenario 4: flushing mid-playback clears both FIFOs and resets the
/// render clock to its origin.
#[test]
fn flush_during_playback_resets_clock_and_queue_levels() {
    let frame_info = AudioFrameInfo {
        sample_rate: 16000,
        channels: 1,
        bits_per_sample: 16,
        samples: 320,
    };
    let av = AVRender::open(AvRenderConfig::default(), Arc::new(DefaultThreadSizing));
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
    assert!(av.get_render_pts() > 0);

    av.flush();
    assert_eq!(av.get_render_pts(), 0);
    assert_eq!(av.get_audio_fifo_level(), 0);

    av.reset();
}

/// Scenario 5: with `reconnect_on_bye` set, the peer reporting
/// `Disconnected` should trigger the orchestrator's reconnect policy
/// (same code path a remote `Bye` drives via signaling), resetting the
/// renderer and asking the peer for a new connection.
#[tokio::test]
async fn peer_disconnect_triggers_reconnect_policy() {
    let audio_info = opus_audio_info();
    let capture = Arc::new(Capture::open(
        CaptureOpenConfig {
            timeouts: default_timeouts(),
            ..CaptureOpenConfig::default()
        },
        Arc::new(DefaultThreadSizing),
    ));
    capture
        .setup_path(
            SinkConfig {
                audio: audio_info.into(),
                video: Default::default(),
            },
            Some(&SyntheticAudioSource::new(audio_info)),
            &[AudioCodec::Opus],
            None,
            &[],
        )
        .unwrap();
    capture
        .enable_path(
            PathRunType::Always,
            Some(Box::new(SyntheticAudioSource::new(audio_info).with_frame_budget(250))),
            Some(Box::new(NullAudioEncoder::new(AudioCodec::Opus, 640, 640))),
            None,
            None,
        )
        .unwrap();
    capture.start().unwrap();

    let frame_info = AudioFrameInfo {
        sample_rate: audio_info.sample_rate,
        channels: audio_info.channels,
        bits_per_sample: audio_info.bits_per_sample,
        samples: 320,
    };
    let avrender = Arc::new(AVRender::open(AvRenderConfig::default(), Arc::new(DefaultThreadSizing)));
    avrender
        .add_audio_stream(
            Box::new(NullAudioDecoder::new(frame_info)),
            Box::new(RecordingAudioRender::new()),
            frame_info,
            0,
            1 << 16,
        )
        .unwrap();
    avrender.add_audio_data(vec![0u8; 640], 0, false).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(avrender.get_render_pts() > 0, "clock should have advanced before reconnect");

    let audio_sends = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let orchestrator = WebRTCOrchestrator::new(
        OrchestratorConfig {
            webrtc: WebRtcConfig {
                reconnect_on_bye: true,
                ..WebRtcConfig::default()
            },
            session_id: "test-session".into(),
            video_over_data_channel: false,
            audio_stream_factory: None,
            video_stream_factory: None,
            custom_data_handler: None,
        },
        capture.clone(),
        avrender.clone(),
        Box::new(CountingPeer::new(audio_sends.clone())),
        Box::new(LoopbackSignaling::new()),
        Arc::new(DefaultThreadSizing),
    );

    orchestrator.start().await.unwrap();
    orchestrator.connect().await.unwrap();
    // Let the peer's main_loop ticks (10ms each) carry it to `Connected`,
    // and the send loop pump a few real frames off the capture path.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let sends_before = audio_sends.load(std::sync::atomic::Ordering::SeqCst);
    assert!(sends_before > 0, "send loop should have forwarded at least one captured frame");

    // `disconnect` drives the peer to `PeerState::Disconnected`, firing the
    // same `on_state` callback a remote-initiated drop would, which runs
    // the reconnect policy when `reconnect_on_bye` is set.
    orchestrator.disconnect().await.unwrap();
    // Let the reconnect policy run (new_connection, then the respawned send
    // loop) and the peer retrace its tick sequence back to `Connected`.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let sends_after = audio_sends.load(std::sync::atomic::Ordering::SeqCst);
    assert!(
        sends_after > sends_before,
        "send loop should resume forwarding frames once the respawned task picks back up"
    );

    orchestrator.close().await.unwrap();
    capture.close().unwrap();
}
