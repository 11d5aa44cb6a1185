//! Glue (§4.8): drives the peer's protocol tick, pumps capture frames to
//! the peer, dispatches inbound frames into AVRender, and owns the
//! reconnect policy. The only place in this crate that runs on `tokio`
//! instead of `std::thread`, since the peer/signaling contracts are async.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use device_protocol::{
    AudioFrameInfo, CoreResult, FrameKind, IceServerInfo, SignalingMessage, VideoFrameInfo,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::avrender::AVRender;
use crate::capture::Capture;
use crate::media::{AudioDecoder, AudioRender, VideoDecoder, VideoRender};
use crate::scheduler::ThreadSizing;
use device_protocol::WebRtcConfig;

use super::peer::{DataChannelState, PeerCallbacks, PeerConnection};
use super::signaling::{Signaling, SignalingCallbacks, SignalingConfig};

/// Builds the decode/render pair for a stream the first time its codec
/// info arrives from the peer (§4.8: "configured with a corresponding
/// decode stream").
pub type AudioStreamFactory =
    Arc<dyn Fn(u32, u8, u8) -> (Box<dyn AudioDecoder>, Box<dyn AudioRender>) + Send + Sync>;
pub type VideoStreamFactory =
    Arc<dyn Fn(u16, u16) -> (Box<dyn VideoDecoder>, Box<dyn VideoRender>) + Send + Sync>;

/// Everything the orchestrator needs beyond the peer/signaling pair and
/// the capture/render pipelines it glues together.
pub struct OrchestratorConfig {
    pub webrtc: WebRtcConfig,
    pub session_id: String,
    pub video_over_data_channel: bool,
    pub audio_stream_factory: Option<AudioStreamFactory>,
    pub video_stream_factory: Option<VideoStreamFactory>,
    pub custom_data_handler: Option<Arc<dyn Fn(Vec<u8>) + Send + Sync>>,
}

struct Shared {
    capture: Arc<Capture>,
    avrender: Arc<AVRender>,
    audio_configured: AtomicBool,
    video_configured: AtomicBool,
}

/// Drives one peer/signaling pair end to end: PC loop, send loop, and the
/// receive-callback fan-out into AVRender.
pub struct WebRTCOrchestrator {
    peer: Arc<AsyncMutex<Box<dyn PeerConnection>>>,
    signaling: Arc<AsyncMutex<Box<dyn Signaling>>>,
    shared: Arc<Shared>,
    cfg: WebRtcConfig,
    video_over_data_channel: bool,
    scheduler: Arc<dyn ThreadSizing>,
    quit: Arc<AtomicBool>,
    pc_paused: Arc<AtomicBool>,
    send_running: Arc<AtomicBool>,
    pending_connect: Arc<AtomicBool>,
    /// ICE info that arrived while `pending_connect` was set, delivered to
    /// the peer once `connect` is called (§4.8 ICE info resolution).
    stashed_ice: Arc<StdMutex<Option<Vec<IceServerInfo>>>>,
    reconnect_on_bye: bool,
    pc_handle: StdMutex<Option<JoinHandle<()>>>,
    send_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl WebRTCOrchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        capture: Arc<Capture>,
        avrender: Arc<AVRender>,
        peer: Box<dyn PeerConnection>,
        signaling: Box<dyn Signaling>,
        scheduler: Arc<dyn ThreadSizing>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            capture,
            avrender,
            audio_configured: AtomicBool::new(false),
            video_configured: AtomicBool::new(false),
        });

        let orchestrator = Arc::new(Self {
            peer: Arc::new(AsyncMutex::new(peer)),
            signaling: Arc::new(AsyncMutex::new(signaling)),
            shared,
            cfg: cfg.webrtc,
            video_over_data_channel: cfg.video_over_data_channel,
            scheduler,
            quit: Arc::new(AtomicBool::new(false)),
            pc_paused: Arc::new(AtomicBool::new(false)),
            send_running: Arc::new(AtomicBool::new(false)),
            pending_connect: Arc::new(AtomicBool::new(true)),
            stashed_ice: Arc::new(StdMutex::new(None)),
            reconnect_on_bye: cfg.webrtc.reconnect_on_bye,
            pc_handle: StdMutex::new(None),
            send_handle: StdMutex::new(None),
        });
        orchestrator.wire_callbacks(cfg.session_id, cfg.audio_stream_factory, cfg.video_stream_factory, cfg.custom_data_handler);
        orchestrator
    }

    fn wire_callbacks(
        self: &Arc<Self>,
        session_id: String,
        audio_factory: Option<AudioStreamFactory>,
        video_factory: Option<VideoStreamFactory>,
        custom_data_handler: Option<Arc<dyn Fn(Vec<u8>) + Send + Sync>>,
    ) {
        let shared = self.shared.clone();
        let this_for_state = self.clone();
        let video_over_dc = self.video_over_data_channel;

        let on_state = Arc::new(move |state: device_protocol::PeerState| {
            info!(?state, "peer state changed");
            if matches!(state, device_protocol::PeerState::Disconnected) && this_for_state.reconnect_on_bye {
                let this = this_for_state.clone();
                tokio::spawn(async move {
                    this.reconnect().await;
                });
            }
        });

        let shared_audio = shared.clone();
        let on_audio_info = Arc::new(move |sample_rate: u32, channels: u8, bits: u8| {
            if shared_audio.audio_configured.swap(true, Ordering::SeqCst) {
                return;
            }
            let Some(factory) = audio_factory.as_ref() else {
                warn!("audio_info received but no audio stream factory configured");
                return;
            };
            let (decoder, render) = factory(sample_rate, channels, bits);
            let frame_info = AudioFrameInfo {
                sample_rate,
                channels,
                bits_per_sample: bits,
                samples: 0,
            };
            if let Err(e) = shared_audio.avrender.add_audio_stream(decoder, render, frame_info, 32, 32) {
                warn!("failed to configure audio stream from peer: {e}");
            }
        });

        let shared_video = shared.clone();
        let on_video_info = Arc::new(move |width: u16, height: u16| {
            if shared_video.video_configured.swap(true, Ordering::SeqCst) {
                return;
            }
            let Some(factory) = video_factory.as_ref() else {
                warn!("video_info received but no video stream factory configured");
                return;
            };
            let (decoder, render) = factory(width, height);
            let frame_info = VideoFrameInfo {
                codec: device_protocol::VideoCodec::Rgb565,
                width,
                height,
            };
            if let Err(e) = shared_video.avrender.add_video_stream(decoder, render, frame_info, 8, 8) {
                warn!("failed to configure video stream from peer: {e}");
            }
        });

        let shared_audio_data = shared.clone();
        let on_audio_data = Arc::new(move |frame: device_protocol::StreamFrame| {
            let data = frame.data.clone().unwrap_or_default();
            let _ = shared_audio_data.avrender.add_audio_data(data, frame.pts, frame.eos);
        });

        let shared_video_data = shared.clone();
        let on_video_data = Arc::new(move |frame: device_protocol::StreamFrame| {
            let data = frame.data.clone().unwrap_or_default();
            let _ = shared_video_data.avrender.add_video_data(data, frame.pts, frame.eos);
        });

        let shared_data_video = shared.clone();
        let on_data = Arc::new(move |bytes: Vec<u8>| {
            if video_over_dc {
                let _ = shared_data_video.avrender.add_video_data(bytes, 0, false);
            } else if let Some(handler) = custom_data_handler.as_ref() {
                handler(bytes);
            }
        });

        let on_data_channel = Arc::new(|state: DataChannelState| {
            debug!(?state, "data channel state changed");
        });

        let peer = self.peer.clone();
        tokio::spawn(async move {
            peer.lock().await.set_callbacks(PeerCallbacks {
                on_state: Some(on_state),
                on_data_channel: Some(on_data_channel),
                on_msg: None,
                on_video_info: Some(on_video_info),
                on_audio_info: Some(on_audio_info),
                on_video_data: Some(on_video_data),
                on_audio_data: Some(on_audio_data),
                on_data: Some(on_data),
            });
        });

        let signaling = self.signaling.clone();
        let this_for_bye = self.clone();
        let reconnect_on_bye = self.reconnect_on_bye;
        let pending_connect = self.pending_connect.clone();
        let peer_for_ice = self.peer.clone();
        let stashed_ice = self.stashed_ice.clone();
        tokio::spawn(async move {
            signaling
                .lock()
                .await
                .start(
                    SignalingConfig { session_id },
                    SignalingCallbacks {
                        on_message: Some(Arc::new(move |msg| {
                            if matches!(msg, SignalingMessage::Bye) && reconnect_on_bye {
                                let this = this_for_bye.clone();
                                tokio::spawn(async move {
                                    this.reconnect().await;
                                });
                            }
                        })),
                        on_ice_info: Some(Arc::new(move |servers| {
                            if pending_connect.load(Ordering::SeqCst) {
                                debug!("ICE info arrived while pending_connect; stashing");
                                *stashed_ice.lock().unwrap() = Some(servers);
                                return;
                            }
                            let peer = peer_for_ice.clone();
                            tokio::spawn(async move {
                                let _ = peer.lock().await.update_ice_info(servers).await;
                            });
                        })),
                    },
                )
                .await;
        });
    }

    /// Opens the peer, starts the PC and send loop tasks. Connection is
    /// not requested yet (`pending_connect` stays set) until [`Self::connect`].
    pub async fn start(&self) -> CoreResult<()> {
        self.peer.lock().await.open().await?;
        self.spawn_pc_loop();
        self.spawn_send_loop();
        Ok(())
    }

    /// Requests the peer create a new connection, clearing `pending_connect`
    /// and flushing any ICE info that arrived while it was set.
    pub async fn connect(&self) -> CoreResult<()> {
        self.pending_connect.store(false, Ordering::SeqCst);
        if let Some(servers) = self.stashed_ice.lock().unwrap().take() {
            self.peer.lock().await.update_ice_info(servers).await?;
        }
        self.peer.lock().await.new_connection().await
    }

    fn spawn_pc_loop(&self) {
        if let Some(hint) = self.scheduler.size_for("pc_task") {
            debug!(?hint, "pc_task sizing hint");
        }
        let peer = self.peer.clone();
        let quit = self.quit.clone();
        let paused = self.pc_paused.clone();
        let handle = tokio::spawn(async move {
            while !quit.load(Ordering::SeqCst) {
                if !paused.load(Ordering::SeqCst) {
                    if let Err(e) = peer.lock().await.main_loop().await {
                        warn!("pc main_loop tick failed: {e}");
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
        *self.pc_handle.lock().unwrap() = Some(handle);
    }

    fn spawn_send_loop(&self) {
        if let Some(hint) = self.scheduler.size_for("pc_send") {
            debug!(?hint, "pc_send sizing hint");
        }
        let peer = self.peer.clone();
        let shared = self.shared.clone();
        let quit = self.quit.clone();
        let running = self.send_running.clone();
        let interval = Duration::from_millis(self.cfg.send_interval_ms);
        let video_over_dc = self.video_over_data_channel;
        running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            while !quit.load(Ordering::SeqCst) && running.load(Ordering::SeqCst) {
                while let Ok(Some(frame)) = shared.capture.acquire_path_frame(FrameKind::Audio, true) {
                    let is_eos = frame.is_eos_marker();
                    let _ = peer.lock().await.send_audio(frame).await;
                    let _ = shared.capture.release_path_frame(FrameKind::Audio);
                    if is_eos {
                        return;
                    }
                }
                if let Ok(Some(frame)) = shared.capture.acquire_path_frame(FrameKind::Video, true) {
                    let is_eos = frame.is_eos_marker();
                    if video_over_dc {
                        let bytes = frame.data.unwrap_or_default();
                        let _ = peer.lock().await.send_data(bytes).await;
                    } else {
                        let _ = peer.lock().await.send_video(frame).await;
                    }
                    let _ = shared.capture.release_path_frame(FrameKind::Video);
                    if is_eos {
                        return;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
        *self.send_handle.lock().unwrap() = Some(handle);
    }

    pub async fn disconnect(&self) -> CoreResult<()> {
        self.peer.lock().await.disconnect().await
    }

    pub async fn close(&self) -> CoreResult<()> {
        self.quit.store(true, Ordering::SeqCst);
        self.send_running.store(false, Ordering::SeqCst);
        if let Some(h) = self.pc_handle.lock().unwrap().take() {
            h.abort();
        }
        if let Some(h) = self.send_handle.lock().unwrap().take() {
            h.abort();
        }
        self.signaling.lock().await.stop().await?;
        self.peer.lock().await.close().await
    }

    /// Reconnect policy (§4.8, §9 BYE resolution): pause the PC loop, clear
    /// both stream codec-info entries and reset the renderer, request a new
    /// connection, then respawn the send loop (the old task already exited
    /// when `send_running` went false) and resume.
    async fn reconnect(self: Arc<Self>) {
        info!("reconnect policy triggered");
        self.pc_paused.store(true, Ordering::SeqCst);
        self.send_running.store(false, Ordering::SeqCst);
        self.shared.audio_configured.store(false, Ordering::SeqCst);
        self.shared.video_configured.store(false, Ordering::SeqCst);
        self.shared.avrender.reset();
        let result = self.peer.lock().await.new_connection().await;
        if let Err(e) = result {
            warn!("reconnect's new_connection failed: {e}");
        }
        self.spawn_send_loop();
        self.pc_paused.store(false, Ordering::SeqCst);
    }
}
