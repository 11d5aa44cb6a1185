//! `device-agent`: wires synthetic capture/render stand-ins and the
//! in-memory loopback peer together into a runnable pipeline. Real
//! hardware/codec backends and a real signaling transport are out of
//! scope (§1); this binary exists to exercise the library end to end.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use device_core::capture::path::default_timeouts;
use device_core::capture::{Capture, CaptureOpenConfig, PathRunType};
use device_core::media::testdouble::{
    NullAudioDecoder, NullAudioEncoder, RecordingAudioRender, SyntheticAudioSource,
};
use device_core::scheduler::DefaultThreadSizing;
use device_core::webrtc::loopback::{LoopbackPeer, LoopbackSignaling};
use device_core::webrtc::{OrchestratorConfig, WebRTCOrchestrator};
use device_core::AVRender;
use device_protocol::{AgentMode, AudioCodec, AudioInfo, AvRenderConfig, SinkConfig, WebRtcConfig};
use tracing::info;

/// Runs the embedded audio/video pipeline against synthetic sources and an
/// in-memory loopback peer.
#[derive(Parser, Debug)]
#[command(name = "device-agent", version, about)]
struct Args {
    /// How the agent wires its backends.
    #[arg(long, value_enum, default_value = "loopback")]
    mode: CliAgentMode,

    /// How long to run before shutting down, in seconds.
    #[arg(long, default_value_t = 5)]
    run_seconds: u64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliAgentMode {
    Loopback,
    Remote,
}

impl From<CliAgentMode> for AgentMode {
    fn from(v: CliAgentMode) -> Self {
        match v {
            CliAgentMode::Loopback => AgentMode::Loopback,
            CliAgentMode::Remote => AgentMode::Remote,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mode: AgentMode = args.mode.into();
    if !matches!(mode, AgentMode::Loopback) {
        anyhow::bail!("only --mode loopback is implemented by this demo binary");
    }
    info!(run_seconds = args.run_seconds, "starting device-agent (loopback mode)");

    let audio_info = AudioInfo {
        codec: AudioCodec::Opus,
        sample_rate: 16000,
        channels: 1,
        bits_per_sample: 16,
    };

    let scheduler = Arc::new(DefaultThreadSizing);
    let capture = Arc::new(Capture::open(
        CaptureOpenConfig {
            timeouts: default_timeouts(),
            ..CaptureOpenConfig::default()
        },
        scheduler.clone(),
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
        .context("setup_path failed")?;
    capture
        .enable_path(
            PathRunType::Always,
            Some(Box::new(SyntheticAudioSource::new(audio_info))),
            Some(Box::new(NullAudioEncoder::new(AudioCodec::Opus, 640, 640))),
            None,
            None,
        )
        .context("enable_path failed")?;
    capture.start().context("capture start failed")?;

    let avrender = Arc::new(AVRender::open(AvRenderConfig::default(), scheduler.clone()));
    avrender.add_audio_stream(
        Box::new(NullAudioDecoder::new(device_protocol::AudioFrameInfo {
            sample_rate: audio_info.sample_rate,
            channels: audio_info.channels,
            bits_per_sample: audio_info.bits_per_sample,
            samples: 320,
        })),
        Box::new(RecordingAudioRender::new()),
        device_protocol::AudioFrameInfo {
            sample_rate: audio_info.sample_rate,
            channels: audio_info.channels,
            bits_per_sample: audio_info.bits_per_sample,
            samples: 320,
        },
        32,
        32,
    )?;

    let orchestrator = WebRTCOrchestrator::new(
        OrchestratorConfig {
            webrtc: WebRtcConfig::default(),
            session_id: "demo-session".into(),
            video_over_data_channel: false,
            audio_stream_factory: None,
            video_stream_factory: None,
            custom_data_handler: None,
        },
        capture.clone(),
        avrender.clone(),
        Box::new(LoopbackPeer::new()),
        Box::new(LoopbackSignaling::new()),
        scheduler,
    );

    orchestrator.start().await.context("orchestrator start failed")?;
    orchestrator.connect().await.context("orchestrator connect failed")?;

    tokio::time::sleep(Duration::from_secs(args.run_seconds)).await;

    info!(render_pts_ms = avrender.get_render_pts(), "shutting down");
    orchestrator.close().await.context("orchestrator close failed")?;
    capture.close().context("capture close failed")?;
    avrender.close();
    Ok(())
}
