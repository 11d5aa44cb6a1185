//! Pure arithmetic for the three synchronization rules AVRender can run
//! under (§4.7). Kept free of any locking/threading so it can be unit
//! tested in isolation.

use device_protocol::SyncMode;
use std::time::Duration;

/// Converts a rendered sample count into milliseconds of played-out audio.
pub fn samples_to_ms(samples: u64, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    ((samples * 1000) / sample_rate as u64) as u32
}

/// Decision a video stream makes about one decoded frame given the current
/// master clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    RenderNow,
    /// Wait this long before rendering (re-check afterwards).
    WaitThen,
    Drop,
}

/// One video frame interval, used as the FollowAudio drop threshold.
pub fn frame_interval_ms(fps: u8) -> u32 {
    if fps == 0 {
        return 0;
    }
    1000 / fps as u32
}

/// Decides what a video stream should do with a frame at `frame_pts_ms`
/// given the master clock's current position.
pub fn decide(
    mode: SyncMode,
    frame_pts_ms: u32,
    master_clock_ms: u32,
    fps: u8,
    allow_drop_data: bool,
) -> SyncDecision {
    match mode {
        SyncMode::None => SyncDecision::RenderNow,
        SyncMode::FollowAudio | SyncMode::FollowTime => {
            if frame_pts_ms <= master_clock_ms {
                if should_drop_late_frame(frame_pts_ms, master_clock_ms, fps, allow_drop_data) {
                    SyncDecision::Drop
                } else {
                    SyncDecision::RenderNow
                }
            } else {
                SyncDecision::WaitThen
            }
        }
    }
}

/// Whether a frame this far behind the master clock should be dropped
/// instead of rendered (used once a decision has already chosen to wait and
/// the wait elapsed with the clock now further ahead).
pub fn should_drop_late_frame(
    frame_pts_ms: u32,
    master_clock_ms: u32,
    fps: u8,
    allow_drop_data: bool,
) -> bool {
    allow_drop_data
        && master_clock_ms.saturating_sub(frame_pts_ms) > frame_interval_ms(fps)
}

/// Time to sleep before re-checking a frame that isn't due yet.
pub fn wait_duration(frame_pts_ms: u32, master_clock_ms: u32) -> Duration {
    Duration::from_millis(frame_pts_ms.saturating_sub(master_clock_ms) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_to_ms_basic() {
        assert_eq!(samples_to_ms(16000, 16000), 1000);
        assert_eq!(samples_to_ms(8000, 16000), 500);
    }

    #[test]
    fn frame_interval_for_25fps() {
        assert_eq!(frame_interval_ms(25), 40);
    }

    #[test]
    fn drop_only_when_sufficiently_late_and_allowed() {
        assert!(should_drop_late_frame(0, 200, 25, true));
        assert!(!should_drop_late_frame(0, 200, 25, false));
        assert!(!should_drop_late_frame(190, 200, 25, true));
    }

    #[test]
    fn none_mode_always_renders_now() {
        assert_eq!(decide(SyncMode::None, 5000, 0, 25, false), SyncDecision::RenderNow);
    }

    #[test]
    fn follow_audio_drops_a_frame_far_behind_the_clock_when_allowed() {
        assert_eq!(
            decide(SyncMode::FollowAudio, 0, 200, 25, true),
            SyncDecision::Drop
        );
        assert_eq!(
            decide(SyncMode::FollowAudio, 0, 200, 25, false),
            SyncDecision::RenderNow
        );
        assert_eq!(
            decide(SyncMode::FollowAudio, 190, 200, 25, true),
            SyncDecision::RenderNow
        );
    }
}
