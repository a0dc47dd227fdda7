use std::fmt;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::director::SceneToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Paused,
    Recording,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("cannot {operation} a capture that is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: CaptureState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub token: SceneToken,
    pub at: Duration,
    pub width: u32,
    pub height: u32,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames: usize,
    pub scenes: usize,
    pub span: Duration,
    /// Digest over every frame digest in recording order.
    pub digest: String,
}

/// Recording of a presentation, owned by whoever sequences the scenes.
/// Frames only land while recording; the session starts paused and is
/// resumed once the first scene has drawn.
///
/// Frames are folded into a running digest as they arrive, so a session
/// holds the same amount of memory however long it records. Scene tokens
/// are never reissued, which lets a token change count as a new scene.
pub struct CaptureSession {
    state: CaptureState,
    frames: usize,
    scenes: usize,
    last_token: Option<SceneToken>,
    first_at: Option<Duration>,
    last_frame: Option<CapturedFrame>,
    running: Sha256,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state)
            .field("frames", &self.frames)
            .field("scenes", &self.scenes)
            .field("last_frame", &self.last_frame)
            .finish()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            frames: 0,
            scenes: 0,
            last_token: None,
            first_at: None,
            last_frame: None,
            running: Sha256::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// The most recently recorded frame.
    pub fn last_frame(&self) -> Option<&CapturedFrame> {
        self.last_frame.as_ref()
    }

    pub fn arm(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Idle => {
                self.state = CaptureState::Paused;
                debug!("capture_armed");
                Ok(())
            }
            CaptureState::Paused => Ok(()),
            state => Err(CaptureError::InvalidTransition {
                operation: "arm",
                state,
            }),
        }
    }

    pub fn resume(&mut self, token: SceneToken) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Paused => {
                self.state = CaptureState::Recording;
                info!(token = %token, "capture_resumed");
                Ok(())
            }
            CaptureState::Recording => Ok(()),
            state => Err(CaptureError::InvalidTransition {
                operation: "resume",
                state,
            }),
        }
    }

    pub fn pause(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Recording => {
                self.state = CaptureState::Paused;
                debug!(frames = self.frames, "capture_paused");
                Ok(())
            }
            CaptureState::Paused => Ok(()),
            state => Err(CaptureError::InvalidTransition {
                operation: "pause",
                state,
            }),
        }
    }

    /// Records a frame while recording. Returns whether it was kept.
    pub fn append_frame(
        &mut self,
        token: SceneToken,
        at: Duration,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> bool {
        if self.state != CaptureState::Recording {
            return false;
        }
        let digest = Sha256::digest(rgba);
        self.running.update(&digest);
        self.frames += 1;
        if self.last_token != Some(token) {
            self.last_token = Some(token);
            self.scenes += 1;
        }
        self.first_at.get_or_insert(at);
        self.last_frame = Some(CapturedFrame {
            token,
            at,
            width,
            height,
            digest: to_hex_lower(&digest),
        });
        true
    }

    pub fn stop(&mut self) -> Result<CaptureSummary, CaptureError> {
        if self.state == CaptureState::Stopped {
            return Err(CaptureError::InvalidTransition {
                operation: "stop",
                state: self.state,
            });
        }
        self.state = CaptureState::Stopped;

        let span = match (self.first_at, &self.last_frame) {
            (Some(first), Some(last)) => last.at.saturating_sub(first),
            _ => Duration::ZERO,
        };
        let running = std::mem::take(&mut self.running);
        let summary = CaptureSummary {
            frames: self.frames,
            scenes: self.scenes,
            span,
            digest: to_hex_lower(&running.finalize()),
        };
        info!(
            frames = summary.frames,
            scenes = summary.scenes,
            span_ms = summary.span.as_millis() as u64,
            digest = summary.digest.as_str(),
            "capture_stopped"
        );
        Ok(summary)
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::SceneSlot;

    #[test]
    fn frames_are_dropped_until_resumed() {
        let mut slot = SceneSlot::new();
        let token = slot.issue();
        let mut session = CaptureSession::new();
        session.arm().expect("arm");
        assert!(!session.append_frame(token, Duration::ZERO, 1, 1, &[0, 0, 0, 255]));

        session.resume(token).expect("resume");
        assert!(session.append_frame(token, Duration::from_millis(16), 1, 1, &[0, 0, 0, 255]));
        assert_eq!(session.frame_count(), 1);
        let last = session.last_frame().expect("recorded");
        assert_eq!(last.digest.len(), 64);
        assert_eq!(last.at, Duration::from_millis(16));
    }

    #[test]
    fn summary_counts_scenes_and_span() {
        let mut slot = SceneSlot::new();
        let first = slot.issue();
        let second = slot.issue();
        let mut session = CaptureSession::new();
        session.arm().expect("arm");
        session.resume(first).expect("resume");
        session.append_frame(first, Duration::from_millis(100), 1, 1, &[1, 1, 1, 255]);
        session.pause().expect("pause");
        session.append_frame(first, Duration::from_millis(150), 1, 1, &[2, 2, 2, 255]);
        session.resume(second).expect("resume");
        session.append_frame(second, Duration::from_millis(900), 1, 1, &[3, 3, 3, 255]);

        let summary = session.stop().expect("stop");
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.scenes, 2);
        assert_eq!(summary.span, Duration::from_millis(800));
        assert_eq!(session.state(), CaptureState::Stopped);
    }

    #[test]
    fn identical_frames_share_a_digest() {
        let mut slot = SceneSlot::new();
        let token = slot.issue();
        let mut session = CaptureSession::new();
        session.arm().expect("arm");
        session.resume(token).expect("resume");
        let mut digests = Vec::new();
        for rgba in [[5u8; 8], [5; 8], [6; 8]] {
            session.append_frame(token, Duration::ZERO, 2, 1, &rgba);
            digests.push(session.last_frame().expect("recorded").digest.clone());
        }
        assert_eq!(digests[0], digests[1]);
        assert_ne!(digests[1], digests[2]);
    }

    fn record(frames: &[&[u8]]) -> CaptureSummary {
        let mut slot = SceneSlot::new();
        let token = slot.issue();
        let mut session = CaptureSession::new();
        session.arm().expect("arm");
        session.resume(token).expect("resume");
        for (index, rgba) in frames.iter().enumerate() {
            session.append_frame(token, Duration::from_millis(16 * index as u64), 1, 1, rgba);
        }
        session.stop().expect("stop")
    }

    #[test]
    fn running_digest_depends_on_content_and_order() {
        let red: &[u8] = &[255, 0, 0, 255];
        let blue: &[u8] = &[0, 0, 255, 255];

        let first = record(&[red, blue, red]);
        assert_eq!(first, record(&[red, blue, red]));
        assert_ne!(first.digest, record(&[blue, red, red]).digest);
        assert_eq!(first.frames, 3);
        assert_eq!(first.scenes, 1);
        assert_eq!(first.span, Duration::from_millis(32));
    }

    #[test]
    fn long_recordings_keep_only_the_last_frame() {
        let mut slot = SceneSlot::new();
        let token = slot.issue();
        let mut session = CaptureSession::new();
        session.arm().expect("arm");
        session.resume(token).expect("resume");
        for index in 0..10_000u32 {
            let rgba = index.to_le_bytes();
            session.append_frame(token, Duration::from_millis(u64::from(index)), 1, 1, &rgba);
        }
        assert_eq!(session.frame_count(), 10_000);
        assert_eq!(
            session.last_frame().map(|frame| frame.at),
            Some(Duration::from_millis(9_999))
        );
        let summary = session.stop().expect("stop");
        assert_eq!(summary.span, Duration::from_millis(9_999));
    }

    #[test]
    fn stopped_session_rejects_further_transitions() {
        let mut session = CaptureSession::new();
        session.stop().expect("stop from idle");
        assert!(session.stop().is_err());
        assert_eq!(
            session.arm(),
            Err(CaptureError::InvalidTransition {
                operation: "arm",
                state: CaptureState::Stopped
            })
        );
    }

    #[test]
    fn known_digest_for_empty_frame() {
        assert_eq!(
            to_hex_lower(&Sha256::digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
