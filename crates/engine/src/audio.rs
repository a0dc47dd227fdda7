use tracing::debug;

use crate::assets::AudioTrack;

pub const DEFAULT_SOUNDTRACK_VOLUME: f32 = 0.5;

/// Output for scene soundtracks. At most one track plays at a time and it
/// loops until stopped or replaced.
pub trait SoundtrackPlayer {
    /// Replaces whatever is playing with `track`.
    fn play(&mut self, track: &AudioTrack);
    fn stop(&mut self);
}

/// Player for builds or machines without audio output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

impl SoundtrackPlayer for SilentPlayer {
    fn play(&mut self, track: &AudioTrack) {
        debug!(music = track.music.as_token(), "soundtrack_muted");
    }

    fn stop(&mut self) {}
}

#[cfg(feature = "audio")]
pub use device::{AudioDeviceError, RodioPlayer};

#[cfg(feature = "audio")]
mod device {
    use std::io::Cursor;
    use std::sync::Arc;

    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
    use thiserror::Error;
    use tracing::{debug, info, warn};

    use super::SoundtrackPlayer;
    use crate::assets::AudioTrack;

    #[derive(Debug, Error)]
    pub enum AudioDeviceError {
        #[error("failed to open the default audio output: {0}")]
        Stream(#[from] rodio::StreamError),
    }

    /// Plays soundtracks on the default output device. Must stay on the
    /// thread that created it.
    pub struct RodioPlayer {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        volume: f32,
        sink: Option<Sink>,
    }

    impl RodioPlayer {
        pub fn try_default(volume: f32) -> Result<Self, AudioDeviceError> {
            let (stream, handle) = OutputStream::try_default()?;
            Ok(Self {
                _stream: stream,
                handle,
                volume: volume.clamp(0.0, 1.0),
                sink: None,
            })
        }
    }

    impl SoundtrackPlayer for RodioPlayer {
        fn play(&mut self, track: &AudioTrack) {
            self.stop();
            let source = match Decoder::new(Cursor::new(Arc::clone(&track.bytes))) {
                Ok(source) => source,
                Err(error) => {
                    warn!(
                        music = track.music.as_token(),
                        error = %error,
                        "soundtrack_decode_failed"
                    );
                    return;
                }
            };
            let sink = match Sink::try_new(&self.handle) {
                Ok(sink) => sink,
                Err(error) => {
                    warn!(
                        music = track.music.as_token(),
                        error = %error,
                        "soundtrack_sink_failed"
                    );
                    return;
                }
            };
            sink.set_volume(self.volume);
            sink.append(source.repeat_infinite());
            info!(
                music = track.music.as_token(),
                volume = self.volume,
                "soundtrack_playing"
            );
            self.sink = Some(sink);
        }

        fn stop(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
                debug!("soundtrack_stopped");
            }
        }
    }
}
