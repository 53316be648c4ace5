//! Audio outputs for [`PlaybackManager`](crate::feed::PlaybackManager).
//!
//! [`SilentOutput`] accepts media without playing it and is what builds
//! without the `audio` feature get. [`RodioOutput`] plays through the
//! default system device.

use log::debug;

use crate::feed::AudioOutput;

/// Output that only keeps track of what would be playing.
#[derive(Debug, Default)]
pub struct SilentOutput {
    loaded: Option<String>,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self) -> Option<&str> {
        self.loaded.as_deref()
    }
}

impl AudioOutput for SilentOutput {
    type Handle = String;

    fn load(&mut self, item_id: &str, media: Vec<u8>) -> anyhow::Result<String> {
        debug!("audio(silent): {item_id}, {} bytes", media.len());
        self.loaded = Some(item_id.to_string());
        Ok(item_id.to_string())
    }

    fn release(&mut self, handle: String) {
        if self.loaded.as_deref() == Some(handle.as_str()) {
            self.loaded = None;
        }
    }
}

#[cfg(feature = "audio")]
pub use self::device::RodioOutput;

#[cfg(feature = "audio")]
mod device {
    use std::io::Cursor;

    use anyhow::Context;
    use log::{debug, info};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

    use crate::feed::AudioOutput;

    /// Plays through the default output device, one [`Sink`] per item.
    pub struct RodioOutput {
        // Dropping the stream silences every sink; keep it for our lifetime.
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl RodioOutput {
        pub fn open() -> anyhow::Result<Self> {
            let (stream, handle) =
                OutputStream::try_default().context("no audio output device")?;
            info!("audio: default output device opened");
            Ok(Self {
                _stream: stream,
                handle,
            })
        }
    }

    impl AudioOutput for RodioOutput {
        type Handle = Sink;

        fn load(&mut self, item_id: &str, media: Vec<u8>) -> anyhow::Result<Sink> {
            let source = Decoder::new(Cursor::new(media))
                .with_context(|| format!("cannot decode audio for {item_id}"))?;
            let sink = Sink::try_new(&self.handle).context("cannot create audio sink")?;
            sink.append(source);
            debug!("audio: playing {item_id}");
            Ok(sink)
        }

        fn release(&mut self, sink: Sink) {
            sink.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_output_tracks_loaded_item() {
        let mut out = SilentOutput::new();
        let h = out.load("A", vec![0; 4]).unwrap();
        assert_eq!(out.loaded(), Some("A"));
        out.release(h);
        assert_eq!(out.loaded(), None);
    }

    #[test]
    fn releasing_an_old_handle_keeps_newer_load() {
        let mut out = SilentOutput::new();
        let a = out.load("A", Vec::new()).unwrap();
        let _b = out.load("B", Vec::new()).unwrap();
        out.release(a);
        assert_eq!(out.loaded(), Some("B"));
    }
}
