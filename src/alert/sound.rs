// src/alert/sound.rs

use anyhow::{Context, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

/// Fire-and-forget playback of the alert clip. Each `play` detaches a
/// fresh sink, so overlapping alerts overlap audibly (no queueing).
pub struct SoundAlarm {
    // The stream must outlive every sink that plays on it.
    _stream: OutputStream,
    handle: OutputStreamHandle,
    clip_path: PathBuf,
}

impl SoundAlarm {
    pub fn new(clip_path: &str) -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| anyhow::anyhow!("No audio output device: {}", e))?;

        // Validate the clip decodes now so a bad path fails at startup,
        // not on the first alert.
        let file = File::open(clip_path)
            .with_context(|| format!("Cannot open alert clip: {}", clip_path))?;
        Decoder::new(BufReader::new(file))
            .with_context(|| format!("Cannot decode alert clip: {}", clip_path))?;

        info!("✓ Sound alarm ready ({})", clip_path);

        Ok(Self {
            _stream: stream,
            handle,
            clip_path: PathBuf::from(clip_path),
        })
    }

    pub fn play(&self) -> Result<()> {
        let file = File::open(&self.clip_path)?;
        let source = Decoder::new(BufReader::new(file))?;
        let sink = Sink::try_new(&self.handle)?;
        sink.append(source);
        sink.detach();
        Ok(())
    }
}
