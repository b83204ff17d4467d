// Speaker output through rodio
//
// rodio's OutputStream must stay on the thread that opened it, so a parked
// thread owns it for as long as the device lives and hands back the
// (Send) stream handle. Each playback gets its own Sink.

use anyhow::{anyhow, Context, Result};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::mpsc;
use tracing::info;

use super::playback::{AudioClip, Playback, PlaybackDevice, PlaybackMode};

pub struct RodioDevice {
    handle: OutputStreamHandle,
    // Dropping this sender releases the stream thread
    _keepalive: mpsc::Sender<()>,
}

impl RodioDevice {
    /// Open the default output device
    pub fn open_default() -> Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (keepalive_tx, keepalive_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("field-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    let _ = keepalive_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(anyhow!("Failed to open output device: {}", e)));
                }
            })
            .context("Failed to spawn output thread")?;

        let handle = handle_rx
            .recv()
            .context("Output thread exited before opening the device")??;

        info!("Output device opened");
        Ok(Self {
            handle,
            _keepalive: keepalive_tx,
        })
    }
}

impl PlaybackDevice for RodioDevice {
    fn play(&self, clip: &AudioClip, mode: PlaybackMode) -> Result<Box<dyn Playback>> {
        let sink = Sink::try_new(&self.handle).context("Failed to create output sink")?;
        let source = SamplesBuffer::new(clip.channels, clip.sample_rate, clip.samples.as_ref().clone());

        match mode {
            PlaybackMode::Loop => sink.append(source.repeat_infinite()),
            PlaybackMode::Once => sink.append(source),
        }

        Ok(Box::new(RodioPlayback { sink }))
    }

    fn name(&self) -> &str {
        "rodio"
    }
}

struct RodioPlayback {
    sink: Sink,
}

impl Playback for RodioPlayback {
    fn stop(&mut self) {
        self.sink.stop();
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty() && !self.sink.is_paused()
    }
}

impl Drop for RodioPlayback {
    fn drop(&mut self) {
        self.sink.stop();
    }
}
