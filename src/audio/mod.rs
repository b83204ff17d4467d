pub mod backend;
pub mod caf;
pub mod convert;
pub mod encoder;
pub mod file;
pub mod meter;
pub mod pcm;
pub mod playback;

#[cfg(feature = "device")]
pub mod microphone;
#[cfg(feature = "device")]
pub mod rodio_device;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, FileBackend};
pub use encoder::{CodecEncoders, EncoderFactory, EncoderSettings, SampleEncoder};
pub use file::{AudioFile, PcmAudio};
pub use meter::{LevelMeter, METER_FLOOR_DB};
pub use pcm::{PcmFormat, PcmSamples};
pub use playback::{AudioClip, HeadlessDevice, Playback, PlaybackDevice, PlaybackMode};

#[cfg(feature = "device")]
pub use rodio_device::RodioDevice;

use std::sync::Arc;

/// Default output for this build: speakers with the `device` feature,
/// headless otherwise
pub fn default_playback_device() -> anyhow::Result<Arc<dyn PlaybackDevice>> {
    #[cfg(feature = "device")]
    {
        Ok(Arc::new(RodioDevice::open_default()?))
    }

    #[cfg(not(feature = "device"))]
    {
        Ok(Arc::new(HeadlessDevice::new()))
    }
}
