pub mod audio_data;
pub mod config;
pub mod device;
mod engine;
pub mod error;
pub mod events;
mod mixer;
pub mod music;
pub mod playback;
pub mod processor;
pub mod queue;
pub mod sound;
pub mod stream;
mod voice;

pub use audio_data::{
    AudioDataLoader, ConvertToMono, DefaultAudioLoader, LoadOptions, PcmSample, SampleSize,
    StreamDecoder, Wave, WaveData,
};
pub use config::PetalMixDeviceDesc;
pub use device::AudioDevice;
pub use error::{PetalMixError, Result};
pub use events::PetalMixEvent;
pub use music::Music;
pub use playback::{PlayState, VoiceId, pan_from_unit};
pub use processor::{MixedProcessor, mixed_processor};
pub use queue::{QueueConsumer, QueueLayout, QueueProducer, raw_buffer_queue};
pub use sound::{Sound, SoundPool};
pub use stream::{AudioStream, AudioStreamCallback, StreamFormat};
