use crate::config::PetalMixDeviceDesc;
use crate::error::{PetalMixError, Result};
use crate::events::{EventSink, PetalMixEvent};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Callback function type for filling audio samples
///
/// The callback receives:
/// - `buffer`: zeroed interleaved slice to fill with audio samples
/// - `sample_rate`: device sample rate
/// - `channels`: number of device channels
///
/// Returns the number of frames actually filled (frames = samples / channels)
pub(crate) type AudioFillCallback = dyn Fn(&mut [f32], u32, u16) -> usize + Send + Sync;

/// Hardware output adapter. Pulls every device buffer from a fill callback
/// and converts it to the device's native sample format.
pub(crate) struct PetalMixEngine {
    desc: PetalMixDeviceDesc,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    fill_callback: Option<Arc<AudioFillCallback>>,
    events: EventSink,
}

/// State moved into the cpal data callback.
struct CallbackState {
    fill_callback: Arc<AudioFillCallback>,
    is_running: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
}

impl PetalMixEngine {
    /// Create a new engine. Backend errors are reported on `events`.
    pub fn new(desc: PetalMixDeviceDesc, events: EventSink) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            desc,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            fill_callback: None,
            events,
        })
    }

    /// Set the callback invoked on the audio thread for every device buffer
    pub fn set_fill_callback<F>(&mut self, callback: F)
    where
        F: Fn(&mut [f32], u32, u16) -> usize + Send + Sync + 'static,
    {
        self.fill_callback = Some(Arc::new(callback));
    }

    /// Open the default output device and start pulling audio.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::Configuration`] if no fill callback was set,
    /// and [`PetalMixError::AudioDevice`] if the device cannot be opened or
    /// uses an unsupported sample format.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let fill_callback = self
            .fill_callback
            .clone()
            .ok_or_else(|| PetalMixError::Configuration("No fill callback set".into()))?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            PetalMixError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(self.desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            PetalMixError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let state = CallbackState {
            fill_callback,
            is_running: self.is_running.clone(),
            sample_rate: self.desc.sample_rate,
            channels: self.desc.channels,
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config, state)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config, state)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config, state)?,
            other => {
                return Err(PetalMixError::AudioDevice(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            PetalMixError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        log::info!(
            "Audio engine started: {} Hz, {} channels, {} frames per block ({:?})",
            self.desc.sample_rate,
            self.desc.channels,
            self.desc.block_size,
            default_config.sample_format()
        );

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);

        Ok(())
    }

    /// Stop the engine and release the device
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Audio engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        state: CallbackState,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let CallbackState {
            fill_callback,
            is_running,
            sample_rate,
            channels,
        } = state;
        let events = self.events.clone();
        let mut mix_buffer: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        data.fill(T::from_sample(0.0f32));
                        return;
                    }

                    // Reallocates only when the backend hands us a larger block
                    if mix_buffer.len() != data.len() {
                        mix_buffer.resize(data.len(), 0.0);
                    }
                    mix_buffer.fill(0.0);

                    fill_callback(&mut mix_buffer, sample_rate, channels);

                    for (sample, &value) in data.iter_mut().zip(mix_buffer.iter()) {
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    events.emit(PetalMixEvent::DeviceError {
                        error: err.to_string(),
                    });
                },
                None,
            )
            .map_err(|e| PetalMixError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

impl Drop for PetalMixEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
