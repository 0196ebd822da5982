use crate::error::{PetalMixError, Result};

/// Description of the audio device and the default geometry of every stream
/// created against it.
///
/// Mirrors the hardware configuration passed to the output backend plus the
/// defaults used by [`crate::AudioStream::new`] and [`crate::Music`].
#[derive(Debug, Clone)]
pub struct PetalMixDeviceDesc {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count, 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// Frames requested from the backend per callback.
    pub block_size: usize,
    /// Frames per raw queue slot for new audio streams.
    pub stream_buffer_frames: usize,
    /// Number of raw queue slots for new audio streams (at least 2).
    pub stream_buffer_count: usize,
    /// Expected number of simultaneous voices. Used to pre-size the mixer.
    pub max_voices: usize,
    /// Events held between two `poll_events` calls before new ones are dropped.
    pub event_capacity: usize,
}

impl Default for PetalMixDeviceDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 512,
            stream_buffer_frames: 2048,
            stream_buffer_count: 2,
            max_voices: 64,
            event_capacity: 1024,
        }
    }
}

impl PetalMixDeviceDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn stream_buffer_frames(mut self, frames: usize) -> Self {
        self.stream_buffer_frames = frames;
        self
    }

    pub fn stream_buffer_count(mut self, count: usize) -> Self {
        self.stream_buffer_count = count;
        self
    }

    pub fn max_voices(mut self, max: usize) -> Self {
        self.max_voices = max;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Checks that the description can drive a device.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PetalMixError::Configuration(
                "sample_rate must be greater than 0".to_string(),
            ));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(PetalMixError::Configuration(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.block_size == 0 {
            return Err(PetalMixError::Configuration(
                "block_size must be greater than 0".to_string(),
            ));
        }
        if self.stream_buffer_frames == 0 {
            return Err(PetalMixError::Configuration(
                "stream_buffer_frames must be greater than 0".to_string(),
            ));
        }
        if self.stream_buffer_count < 2 {
            return Err(PetalMixError::Configuration(format!(
                "stream_buffer_count must be at least 2, got {}",
                self.stream_buffer_count
            )));
        }
        if self.event_capacity == 0 {
            return Err(PetalMixError::Configuration(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_desc_is_valid() {
        assert!(PetalMixDeviceDesc::default().validate().is_ok());
    }

    #[test]
    fn rejects_single_stream_buffer() {
        let desc = PetalMixDeviceDesc::new().stream_buffer_count(1);
        assert!(matches!(
            desc.validate(),
            Err(PetalMixError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_surround_output() {
        let desc = PetalMixDeviceDesc::new().channels(6);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn rejects_zero_event_capacity() {
        let desc = PetalMixDeviceDesc::new().event_capacity(0);
        assert!(desc.validate().is_err());
    }
}
