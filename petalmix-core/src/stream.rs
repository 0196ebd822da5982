use crate::audio_data::{PcmSample, SampleSize};
use crate::device::{AudioDevice, DeviceLink};
use crate::error::{PetalMixError, Result};
use crate::mixer::MixerCommand;
use crate::playback::{PlayState, VoiceId};
use crate::processor::MixedProcessor;
use crate::queue::{QueueLayout, QueueProducer, raw_buffer_queue};
use crate::voice::{StreamReader, VoiceReader, VoiceShared};
use std::sync::Arc;

pub use crate::voice::AudioStreamCallback;

/// PCM layout accepted by an [`AudioStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub sample_size: SampleSize,
    pub channels: u16,
}

impl StreamFormat {
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidFormat`] unless `sample_rate > 0`,
    /// `sample_bits` is 8, 16 or 32 and `channels` is 1 or 2.
    pub fn new(sample_rate: u32, sample_bits: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PetalMixError::InvalidFormat(
                "stream sample rate must be greater than 0".to_string(),
            ));
        }
        let sample_size = SampleSize::from_bits(sample_bits)?;
        if !(1..=2).contains(&channels) {
            return Err(PetalMixError::InvalidFormat(format!(
                "streams support 1 or 2 channels, got {}",
                channels
            )));
        }
        Ok(Self {
            sample_rate,
            sample_size,
            channels,
        })
    }
}

/// A channel the application pushes raw PCM into, buffer by buffer.
///
/// The stream owns a raw buffer queue of `buffer_count` slots. The typical
/// loop polls [`is_buffer_processed`](Self::is_buffer_processed) once per
/// frame and refills with [`update`](Self::update) whenever it is true.
/// Alternatively [`set_callback`](Self::set_callback) lets the mixer pull
/// samples directly on the audio thread.
pub struct AudioStream {
    link: DeviceLink,
    format: StreamFormat,
    producer: QueueProducer,
    voice: Arc<VoiceShared>,
    id: VoiceId,
    convert: Vec<f32>,
}

impl AudioStream {
    /// Creates a stream with the device's default buffer geometry.
    pub fn new(
        device: &AudioDevice,
        sample_rate: u32,
        sample_bits: u32,
        channels: u16,
    ) -> Result<Self> {
        let format = StreamFormat::new(sample_rate, sample_bits, channels)?;
        let desc = device.desc();
        Self::with_link(
            device.link().clone(),
            format,
            desc.stream_buffer_frames,
            desc.stream_buffer_count,
        )
    }

    /// Creates a stream with `buffer_count` slots of `buffer_frames` frames.
    /// Fewer than two slots are raised to two.
    pub fn with_buffer(
        device: &AudioDevice,
        format: StreamFormat,
        buffer_frames: usize,
        buffer_count: usize,
    ) -> Result<Self> {
        let format = StreamFormat::new(format.sample_rate, format.sample_size.bits(), format.channels)?;
        if buffer_frames == 0 {
            return Err(PetalMixError::InvalidFormat(
                "stream buffer must hold at least one frame".to_string(),
            ));
        }
        Self::with_link(device.link().clone(), format, buffer_frames, buffer_count)
    }

    fn with_link(
        link: DeviceLink,
        format: StreamFormat,
        buffer_frames: usize,
        buffer_count: usize,
    ) -> Result<Self> {
        let layout = QueueLayout::new(buffer_frames, buffer_count, format.channels as usize);
        let (producer, consumer) = raw_buffer_queue(layout);

        let voice = Arc::new(VoiceShared::new(
            VoiceReader::Stream(StreamReader::new(consumer)),
            format.sample_rate,
            format.channels,
            false,
        ));
        let id = link.register(voice.clone());

        log::debug!(
            "AudioStream {} created: {} Hz, {}, {} channels, {} x {} frames",
            id,
            format.sample_rate,
            format.sample_size,
            format.channels,
            layout.buffer_count,
            layout.buffer_frames
        );

        Ok(Self {
            link,
            format,
            producer,
            voice,
            id,
            convert: Vec::with_capacity(layout.slot_samples()),
        })
    }

    /// True when at least one slot has been fully consumed and can be refilled.
    pub fn is_buffer_processed(&self) -> bool {
        self.producer.is_buffer_processed()
    }

    /// Queues interleaved samples in the stream's own format.
    ///
    /// Samples whose type does not match the stream's sample size are
    /// rejected with a warning. Frames that do not fit the free space are
    /// dropped.
    ///
    /// # Returns
    ///
    /// The number of frames queued.
    pub fn update<T: PcmSample>(&mut self, data: &[T]) -> usize {
        if T::SIZE != self.format.sample_size {
            log::warn!(
                "AudioStream {}: update with {} samples on a {} stream, ignoring",
                self.id,
                T::SIZE,
                self.format.sample_size
            );
            return 0;
        }

        self.convert.clear();
        self.convert.extend(data.iter().map(|s| s.to_f32()));
        self.producer.submit(&self.convert)
    }

    /// Starts playback. Already queued data is kept.
    pub fn play(&self) {
        let mut reader = self.voice.lock_reader();
        reader.rewind();
        self.voice.controls.set_state(PlayState::Playing);
    }

    pub fn pause(&self) {
        self.voice
            .controls
            .transition(PlayState::Playing, PlayState::Paused);
    }

    pub fn resume(&self) {
        self.voice
            .controls
            .transition(PlayState::Paused, PlayState::Playing);
    }

    /// Stops playback and discards everything queued.
    pub fn stop(&self) {
        let mut reader = self.voice.lock_reader();
        self.voice.controls.set_state(PlayState::Stopped);
        if let Some(stream) = reader.as_stream_mut() {
            let dropped = stream.clear();
            if dropped > 0 {
                log::debug!("AudioStream {}: stop discarded {} frames", self.id, dropped);
            }
        }
        self.voice.controls.reset_frames_played();
    }

    /// True when the mixer has played every queued frame and found nothing more.
    pub(crate) fn has_run_dry(&self) -> bool {
        self.voice
            .lock_reader()
            .as_stream_mut()
            .is_some_and(|stream| stream.is_starved())
    }

    /// Discards queued data without touching the play state.
    pub(crate) fn flush(&self) {
        let mut reader = self.voice.lock_reader();
        if let Some(stream) = reader.as_stream_mut() {
            stream.clear();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayState::Playing
    }

    pub fn state(&self) -> PlayState {
        self.voice.controls.state()
    }

    pub fn set_volume(&self, volume: f32) {
        self.voice.controls.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.voice.controls.volume()
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.voice.controls.set_pitch(pitch);
    }

    pub fn pitch(&self) -> f32 {
        self.voice.controls.pitch()
    }

    pub fn set_pan(&self, pan: f32) {
        self.voice.controls.set_pan(pan);
    }

    pub fn pan(&self) -> f32 {
        self.voice.controls.pan()
    }

    /// Switches the stream to pull mode: the mixer calls `callback` on the
    /// audio thread each time it needs another slot of frames. Anything
    /// still queued is discarded.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&mut [f32], usize) + Send + 'static,
    {
        let mut reader = self.voice.lock_reader();
        if let Some(stream) = reader.as_stream_mut() {
            stream.clear();
            stream.set_callback(Box::new(callback));
        }
    }

    pub fn has_callback(&self) -> bool {
        self.voice
            .lock_reader()
            .as_stream_mut()
            .is_some_and(|stream| stream.has_callback())
    }

    /// Returns to queue mode. Returns `false` if no callback was set.
    pub fn clear_callback(&self) -> bool {
        let mut reader = self.voice.lock_reader();
        reader
            .as_stream_mut()
            .is_some_and(|stream| stream.clear_callback())
    }

    /// Runs `processor` on this stream's frames, at its own channel count,
    /// before they are mixed.
    pub fn attach_processor(&self, processor: &Arc<MixedProcessor>) {
        self.link.send(MixerCommand::AttachVoiceProcessor {
            id: self.id,
            processor: processor.clone(),
        });
    }

    pub fn detach_processor(&self, processor: &Arc<MixedProcessor>) {
        self.link.send(MixerCommand::DetachVoiceProcessor {
            id: self.id,
            processor: processor.clone(),
        });
    }

    pub fn queued_frames(&self) -> usize {
        self.producer.queued_frames()
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn buffer_frames(&self) -> usize {
        self.producer.layout().buffer_frames
    }

    pub fn buffer_count(&self) -> usize {
        self.producer.layout().buffer_count
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Source frames consumed by the mixer since the last stop.
    pub(crate) fn frames_played(&self) -> u64 {
        self.voice.controls.frames_played()
    }

    pub(crate) fn reset_frames_played(&self) {
        self.voice.controls.reset_frames_played();
    }

    pub(crate) fn link(&self) -> &DeviceLink {
        &self.link
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.link.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PetalMixDeviceDesc;

    fn device() -> AudioDevice {
        AudioDevice::headless(PetalMixDeviceDesc::new().sample_rate(8000).channels(1)).unwrap()
    }

    #[test]
    fn rejects_invalid_formats() {
        let device = device();
        assert!(matches!(
            AudioStream::new(&device, 8000, 24, 1),
            Err(PetalMixError::InvalidFormat(_))
        ));
        assert!(AudioStream::new(&device, 8000, 16, 3).is_err());
        assert!(AudioStream::new(&device, 0, 16, 1).is_err());
    }

    #[test]
    fn mismatched_sample_type_is_ignored() {
        let device = device();
        let mut stream = AudioStream::new(&device, 8000, 16, 1).unwrap();

        assert_eq!(stream.update(&[0.5f32; 8]), 0);
        assert_eq!(stream.queued_frames(), 0);
        assert_eq!(stream.update(&[1000i16; 8]), 8);
        assert_eq!(stream.queued_frames(), 8);
    }

    #[test]
    fn buffer_count_is_at_least_two() {
        let device = device();
        let format = StreamFormat::new(8000, 32, 2).unwrap();
        let stream = AudioStream::with_buffer(&device, format, 64, 1).unwrap();
        assert_eq!(stream.buffer_count(), 2);
        assert_eq!(stream.buffer_frames(), 64);
    }

    #[test]
    fn state_machine_follows_allowed_transitions() {
        let device = device();
        let stream = AudioStream::new(&device, 8000, 32, 1).unwrap();

        stream.pause();
        assert_eq!(stream.state(), PlayState::Stopped);
        stream.play();
        stream.resume();
        assert_eq!(stream.state(), PlayState::Playing);
        stream.pause();
        assert_eq!(stream.state(), PlayState::Paused);
        stream.play();
        assert_eq!(stream.state(), PlayState::Playing);
        stream.stop();
        assert_eq!(stream.state(), PlayState::Stopped);
    }

    #[test]
    fn stop_clears_queue_and_play_keeps_it() {
        let device = device();
        let mut stream = AudioStream::new(&device, 8000, 32, 1).unwrap();
        stream.update(&[0.1f32; 100]);

        stream.play();
        assert_eq!(stream.queued_frames(), 100);
        stream.stop();
        assert_eq!(stream.queued_frames(), 0);
    }

    #[test]
    fn paused_stream_does_not_consume() {
        let device = device();
        let mut stream = AudioStream::new(&device, 8000, 32, 1).unwrap();
        stream.update(&[0.1f32; 100]);
        stream.play();
        stream.pause();

        let mut out = [0.0f32; 32];
        device.render(&mut out);
        assert_eq!(stream.queued_frames(), 100);
        assert_eq!(out, [0.0; 32]);
    }

    #[test]
    fn callback_stream_is_pulled_by_mixer() {
        let device = device();
        let stream = AudioStream::with_buffer(
            &device,
            StreamFormat::new(8000, 32, 1).unwrap(),
            16,
            2,
        )
        .unwrap();
        stream.set_callback(|buffer, _frames| buffer.fill(0.25));
        stream.play();

        let mut out = [0.0f32; 40];
        device.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6), "{:?}", out);

        assert!(stream.has_callback());
        assert!(stream.clear_callback());
        assert!(!stream.clear_callback());
        assert!(!stream.has_callback());
    }
}
