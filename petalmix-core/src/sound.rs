use crate::audio_data::{PcmSample, SampleSize, Wave, WaveData};
use crate::device::{AudioDevice, DeviceLink};
use crate::error::{PetalMixError, Result};
use crate::playback::{PlayState, VoiceId};
use crate::voice::{StaticReader, VoiceReader, VoiceShared};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Sample data shared by a source sound and all of its aliases.
///
/// Stored as normalized interleaved f32 at the wave's own rate and channel
/// count; the mixer resamples on the fly. The audio thread only `try_read`s.
#[derive(Debug)]
pub(crate) struct SoundBuffer {
    pub samples: RwLock<Vec<f32>>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample size of the wave the buffer was built from.
    pub sample_size: SampleSize,
}

/// A fully memory-resident playable.
///
/// A `Sound` is either the **source**, created from a [`Wave`] or a file, or
/// an **alias** created with [`Sound::alias`]. Aliases share the source's
/// sample buffer without copying it but carry their own cursor, volume,
/// pitch, pan and play state, so several of them can overlap.
///
/// The buffer is reference counted: dropping the source before its aliases
/// is safe, the samples are freed with the last handle.
pub struct Sound {
    link: DeviceLink,
    buffer: Arc<SoundBuffer>,
    voice: Arc<VoiceShared>,
    id: VoiceId,
    is_alias: bool,
}

impl Sound {
    /// Creates a source sound holding a copy of `wave`'s samples.
    ///
    /// # Errors
    ///
    /// - [`PetalMixError::InvalidHandle`] if the wave is empty
    /// - [`PetalMixError::InvalidFormat`] if it has more than two channels
    /// - [`PetalMixError::OutOfMemory`] if the sample copy cannot be allocated
    pub fn from_wave(device: &AudioDevice, wave: &Wave) -> Result<Self> {
        if wave.is_empty() {
            return Err(PetalMixError::InvalidHandle(
                "cannot create a sound from an empty wave".to_string(),
            ));
        }
        if wave.channels() > 2 {
            return Err(PetalMixError::InvalidFormat(format!(
                "sounds support 1 or 2 channels, wave has {}",
                wave.channels()
            )));
        }

        let len = wave.data().len();
        let mut samples = Vec::new();
        samples.try_reserve_exact(len).map_err(|e| {
            PetalMixError::OutOfMemory(format!("sound buffer of {} samples: {}", len, e))
        })?;
        wave.extend_samples_into(&mut samples);

        let buffer = Arc::new(SoundBuffer {
            samples: RwLock::new(samples),
            sample_rate: wave.sample_rate(),
            channels: wave.channels(),
            sample_size: wave.sample_size(),
        });

        let sound = Self::with_buffer(device.link().clone(), buffer, false);
        log::debug!(
            "Sound {} loaded: {} frames, {} Hz, {} channels",
            sound.id,
            wave.frame_count(),
            wave.sample_rate(),
            wave.channels()
        );
        Ok(sound)
    }

    /// Decodes the file at `path` and creates a source sound from it.
    pub fn load(device: &AudioDevice, path: impl AsRef<Path>) -> Result<Self> {
        let wave = Wave::load(path)?;
        Self::from_wave(device, &wave)
    }

    fn with_buffer(link: DeviceLink, buffer: Arc<SoundBuffer>, is_alias: bool) -> Self {
        let voice = Arc::new(VoiceShared::new(
            VoiceReader::Static(StaticReader::new(buffer.clone())),
            buffer.sample_rate,
            buffer.channels,
            false,
        ));
        let id = link.register(voice.clone());
        Self {
            link,
            buffer,
            voice,
            id,
            is_alias,
        }
    }

    /// Creates an alias sharing this sound's sample buffer.
    ///
    /// The alias starts stopped with this sound's current volume, pitch and
    /// pan. Aliasing an alias shares the same underlying buffer.
    pub fn alias(&self) -> Sound {
        let alias = Self::with_buffer(self.link.clone(), self.buffer.clone(), true);
        let controls = &self.voice.controls;
        alias.set_volume(controls.volume());
        alias.set_pitch(controls.pitch());
        alias.set_pan(controls.pan());
        alias
    }

    /// Starts playback from the first frame, restarting if already playing.
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

    pub fn stop(&self) {
        let mut reader = self.voice.lock_reader();
        self.voice.controls.set_state(PlayState::Stopped);
        reader.rewind();
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayState::Playing
    }

    pub fn state(&self) -> PlayState {
        self.voice.controls.state()
    }

    /// Volume in [0, 1]; out-of-range values are clamped.
    pub fn set_volume(&self, volume: f32) {
        self.voice.controls.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.voice.controls.volume()
    }

    /// Playback rate multiplier, 1.0 is the recorded pitch.
    pub fn set_pitch(&self, pitch: f32) {
        self.voice.controls.set_pitch(pitch);
    }

    pub fn pitch(&self) -> f32 {
        self.voice.controls.pitch()
    }

    /// Pan in [-1, 1], 0 is centre.
    pub fn set_pan(&self, pan: f32) {
        self.voice.controls.set_pan(pan);
    }

    pub fn pan(&self) -> f32 {
        self.voice.controls.pan()
    }

    pub fn set_looping(&self, looping: bool) {
        self.voice.controls.set_looping(looping);
    }

    pub fn is_looping(&self) -> bool {
        self.voice.controls.is_looping()
    }

    pub fn is_alias(&self) -> bool {
        self.is_alias
    }

    /// Identifier carried by this handle's events.
    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.buffer.channels
    }

    pub fn frame_count(&self) -> usize {
        let samples = self
            .buffer
            .samples
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        samples.len() / self.buffer.channels as usize
    }

    /// True if both handles play the same sample buffer.
    pub fn shares_buffer_with(&self, other: &Sound) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Overwrites the start of the shared sample buffer with `data`.
    ///
    /// Only the source may do this. The source is stopped first; aliases keep
    /// playing and hear the new samples immediately. Data beyond the buffer
    /// length is ignored.
    pub fn update<T: PcmSample>(&self, data: &[T]) {
        if self.is_alias {
            log::warn!("Sound {}: update() called on an alias, ignoring", self.id);
            return;
        }

        self.stop();

        let mut samples = self
            .buffer
            .samples
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if data.len() > samples.len() {
            log::warn!(
                "Sound {}: update with {} samples truncated to {}",
                self.id,
                data.len(),
                samples.len()
            );
        }
        for (dst, src) in samples.iter_mut().zip(data) {
            *dst = src.to_f32();
        }
    }

    /// Copies the samples back out at the sample size they were loaded with.
    pub fn to_wave(&self) -> Result<Wave> {
        let samples = self
            .buffer
            .samples
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Wave::from_data(
            self.buffer.sample_rate,
            self.buffer.channels,
            WaveData::from_f32(&samples, self.buffer.sample_size),
        )
    }
}

impl Drop for Sound {
    fn drop(&mut self) {
        self.link.unregister(self.id);
    }
}

/// Fixed set of aliases of one sound, triggered round-robin.
///
/// Lets a short effect overlap itself without decoding or copying it again.
pub struct SoundPool {
    aliases: Vec<Sound>,
    next: usize,
}

impl SoundPool {
    /// Creates `size` aliases of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidRange`] if `size` is zero.
    pub fn new(source: &Sound, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(PetalMixError::InvalidRange(
                "sound pool needs at least one alias".to_string(),
            ));
        }
        Ok(Self {
            aliases: (0..size).map(|_| source.alias()).collect(),
            next: 0,
        })
    }

    /// Plays the next alias in turn and returns its index.
    pub fn play_next(&mut self) -> usize {
        let index = self.next;
        self.aliases[index].play();
        self.next = (index + 1) % self.aliases.len();
        index
    }

    pub fn get(&self, index: usize) -> Option<&Sound> {
        self.aliases.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sound> {
        self.aliases.iter()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn playing_count(&self) -> usize {
        self.aliases.iter().filter(|s| s.is_playing()).count()
    }

    pub fn stop_all(&self) {
        for alias in &self.aliases {
            alias.stop();
        }
    }
}
