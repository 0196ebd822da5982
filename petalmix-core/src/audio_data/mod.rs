mod batch_resampler;
mod default_loader;
mod load_options;
mod loader;
mod sample;
mod stream_decoder;

use crate::error::{PetalMixError, Result};
pub use batch_resampler::BatchResampler;
pub use default_loader::DefaultAudioLoader;
pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::AudioDataLoader;
pub use sample::{PcmSample, SampleSize};
use std::path::Path;
use std::time::Duration;
pub use stream_decoder::{StreamDecoder, SymphoniaDecoder, WaveDecoder};

/// Typed sample storage of a [`Wave`], always **INTERLEAVED**
/// (`[L0, R0, L1, R1, ...]` for stereo).
#[derive(Debug, Clone, PartialEq)]
pub enum WaveData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl WaveData {
    pub fn sample_size(&self) -> SampleSize {
        match self {
            Self::U8(_) => SampleSize::U8,
            Self::I16(_) => SampleSize::I16,
            Self::F32(_) => SampleSize::F32,
        }
    }

    /// Number of samples across all channels.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(data) => data.len(),
            Self::I16(data) => data.len(),
            Self::F32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn from_f32(samples: &[f32], size: SampleSize) -> Self {
        match size {
            SampleSize::U8 => Self::U8(samples.iter().map(|&s| u8::from_f32(s)).collect()),
            SampleSize::I16 => Self::I16(samples.iter().map(|&s| i16::from_f32(s)).collect()),
            SampleSize::F32 => Self::F32(samples.to_vec()),
        }
    }

    fn extend_f32(&self, out: &mut Vec<f32>) {
        match self {
            Self::U8(data) => out.extend(data.iter().map(|s| s.to_f32())),
            Self::I16(data) => out.extend(data.iter().map(|s| s.to_f32())),
            Self::F32(data) => out.extend_from_slice(data),
        }
    }

    fn slice(&self, start: usize, end: usize) -> Self {
        match self {
            Self::U8(data) => Self::U8(data[start..end].to_vec()),
            Self::I16(data) => Self::I16(data[start..end].to_vec()),
            Self::F32(data) => Self::F32(data[start..end].to_vec()),
        }
    }
}

/// Fully decoded PCM held in RAM, independent of any device.
///
/// A `Wave` is a plain value: cloning copies the samples. It is the input of
/// [`crate::Sound::from_wave`] and the output of [`crate::Sound::to_wave`].
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    sample_rate: u32,
    channels: u16,
    data: WaveData,
}

impl Wave {
    /// Builds a wave from interleaved samples of any [`PcmSample`] type.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidFormat`] if the rate or channel count is
    /// zero, or the sample count is not a whole number of frames.
    pub fn from_samples<T: PcmSample>(
        sample_rate: u32,
        channels: u16,
        samples: Vec<T>,
    ) -> Result<Self> {
        let data = match T::SIZE {
            SampleSize::U8 => {
                WaveData::U8(samples.into_iter().map(|s| u8::from_f32(s.to_f32())).collect())
            }
            SampleSize::I16 => {
                WaveData::I16(samples.into_iter().map(|s| i16::from_f32(s.to_f32())).collect())
            }
            SampleSize::F32 => WaveData::F32(samples.into_iter().map(|s| s.to_f32()).collect()),
        };
        Self::from_data(sample_rate, channels, data)
    }

    /// Builds a wave from already typed storage.
    pub fn from_data(sample_rate: u32, channels: u16, data: WaveData) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PetalMixError::InvalidFormat(
                "wave sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(PetalMixError::InvalidFormat(
                "wave channel count must be greater than 0".to_string(),
            ));
        }
        if data.len() % channels as usize != 0 {
            return Err(PetalMixError::InvalidFormat(format!(
                "{} samples do not divide into {} channels",
                data.len(),
                channels
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            data,
        })
    }

    /// Load a wave from a file path using the default symphonia loader.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the audio file (WAV, OGG, FLAC, ...)
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::Io`] if the file cannot be opened and
    /// [`PetalMixError::DecodeFailure`] if it cannot be decoded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        DefaultAudioLoader.load(path.as_ref(), &LoadOptions::default())
    }

    /// Load a wave from a file path with custom loading options.
    pub fn load_with_options(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        DefaultAudioLoader.load(path.as_ref(), options)
    }

    /// Load a wave using a custom [`AudioDataLoader`].
    pub fn load_with_loader<L: AudioDataLoader>(
        path: impl AsRef<Path>,
        loader: &L,
        options: &LoadOptions,
    ) -> Result<Self> {
        loader.load(path.as_ref(), options)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_size(&self) -> SampleSize {
        self.data.sample_size()
    }

    pub fn data(&self) -> &WaveData {
        &self.data
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Returns a normalized f32 copy of the interleaved samples.
    pub fn samples(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        self.data.extend_f32(&mut out);
        out
    }

    /// Appends the normalized samples to `out` without reallocating when the
    /// caller has reserved enough room.
    pub(crate) fn extend_samples_into(&self, out: &mut Vec<f32>) {
        self.data.extend_f32(out);
    }

    /// Converts the wave in place to a new rate, sample size and channel count.
    ///
    /// Channels are averaged when going to mono and duplicated when going up
    /// from mono. Rate conversion uses [`BatchResampler`].
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidFormat`] for a zero rate or channel count
    /// or an unsupported sample size.
    pub fn format(&mut self, sample_rate: u32, sample_bits: u32, channels: u16) -> Result<()> {
        let sample_size = SampleSize::from_bits(sample_bits)?;
        if sample_rate == 0 || channels == 0 {
            return Err(PetalMixError::InvalidFormat(format!(
                "cannot format wave to {} Hz, {} channels",
                sample_rate, channels
            )));
        }

        if sample_rate == self.sample_rate
            && channels == self.channels
            && sample_size == self.sample_size()
        {
            return Ok(());
        }

        let mut samples = remap_channels(&self.samples(), self.channels, channels);

        if sample_rate != self.sample_rate {
            let resampler = BatchResampler::new(self.sample_rate, sample_rate, channels, None)?;
            samples = resampler.resample_interleaved(&samples)?;
        }

        log::debug!(
            "Formatted wave: {} Hz/{}/{}ch -> {} Hz/{}/{}ch",
            self.sample_rate,
            self.sample_size(),
            self.channels,
            sample_rate,
            sample_size,
            channels
        );

        self.data = WaveData::from_f32(&samples, sample_size);
        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }

    /// Keeps only frames `[init_frame, final_frame)`.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidRange`] if `init_frame >= final_frame` or
    /// `final_frame` is past the end. The wave is left untouched on error.
    pub fn crop(&mut self, init_frame: usize, final_frame: usize) -> Result<()> {
        let frame_count = self.frame_count();
        if init_frame >= final_frame || final_frame > frame_count {
            return Err(PetalMixError::InvalidRange(format!(
                "crop range {}..{} out of bounds (frames: {})",
                init_frame, final_frame, frame_count
            )));
        }

        let channels = self.channels as usize;
        self.data = self
            .data
            .slice(init_frame * channels, final_frame * channels);
        Ok(())
    }

    /// Writes the wave as a RIFF/WAV file at its own sample size.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::Io`] if the file cannot be written.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let sample_size = self.sample_size();
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: sample_size.bits() as u16,
            sample_format: match sample_size {
                SampleSize::F32 => hound::SampleFormat::Float,
                _ => hound::SampleFormat::Int,
            },
        };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec).map_err(hound_error)?;
        match &self.data {
            // hound stores 8-bit samples as unsigned on disk from a signed value
            WaveData::U8(data) => {
                for &sample in data {
                    writer
                        .write_sample((sample as i16 - 128) as i8)
                        .map_err(hound_error)?;
                }
            }
            WaveData::I16(data) => {
                for &sample in data {
                    writer.write_sample(sample).map_err(hound_error)?;
                }
            }
            WaveData::F32(data) => {
                for &sample in data {
                    writer.write_sample(sample).map_err(hound_error)?;
                }
            }
        }
        writer.finalize().map_err(hound_error)?;

        log::info!(
            "Exported wave to {} ({} frames, {})",
            path.as_ref().display(),
            self.frame_count(),
            sample_size
        );
        Ok(())
    }
}

fn hound_error(err: hound::Error) -> PetalMixError {
    match err {
        hound::Error::IoError(io) => PetalMixError::Io(io),
        other => PetalMixError::InvalidFormat(other.to_string()),
    }
}

/// Converts interleaved samples between channel counts.
pub(crate) fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }

    let from = from as usize;
    let to = to as usize;
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else if from == 1 {
            out.extend(std::iter::repeat_n(frame[0], to));
        } else {
            out.extend((0..to).map(|ch| frame[ch.min(from - 1)]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: u16) -> Wave {
        let samples: Vec<i16> = (0..frames * channels as usize)
            .map(|i| (i as i16).wrapping_mul(7))
            .collect();
        Wave::from_samples(22050, channels, samples).unwrap()
    }

    #[test]
    fn rejects_partial_frames() {
        let result = Wave::from_samples(44100, 2, vec![0.0f32; 3]);
        assert!(matches!(result, Err(PetalMixError::InvalidFormat(_))));
    }

    #[test]
    fn crop_keeps_requested_frames() {
        let mut wave = ramp(100, 2);
        let original = wave.clone();
        wave.crop(10, 20).unwrap();

        assert_eq!(wave.frame_count(), 10);
        let WaveData::I16(cropped) = wave.data() else {
            panic!("sample size changed by crop");
        };
        let WaveData::I16(source) = original.data() else {
            unreachable!();
        };
        assert_eq!(cropped.as_slice(), &source[20..40]);
    }

    #[test]
    fn crop_rejects_bad_ranges() {
        let mut wave = ramp(50, 1);
        assert!(matches!(wave.crop(10, 10), Err(PetalMixError::InvalidRange(_))));
        assert!(matches!(wave.crop(20, 10), Err(PetalMixError::InvalidRange(_))));
        assert!(matches!(wave.crop(0, 51), Err(PetalMixError::InvalidRange(_))));
        assert_eq!(wave.frame_count(), 50);
    }

    #[test]
    fn format_changes_channels_and_size() {
        let mut wave = Wave::from_samples(22050, 2, vec![0.5f32, -0.5, 0.25, 0.75]).unwrap();
        wave.format(22050, 16, 1).unwrap();

        assert_eq!(wave.channels(), 1);
        assert_eq!(wave.sample_size(), SampleSize::I16);
        assert_eq!(wave.data(), &WaveData::I16(vec![0, 16384]));
    }

    #[test]
    fn format_mono_to_stereo_duplicates() {
        let mut wave = Wave::from_samples(8000, 1, vec![10u8, 200]).unwrap();
        wave.format(8000, 8, 2).unwrap();
        assert_eq!(wave.data(), &WaveData::U8(vec![10, 10, 200, 200]));
    }

    #[test]
    fn format_resamples_frame_count() {
        let mut wave = Wave::from_samples(44100, 1, vec![0.1f32; 44100]).unwrap();
        wave.format(22050, 32, 1).unwrap();
        assert_eq!(wave.sample_rate(), 22050);
        assert_eq!(wave.frame_count(), 22050);
    }

    #[test]
    fn format_rejects_unsupported_size() {
        let mut wave = ramp(10, 1);
        assert!(matches!(
            wave.format(22050, 24, 1),
            Err(PetalMixError::InvalidFormat(_))
        ));
    }

    #[test]
    fn samples_are_normalized() {
        let wave = Wave::from_samples(8000, 1, vec![i16::MIN, 0, 16384]).unwrap();
        assert_eq!(wave.samples(), vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn duration_uses_frames() {
        let wave = Wave::from_samples(1000, 2, vec![0.0f32; 1000]).unwrap();
        assert_eq!(wave.duration(), Duration::from_millis(500));
    }

    #[test]
    fn export_then_load_round_trips_i16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let wave = ramp(256, 2);

        wave.export(&path).unwrap();
        let loaded = Wave::load(&path).unwrap();

        assert_eq!(loaded, wave);
    }

    #[test]
    fn export_then_load_round_trips_u8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.wav");
        let wave = Wave::from_samples(11025, 1, (0..=255u8).collect()).unwrap();

        wave.export(&path).unwrap();
        let loaded = Wave::load(&path).unwrap();

        assert_eq!(loaded.sample_size(), SampleSize::U8);
        assert_eq!(loaded.data(), wave.data());
    }
}
