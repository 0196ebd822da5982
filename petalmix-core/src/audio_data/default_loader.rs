use crate::{
    audio_data::{AudioDataLoader, ConvertToMono, LoadOptions, SampleSize, Wave, WaveData},
    error::{PetalMixError, Result},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{
            CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_U8, CodecParameters,
            Decoder, DecoderOptions,
        },
        conv::ConvertibleSample,
        errors::Error,
        formats::{FormatOptions, FormatReader},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
        sample::{Sample, SampleFormat},
    },
    default::{get_codecs, get_probe},
};

/// Default loader implementation using the Symphonia decoder library.
///
/// 8-bit and 16-bit integer sources keep their native sample size so that a
/// loaded wave can be exported back bit-exact; everything else decodes to f32.
///
/// # Examples
///
/// ```ignore
/// use petalmix_core::audio_data::{AudioDataLoader, DefaultAudioLoader, LoadOptions};
///
/// let wave = DefaultAudioLoader.load("assets/coin.wav".as_ref(), &LoadOptions::default())?;
/// ```
pub struct DefaultAudioLoader;

impl AudioDataLoader for DefaultAudioLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Wave> {
        decode_file(path, options).inspect_err(|e| {
            log::warn!("Failed to load audio file {}: {}", path.display(), e);
        })
    }
}

fn decode_file(path: &Path, options: &LoadOptions) -> Result<Wave> {
    let mut track = OpenedTrack::open(path)?;

    let data = match track.sample_size {
        SampleSize::U8 => WaveData::U8(track.decode_all::<u8>()?),
        SampleSize::I16 => WaveData::I16(track.decode_all::<i16>()?),
        SampleSize::F32 => WaveData::F32(track.decode_all::<f32>()?),
    };

    let mut wave = Wave::from_data(track.sample_rate, track.channels, data)?;
    log::debug!(
        "Decoded {}: {} frames, {} Hz, {} channels, {}",
        path.display(),
        wave.frame_count(),
        wave.sample_rate(),
        wave.channels(),
        wave.sample_size()
    );

    let target_channels = match options.convert_to_mono {
        ConvertToMono::Original => wave.channels(),
        ConvertToMono::ForceMono => 1,
    };
    let target_rate = options.target_sample_rate.unwrap_or(wave.sample_rate());
    let bits = wave.sample_size().bits();
    wave.format(target_rate, bits, target_channels)?;

    Ok(wave)
}

/// A probed container with a ready decoder for its default track.
pub(crate) struct OpenedTrack {
    pub format: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub total_frames: Option<u64>,
    /// Storage size that holds the source without loss.
    pub sample_size: SampleSize,
}

impl OpenedTrack {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                PetalMixError::DecodeFailure(format!("Failed to probe audio format: {}", e))
            })?;

        let format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            PetalMixError::DecodeFailure("No default audio track found".to_string())
        })?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| PetalMixError::DecodeFailure("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| PetalMixError::DecodeFailure("Channel count not found".to_string()))?
            .count() as u16;

        let decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                PetalMixError::DecodeFailure(format!("Failed to create decoder: {}", e))
            })?;

        let track_id = track.id;
        let total_frames = track.codec_params.n_frames;
        let sample_size = native_sample_size(&track.codec_params);

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            total_frames,
            sample_size,
        })
    }

    /// Decodes the next packet of this track, appending interleaved samples to
    /// `out`. Returns `false` at end of stream.
    pub fn decode_next<S>(&mut self, out: &mut Vec<S>) -> Result<bool>
    where
        S: Sample + ConvertibleSample,
    {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => return Ok(false), // end-of-file
                Err(Error::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(PetalMixError::DecodeFailure(format!(
                        "Error reading packet: {}",
                        e
                    )));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => return Ok(false), // also EOF in some formats
                Err(Error::DecodeError(e)) => {
                    log::debug!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(PetalMixError::DecodeFailure(format!(
                        "Error decoding packet: {}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let mut tmp = SampleBuffer::<S>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            out.extend_from_slice(tmp.samples());
            return Ok(true);
        }
    }

    fn decode_all<S>(&mut self) -> Result<Vec<S>>
    where
        S: Sample + ConvertibleSample,
    {
        let mut samples = Vec::new();
        if let Some(frames) = self.total_frames {
            samples.reserve(frames as usize * self.channels as usize);
        }
        while self.decode_next(&mut samples)? {}
        Ok(samples)
    }
}

/// Symphonia leaves `sample_format` unset for PCM containers such as WAV, so
/// the codec type is checked as well.
fn native_sample_size(params: &CodecParameters) -> SampleSize {
    match params.sample_format {
        Some(SampleFormat::U8) => return SampleSize::U8,
        Some(SampleFormat::S16) => return SampleSize::I16,
        Some(_) => return SampleSize::F32,
        None => {}
    }

    if params.codec == CODEC_TYPE_PCM_U8 {
        SampleSize::U8
    } else if params.codec == CODEC_TYPE_PCM_S16LE || params.codec == CODEC_TYPE_PCM_S16BE {
        SampleSize::I16
    } else {
        SampleSize::F32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_io_error() {
        let result = DefaultAudioLoader.load(
            Path::new("definitely/not/here.wav"),
            &LoadOptions::default(),
        );
        assert!(matches!(result, Err(PetalMixError::Io(_))));
    }

    #[test]
    fn garbage_file_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"this is not a riff header at all").unwrap();

        let result = DefaultAudioLoader.load(&path, &LoadOptions::default());
        assert!(matches!(result, Err(PetalMixError::DecodeFailure(_))));
    }

    #[test]
    fn pcm_wav_keeps_native_sample_size() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("u8.wav", Wave::from_samples(8000, 1, vec![0u8, 64, 128, 255]).unwrap()),
            ("i16.wav", Wave::from_samples(8000, 2, vec![-32768i16, -1, 0, 32767]).unwrap()),
            ("f32.wav", Wave::from_samples(8000, 1, vec![-0.5f32, 0.25]).unwrap()),
        ];

        for (name, wave) in cases {
            let path = dir.path().join(name);
            wave.export(&path).unwrap();
            let loaded = DefaultAudioLoader.load(&path, &LoadOptions::default()).unwrap();
            assert_eq!(loaded.sample_size(), wave.sample_size(), "{}", name);
            assert_eq!(loaded, wave, "{}", name);
        }
    }

    #[test]
    fn force_mono_and_target_rate_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let stereo = Wave::from_samples(16000, 2, vec![0.5f32; 16000 * 2]).unwrap();
        stereo.export(&path).unwrap();

        let options = LoadOptions::new()
            .convert_to_mono(ConvertToMono::ForceMono)
            .target_sample_rate(8000);
        let wave = DefaultAudioLoader.load(&path, &options).unwrap();

        assert_eq!(wave.channels(), 1);
        assert_eq!(wave.sample_rate(), 8000);
        assert_eq!(wave.frame_count(), 8000);
    }
}
