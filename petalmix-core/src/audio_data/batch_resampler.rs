use crate::error::{PetalMixError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline resampler used by [`super::Wave::format`] and the loaders.
///
/// Processes the whole signal in fixed-size chunks, compensates for the
/// filter delay and trims the result to `frames * target / source` frames.
pub struct BatchResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl BatchResampler {
    /// Creates a new batch resampler for offline audio processing.
    ///
    /// # Arguments
    /// * `source_sample_rate` - The sample rate of the input audio
    /// * `target_sample_rate` - The desired sample rate of the output audio
    /// * `channels` - Number of channels in the audio data
    /// * `chunk_size` - Optional size of processing chunks (defaults to 1024)
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(PetalMixError::InvalidFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(PetalMixError::InvalidFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    /// Number of frames produced for `frames` input frames.
    pub fn output_frames(&self, frames: usize) -> usize {
        (frames as u64 * self.target_sample_rate as u64 / self.source_sample_rate as u64) as usize
    }

    /// Resamples interleaved audio.
    ///
    /// # Data Format
    /// - **Input**: INTERLEAVED `[L0, R0, L1, R1, ...]`
    /// - **Output**: INTERLEAVED, at the target rate
    ///
    /// # Errors
    /// Returns [`PetalMixError::InvalidFormat`] if rubato rejects the rates or a chunk.
    pub fn resample_interleaved(&self, interleaved_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved_samples.to_vec());
        }

        let channels = self.channels as usize;
        let input_frames = interleaved_samples.len() / channels;
        let expected_frames = self.output_frames(input_frames);

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            channels,
        )
        .map_err(|e| PetalMixError::InvalidFormat(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let wanted = delay + expected_frames;

        // De-interleave into planar buffers
        let planar: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                interleaved_samples
                    .chunks_exact(channels)
                    .map(|frame| frame[ch])
                    .collect()
            })
            .collect();

        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
        let mut input_index = 0;

        // Keep feeding (zero padded past the end) until the delayed tail is flushed
        while output[0].len() < wanted {
            let needed = resampler.input_frames_next();
            let mut chunk = vec![vec![0.0f32; needed]; channels];
            if input_index < input_frames {
                let take = needed.min(input_frames - input_index);
                for (dst, src) in chunk.iter_mut().zip(planar.iter()) {
                    dst[..take].copy_from_slice(&src[input_index..input_index + take]);
                }
                input_index += take;
            }

            let waves_out = resampler
                .process(&chunk, None)
                .map_err(|e| PetalMixError::InvalidFormat(format!("Resampling error: {}", e)))?;

            for (dst, src) in output.iter_mut().zip(waves_out.iter()) {
                dst.extend_from_slice(src);
            }
        }

        let mut interleaved = Vec::with_capacity(expected_frames * channels);
        for frame_idx in delay..wanted {
            for channel in &output {
                interleaved.push(channel[frame_idx]);
            }
        }

        Ok(interleaved)
    }

    /// Returns the target (output) sample rate in Hz.
    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Returns the source (input) sample rate in Hz.
    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }
}
