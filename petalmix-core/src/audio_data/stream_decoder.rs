use crate::audio_data::Wave;
use crate::audio_data::default_loader::OpenedTrack;
use crate::error::{PetalMixError, Result};
use std::path::Path;
use symphonia::core::formats::{SeekMode, SeekTo};
use symphonia::core::units::Time;

/// Incremental PCM source behind a [`crate::Music`].
///
/// Produces interleaved f32 frames on demand so that only a small window of
/// the file is ever decoded ahead of playback.
pub trait StreamDecoder: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Total length in frames, when the container reports it.
    fn total_frames(&self) -> Option<u64>;

    /// Fills `out` with up to `out.len() / channels` frames.
    ///
    /// # Returns
    ///
    /// The number of frames written. Fewer than requested means end of stream.
    fn read_frames(&mut self, out: &mut [f32]) -> Result<usize>;

    /// Repositions the decoder at `frame`.
    fn seek(&mut self, frame: u64) -> Result<()>;
}

/// File-backed decoder built on Symphonia.
pub struct SymphoniaDecoder {
    track: OpenedTrack,
    pending: Vec<f32>,
    pending_pos: usize,
    // Samples to discard after a seek landed before the requested frame
    skip: usize,
    finished: bool,
}

impl SymphoniaDecoder {
    /// Opens `path` and prepares its default track for streaming.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::Io`] if the file cannot be opened and
    /// [`PetalMixError::DecodeFailure`] if it is not a decodable audio file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let track = OpenedTrack::open(path).inspect_err(|e| {
            log::warn!("Failed to open music stream {}: {}", path.display(), e);
        })?;
        Ok(Self {
            track,
            pending: Vec::new(),
            pending_pos: 0,
            skip: 0,
            finished: false,
        })
    }
}

impl StreamDecoder for SymphoniaDecoder {
    fn sample_rate(&self) -> u32 {
        self.track.sample_rate
    }

    fn channels(&self) -> u16 {
        self.track.channels
    }

    fn total_frames(&self) -> Option<u64> {
        self.track.total_frames
    }

    fn read_frames(&mut self, out: &mut [f32]) -> Result<usize> {
        let channels = self.track.channels as usize;
        let wanted = out.len() / channels * channels;
        let mut written = 0;

        while written < wanted {
            if self.pending_pos >= self.pending.len() {
                if self.finished {
                    break;
                }
                self.pending.clear();
                self.pending_pos = 0;
                if !self.track.decode_next(&mut self.pending)? {
                    self.finished = true;
                    break;
                }
                continue;
            }

            if self.skip > 0 {
                let dropped = self.skip.min(self.pending.len() - self.pending_pos);
                self.pending_pos += dropped;
                self.skip -= dropped;
                continue;
            }

            let take = (wanted - written).min(self.pending.len() - self.pending_pos);
            out[written..written + take]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
            written += take;
            self.pending_pos += take;
        }

        Ok(written / channels)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let seconds = frame as f64 / self.track.sample_rate as f64;
        let seeked = self
            .track
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track.track_id),
                },
            )
            .map_err(|e| PetalMixError::DecodeFailure(format!("Seek failed: {}", e)))?;
        self.track.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.skip = seeked.required_ts.saturating_sub(seeked.actual_ts) as usize
            * self.track.channels as usize;
        self.finished = false;
        Ok(())
    }
}

/// Streams an in-memory [`Wave`] as if it were a file.
pub struct WaveDecoder {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    cursor: usize,
}

impl WaveDecoder {
    pub fn new(wave: &Wave) -> Self {
        Self {
            samples: wave.samples(),
            sample_rate: wave.sample_rate(),
            channels: wave.channels(),
            cursor: 0,
        }
    }
}

impl StreamDecoder for WaveDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn total_frames(&self) -> Option<u64> {
        Some((self.samples.len() / self.channels as usize) as u64)
    }

    fn read_frames(&mut self, out: &mut [f32]) -> Result<usize> {
        let channels = self.channels as usize;
        let remaining = self.samples.len() - self.cursor;
        let take = (out.len() / channels * channels).min(remaining);
        out[..take].copy_from_slice(&self.samples[self.cursor..self.cursor + take]);
        self.cursor += take;
        Ok(take / channels)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let position = frame as usize * self.channels as usize;
        if position > self.samples.len() {
            return Err(PetalMixError::InvalidRange(format!(
                "seek to frame {} past end ({} frames)",
                frame,
                self.samples.len() / self.channels as usize
            )));
        }
        self.cursor = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_wave(frames: usize) -> Wave {
        let samples: Vec<f32> = (0..frames * 2).map(|i| i as f32 / 1000.0).collect();
        Wave::from_samples(8000, 2, samples).unwrap()
    }

    #[test]
    fn wave_decoder_reads_then_ends() {
        let mut decoder = WaveDecoder::new(&counting_wave(5));
        let mut out = [0.0f32; 6];

        assert_eq!(decoder.read_frames(&mut out).unwrap(), 3);
        assert_eq!(out[0], 0.0);
        assert_eq!(decoder.read_frames(&mut out).unwrap(), 2);
        assert_eq!(out[0], 0.006);
        assert_eq!(decoder.read_frames(&mut out).unwrap(), 0);
    }

    #[test]
    fn wave_decoder_seeks() {
        let mut decoder = WaveDecoder::new(&counting_wave(5));
        decoder.seek(4).unwrap();
        let mut out = [0.0f32; 4];
        assert_eq!(decoder.read_frames(&mut out).unwrap(), 1);
        assert_eq!(out[..2], [0.008, 0.009]);
        assert!(decoder.seek(6).is_err());
    }

    #[test]
    fn symphonia_decoder_streams_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..3000).map(|i| (i % 100) as i16 * 100).collect();
        Wave::from_samples(8000, 1, samples.clone())
            .unwrap()
            .export(&path)
            .unwrap();

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 8000);
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.total_frames(), Some(3000));

        let mut collected = Vec::new();
        let mut chunk = [0.0f32; 700];
        loop {
            let frames = decoder.read_frames(&mut chunk).unwrap();
            collected.extend_from_slice(&chunk[..frames]);
            if frames < chunk.len() {
                break;
            }
        }

        assert_eq!(collected.len(), 3000);
        assert_eq!(collected[150], samples[150] as f32 / 32768.0);

        decoder.seek(0).unwrap();
        assert_eq!(decoder.read_frames(&mut chunk).unwrap(), 700);
        assert_eq!(chunk[1], samples[1] as f32 / 32768.0);
    }
}
