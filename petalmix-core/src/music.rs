use crate::audio_data::{StreamDecoder, SymphoniaDecoder, Wave, WaveDecoder};
use crate::device::AudioDevice;
use crate::error::{PetalMixError, Result};
use crate::events::PetalMixEvent;
use crate::playback::PlayState;
use crate::processor::MixedProcessor;
use crate::stream::{AudioStream, StreamFormat};
use std::path::Path;
use std::sync::Arc;

/// A long track decoded incrementally into an [`AudioStream`].
///
/// No thread is spawned: the owner calls [`update`](Self::update) once per
/// frame and each call decodes just enough to refill processed slots.
/// Music loops forever by default; see [`set_loop_count`](Self::set_loop_count).
pub struct Music {
    stream: AudioStream,
    decoder: Box<dyn StreamDecoder>,
    // Passes over the track to play, 0 for endless
    loop_count: u32,
    passes_left: u32,
    chunk: Vec<f32>,
    total_frames: Option<u64>,
    // Decoder frame that playback position zero corresponds to (moved by seek)
    position_base: u64,
    // Frames decoded since the decoder last went back to the start
    since_rewind: u64,
    drained: bool,
}

impl Music {
    /// Opens `path` for streaming.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::Io`] or [`PetalMixError::DecodeFailure`] if
    /// the file cannot be opened as audio.
    pub fn load(device: &AudioDevice, path: impl AsRef<Path>) -> Result<Self> {
        let decoder = SymphoniaDecoder::open(path)?;
        Self::from_decoder(device, Box::new(decoder))
    }

    /// Streams an in-memory wave through the same path as a file.
    pub fn from_wave(device: &AudioDevice, wave: &Wave) -> Result<Self> {
        if wave.is_empty() {
            return Err(PetalMixError::InvalidHandle(
                "cannot stream an empty wave".to_string(),
            ));
        }
        Self::from_decoder(device, Box::new(WaveDecoder::new(wave)))
    }

    /// Plays any [`StreamDecoder`].
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidFormat`] if the decoder is not mono or
    /// stereo or reports a zero sample rate.
    pub fn from_decoder(device: &AudioDevice, decoder: Box<dyn StreamDecoder>) -> Result<Self> {
        let format = StreamFormat::new(decoder.sample_rate(), 32, decoder.channels())?;
        let desc = device.desc();
        let stream = AudioStream::with_buffer(
            device,
            format,
            desc.stream_buffer_frames,
            desc.stream_buffer_count,
        )?;
        let total_frames = decoder.total_frames();

        log::debug!(
            "Music {} opened: {} Hz, {} channels, {} frames",
            stream.id(),
            format.sample_rate,
            format.channels,
            total_frames.map_or_else(|| "unknown".to_string(), |f| f.to_string())
        );

        Ok(Self {
            chunk: vec![0.0; stream.buffer_frames() * format.channels as usize],
            stream,
            decoder,
            loop_count: 0,
            passes_left: 0,
            total_frames,
            position_base: 0,
            since_rewind: 0,
            drained: false,
        })
    }

    /// Refills every processed slot from the decoder.
    ///
    /// At the end of the data a track with passes left seeks back to its
    /// start and reports [`PetalMixEvent::StreamLooped`]; otherwise the queue
    /// is left to play out, after which the music stops and reports
    /// [`PetalMixEvent::StreamFinished`].
    pub fn update(&mut self) {
        if self.stream.state() == PlayState::Stopped {
            return;
        }

        let channels = self.stream.format().channels as usize;
        let chunk_frames = self.chunk.len() / channels;

        while !self.drained && self.stream.is_buffer_processed() {
            let frames = match self.decoder.read_frames(&mut self.chunk) {
                Ok(frames) => frames,
                Err(e) => {
                    log::warn!("Music {}: decode error, ending stream: {}", self.stream.id(), e);
                    0
                }
            };

            if frames > 0 {
                self.stream.update(&self.chunk[..frames * channels]);
                self.since_rewind += frames as u64;
            }

            if frames < chunk_frames {
                // An empty pass would loop forever
                let loops = self.loop_count == 0 || self.passes_left > 1;
                if loops && self.since_rewind > 0 {
                    if let Err(e) = self.decoder.seek(0) {
                        log::warn!("Music {}: failed to loop: {}", self.stream.id(), e);
                        self.drained = true;
                        continue;
                    }
                    self.since_rewind = 0;
                    if self.loop_count > 0 {
                        self.passes_left -= 1;
                    }
                    log::debug!("Music {} looped", self.stream.id());
                    self.stream.link().emit(PetalMixEvent::StreamLooped {
                        voice_id: self.stream.id(),
                    });
                } else {
                    self.drained = true;
                }
            }
        }

        if self.drained && self.stream.queued_frames() == 0 && self.stream.has_run_dry() {
            self.stop();
            log::debug!("Music {} finished", self.stream.id());
            self.stream.link().emit(PetalMixEvent::StreamFinished {
                voice_id: self.stream.id(),
            });
        }
    }

    /// Starts playback and queues the first slots right away.
    pub fn play(&mut self) {
        self.stream.play();
        self.update();
    }

    pub fn pause(&self) {
        self.stream.pause();
    }

    pub fn resume(&self) {
        self.stream.resume();
    }

    /// Stops playback and rewinds to the start.
    pub fn stop(&mut self) {
        self.stream.stop();
        if let Err(e) = self.decoder.seek(0) {
            log::warn!("Music {}: failed to rewind: {}", self.stream.id(), e);
        }
        self.position_base = 0;
        self.since_rewind = 0;
        self.passes_left = self.loop_count;
        self.drained = false;
    }

    pub fn is_playing(&self) -> bool {
        self.stream.is_playing()
    }

    pub fn state(&self) -> PlayState {
        self.stream.state()
    }

    pub fn set_volume(&self, volume: f32) {
        self.stream.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.stream.volume()
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.stream.set_pitch(pitch);
    }

    pub fn pitch(&self) -> f32 {
        self.stream.pitch()
    }

    pub fn set_pan(&self, pan: f32) {
        self.stream.set_pan(pan);
    }

    pub fn pan(&self) -> f32 {
        self.stream.pan()
    }

    /// `true` loops endlessly, `false` plays a single pass.
    pub fn set_looping(&mut self, looping: bool) {
        self.set_loop_count(if looping { 0 } else { 1 });
    }

    pub fn is_looping(&self) -> bool {
        self.loop_count != 1
    }

    /// Plays the track `count` times in total before finishing; 0 loops
    /// endlessly. Restarts the countdown for the current pass.
    pub fn set_loop_count(&mut self, count: u32) {
        self.loop_count = count;
        self.passes_left = count;
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Jumps to `seconds` from the start. Queued audio is discarded; the play
    /// state is kept.
    pub fn seek(&mut self, seconds: f32) {
        let rate = self.stream.format().sample_rate;
        let mut frame = (seconds.max(0.0) as f64 * rate as f64) as u64;
        if let Some(total) = self.total_frames {
            frame = frame.min(total);
        }

        if let Err(e) = self.decoder.seek(frame) {
            log::warn!("Music {}: seek to {:.3}s failed: {}", self.stream.id(), seconds, e);
            return;
        }

        self.stream.flush();
        self.stream.reset_frames_played();
        self.position_base = frame;
        self.since_rewind = frame;
        self.drained = false;

        if self.stream.state() != PlayState::Stopped {
            self.update();
        }
    }

    /// Total length in seconds, 0 when the decoder cannot tell.
    pub fn time_length(&self) -> f32 {
        let rate = self.stream.format().sample_rate as f64;
        self.total_frames
            .map_or(0.0, |frames| (frames as f64 / rate) as f32)
    }

    /// Seconds played within the current pass over the track.
    pub fn time_played(&self) -> f32 {
        let mut frame = self.position_base + self.stream.frames_played();
        if let Some(total) = self.total_frames.filter(|&t| t > 0) {
            frame %= total;
        }
        (frame as f64 / self.stream.format().sample_rate as f64) as f32
    }

    pub fn attach_processor(&self, processor: &Arc<MixedProcessor>) {
        self.stream.attach_processor(processor);
    }

    pub fn detach_processor(&self, processor: &Arc<MixedProcessor>) {
        self.stream.detach_processor(processor);
    }

    /// The stream the music is decoded into.
    pub fn stream(&self) -> &AudioStream {
        &self.stream
    }
}
