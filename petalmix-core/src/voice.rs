//! Mixer-side state of one playing sound or stream.
//!
//! Every handle owns an `Arc<VoiceShared>`; the mixer keeps a clone. Controls
//! are atomics, the reader sits behind a mutex that the audio thread only ever
//! `try_lock`s.

use crate::playback::VoiceControls;
use crate::queue::QueueConsumer;
use crate::sound::SoundBuffer;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Pull-style generator for an [`crate::AudioStream`].
///
/// Called on the audio thread with a buffer of interleaved samples (at the
/// stream's channel count) and its frame count. The buffer is zeroed first.
pub type AudioStreamCallback = dyn FnMut(&mut [f32], usize) + Send;

pub(crate) struct VoiceShared {
    pub controls: VoiceControls,
    reader: Mutex<VoiceReader>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl VoiceShared {
    pub fn new(reader: VoiceReader, sample_rate: u32, channels: u16, looping: bool) -> Self {
        Self {
            controls: VoiceControls::new(looping),
            reader: Mutex::new(reader),
            sample_rate,
            channels: channels as usize,
        }
    }

    /// Blocking lock for the application thread.
    pub fn lock_reader(&self) -> MutexGuard<'_, VoiceReader> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking lock for the audio thread.
    pub fn try_lock_reader(&self) -> Option<MutexGuard<'_, VoiceReader>> {
        self.reader.try_lock().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    Playing,
    /// The source ran out and does not loop.
    Finished,
}

pub(crate) enum VoiceReader {
    Static(StaticReader),
    Stream(StreamReader),
}

impl VoiceReader {
    /// Renders `frames` frames at the voice's channel count into `out`,
    /// advancing the source by `step` source frames per output frame.
    pub fn read(
        &mut self,
        out: &mut [f32],
        frames: usize,
        step: f64,
        controls: &VoiceControls,
    ) -> ReadOutcome {
        match self {
            Self::Static(reader) => reader.read(out, frames, step, controls.is_looping()),
            Self::Stream(reader) => {
                let consumed = reader.read(out, frames, step);
                controls.add_frames_played(consumed);
                ReadOutcome::Playing
            }
        }
    }

    /// Rewinds to the first frame.
    pub fn rewind(&mut self) {
        match self {
            Self::Static(reader) => reader.position = 0.0,
            Self::Stream(reader) => reader.frac = 0.0,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut StreamReader> {
        match self {
            Self::Stream(reader) => Some(reader),
            Self::Static(_) => None,
        }
    }
}

/// Reads a fully resident [`SoundBuffer`] with linear interpolation.
pub(crate) struct StaticReader {
    buffer: Arc<SoundBuffer>,
    position: f64,
}

impl StaticReader {
    pub fn new(buffer: Arc<SoundBuffer>) -> Self {
        Self {
            buffer,
            position: 0.0,
        }
    }

    fn read(&mut self, out: &mut [f32], frames: usize, step: f64, looping: bool) -> ReadOutcome {
        let channels = self.buffer.channels as usize;
        let out = &mut out[..frames * channels];

        // Being rewritten by Sound::update, sit this buffer out
        let Ok(samples) = self.buffer.samples.try_read() else {
            out.fill(0.0);
            return ReadOutcome::Playing;
        };

        let total = samples.len() / channels;
        if total == 0 {
            out.fill(0.0);
            return ReadOutcome::Finished;
        }
        let end = total as f64;

        for i in 0..frames {
            if self.position >= end {
                if looping {
                    self.position %= end;
                } else {
                    out[i * channels..].fill(0.0);
                    return ReadOutcome::Finished;
                }
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = if index + 1 < total {
                index + 1
            } else if looping {
                0
            } else {
                index
            };

            for ch in 0..channels {
                let a = samples[index * channels + ch];
                let b = samples[next * channels + ch];
                out[i * channels + ch] = a + (b - a) * frac;
            }

            self.position += step;
        }

        if !looping && self.position >= end {
            ReadOutcome::Finished
        } else {
            ReadOutcome::Playing
        }
    }
}

/// Reads a raw buffer queue (or a pull callback) one frame at a time.
///
/// A frame leaves the queue only when it starts playing; the following frame
/// is peeked for interpolation. The queue therefore never runs ahead of what
/// has actually been heard.
pub(crate) struct StreamReader {
    consumer: QueueConsumer,
    channels: usize,
    current: [f32; 2],
    next: [f32; 2],
    has_current: bool,
    frac: f64,
    // Set when the last read ran out of data, cleared by the next fetched frame
    starved: bool,
    callback: Option<Box<AudioStreamCallback>>,
    staging: Vec<f32>,
    staging_pos: usize,
}

impl StreamReader {
    pub fn new(consumer: QueueConsumer) -> Self {
        let channels = consumer.layout().channels;
        Self {
            consumer,
            channels,
            current: [0.0; 2],
            next: [0.0; 2],
            has_current: false,
            frac: 0.0,
            starved: false,
            callback: None,
            staging: Vec::new(),
            staging_pos: 0,
        }
    }

    /// Drops everything queued and the frame in flight.
    pub fn clear(&mut self) -> usize {
        self.has_current = false;
        self.frac = 0.0;
        self.starved = false;
        self.staging_pos = self.staging.len();
        self.consumer.clear()
    }

    pub fn set_callback(&mut self, callback: Box<AudioStreamCallback>) {
        let slot = self.consumer.layout().slot_samples();
        self.staging = vec![0.0; slot];
        self.staging_pos = slot;
        self.callback = Some(callback);
    }

    pub fn clear_callback(&mut self) -> bool {
        self.staging = Vec::new();
        self.staging_pos = 0;
        self.callback.take().is_some()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// True once playback has consumed every frame it was given.
    pub fn is_starved(&self) -> bool {
        self.starved
    }

    fn refill_staging(&mut self) -> bool {
        let Some(callback) = self.callback.as_mut() else {
            return false;
        };
        if self.staging_pos >= self.staging.len() {
            self.staging.fill(0.0);
            let frames = self.staging.len() / self.channels;
            callback(&mut self.staging, frames);
            self.staging_pos = 0;
        }
        true
    }

    /// Takes the next frame out of the source as the frame being played.
    fn fetch_current(&mut self) -> bool {
        let channels = self.channels;
        let fetched = if self.refill_staging() {
            let pos = self.staging_pos;
            self.current[..channels].copy_from_slice(&self.staging[pos..pos + channels]);
            self.staging_pos += channels;
            true
        } else {
            self.consumer.pop_frame(&mut self.current[..channels])
        };
        self.has_current = fetched;
        self.starved = !fetched;
        fetched
    }

    /// Looks at the frame after the current one without taking it.
    fn peek_next(&mut self) -> bool {
        let channels = self.channels;
        if self.refill_staging() {
            let pos = self.staging_pos;
            self.next[..channels].copy_from_slice(&self.staging[pos..pos + channels]);
            true
        } else {
            self.consumer.peek_frame(&mut self.next[..channels])
        }
    }

    /// Returns the number of source frames consumed.
    fn read(&mut self, out: &mut [f32], frames: usize, step: f64) -> u64 {
        let channels = self.channels;
        let mut consumed = 0;

        for i in 0..frames {
            if !self.has_current && !self.fetch_current() {
                // Starved: silence for the rest of this buffer
                self.frac = 0.0;
                out[i * channels..frames * channels].fill(0.0);
                break;
            }

            let next = if self.peek_next() {
                self.next
            } else {
                self.current
            };
            let frac = self.frac as f32;
            for ch in 0..channels {
                let a = self.current[ch];
                out[i * channels + ch] = a + (next[ch] - a) * frac;
            }

            self.frac += step;
            while self.frac >= 1.0 {
                self.frac -= 1.0;
                consumed += 1;
                self.has_current = false;
                // Steps above one frame skip whole frames
                if self.frac >= 1.0 && !self.fetch_current() {
                    self.frac = 0.0;
                    break;
                }
            }
        }

        consumed
    }
}
