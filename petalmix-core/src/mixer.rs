// Mixer module - sums every playing voice into the device buffer
// and runs the mixed processor chain on the result

use crate::events::{EventSink, PetalMixEvent};
use crate::playback::{PlayState, VoiceId, pan_gains};
use crate::processor::{MixedProcessor, ProcessorChain};
use crate::voice::{ReadOutcome, VoiceShared};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Registry and chain mutations posted by the application thread. They are
/// applied by the mixer at the start of the next render.
pub(crate) enum MixerCommand {
    AddVoice {
        id: VoiceId,
        voice: Arc<VoiceShared>,
    },
    RemoveVoice(VoiceId),
    AttachProcessor(Arc<MixedProcessor>),
    DetachProcessor(Arc<MixedProcessor>),
    AttachVoiceProcessor {
        id: VoiceId,
        processor: Arc<MixedProcessor>,
    },
    DetachVoiceProcessor {
        id: VoiceId,
        processor: Arc<MixedProcessor>,
    },
}

struct MixerVoice {
    id: VoiceId,
    shared: Arc<VoiceShared>,
    processors: ProcessorChain,
}

pub(crate) struct Mixer {
    sample_rate: u32,
    channels: usize,
    max_voices: usize,
    voices: Vec<MixerVoice>,
    processors: ProcessorChain,
    commands: Receiver<MixerCommand>,
    events: EventSink,
    master_volume: Arc<AtomicU32>,
    frames_rendered: Arc<AtomicU64>,
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn new(
        sample_rate: u32,
        channels: u16,
        max_voices: usize,
        block_size: usize,
        commands: Receiver<MixerCommand>,
        events: EventSink,
        master_volume: Arc<AtomicU32>,
        frames_rendered: Arc<AtomicU64>,
    ) -> Self {
        Self {
            sample_rate,
            channels: channels as usize,
            max_voices,
            voices: Vec::with_capacity(max_voices),
            processors: ProcessorChain::new(),
            commands,
            events,
            master_volume,
            frames_rendered,
            // Voices are at most stereo
            scratch: vec![0.0; block_size * 2],
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MixerCommand::AddVoice { id, voice } => {
                    if self.voices.len() >= self.max_voices {
                        log::warn!(
                            "Mixer: {} voices registered, above the configured maximum of {}",
                            self.voices.len() + 1,
                            self.max_voices
                        );
                    }
                    self.voices.push(MixerVoice {
                        id,
                        shared: voice,
                        processors: ProcessorChain::new(),
                    });
                }
                MixerCommand::RemoveVoice(id) => {
                    if let Some(index) = self.voices.iter().position(|v| v.id == id) {
                        self.voices.swap_remove(index);
                    }
                }
                MixerCommand::AttachProcessor(processor) => self.processors.attach(processor),
                MixerCommand::DetachProcessor(processor) => {
                    self.processors.detach(&processor);
                }
                MixerCommand::AttachVoiceProcessor { id, processor } => {
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                        voice.processors.attach(processor);
                    }
                }
                MixerCommand::DetachVoiceProcessor { id, processor } => {
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                        voice.processors.detach(&processor);
                    }
                }
            }
        }
    }

    /// Renders one interleaved buffer at the device channel count.
    ///
    /// Every playing voice is resampled to the device rate, run through its
    /// own processors, channel-mapped, scaled by `volume * master` and panned,
    /// then summed. The global chain runs on the sum, which is finally
    /// clamped to [-1, 1].
    ///
    /// # Returns
    ///
    /// The number of frames written (always the whole buffer).
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        self.apply_commands();
        out.fill(0.0);

        let frames = out.len() / self.channels;
        if frames == 0 {
            return 0;
        }

        if self.scratch.len() < frames * 2 {
            log::debug!("Mixer: growing scratch buffer to {} frames", frames);
            self.scratch.resize(frames * 2, 0.0);
        }

        let master = f32::from_bits(self.master_volume.load(Ordering::Relaxed));

        for voice in &mut self.voices {
            let controls = &voice.shared.controls;
            if controls.state() != PlayState::Playing {
                continue;
            }

            let Some(mut reader) = voice.shared.try_lock_reader() else {
                log::warn!("Mixer: voice {} busy, skipping this buffer", voice.id);
                continue;
            };

            let source_channels = voice.shared.channels;
            let scratch = &mut self.scratch[..frames * source_channels];
            let step = voice.shared.sample_rate as f64 / self.sample_rate as f64
                * controls.pitch() as f64;

            let outcome = reader.read(scratch, frames, step, controls);
            if outcome == ReadOutcome::Finished
                && controls.transition(PlayState::Playing, PlayState::Stopped)
            {
                reader.rewind();
                self.events
                    .emit(PetalMixEvent::SoundFinished { voice_id: voice.id });
            }
            drop(reader);

            voice.processors.process(scratch, frames);
            mix_voice(
                out,
                self.channels,
                scratch,
                source_channels,
                controls.volume() * master,
                controls.pan(),
            );
        }

        self.processors.process(out, frames);

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);
        frames
    }

    #[cfg(test)]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

/// Adds one voice's frames into `out`, mapping mono/stereo in both directions.
fn mix_voice(
    out: &mut [f32],
    out_channels: usize,
    source: &[f32],
    source_channels: usize,
    gain: f32,
    pan: f32,
) {
    let (pan_left, pan_right) = pan_gains(pan);

    for (dst, frame) in out
        .chunks_exact_mut(out_channels)
        .zip(source.chunks_exact(source_channels))
    {
        let (left, right) = if source_channels == 1 {
            (frame[0], frame[0])
        } else {
            (frame[0], frame[1])
        };
        let left = left * pan_left * gain;
        let right = right * pan_right * gain;

        if out_channels == 1 {
            dst[0] += (left + right) * 0.5;
        } else {
            dst[0] += left;
            dst[1] += right;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::SampleSize;
    use crate::processor::mixed_processor;
    use crate::sound::SoundBuffer;
    use crate::voice::{StaticReader, VoiceReader};
    use crossbeam_channel::{Sender, unbounded};
    use std::sync::RwLock;

    struct Harness {
        mixer: Mixer,
        commands: Sender<MixerCommand>,
        events: Receiver<PetalMixEvent>,
        master: Arc<AtomicU32>,
    }

    fn harness(channels: u16) -> Harness {
        let (commands, command_rx) = unbounded();
        let (event_tx, events) = EventSink::new(64);
        let master = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let mixer = Mixer::new(
            48000,
            channels,
            8,
            64,
            command_rx,
            event_tx,
            master.clone(),
            Arc::new(AtomicU64::new(0)),
        );
        Harness {
            mixer,
            commands,
            events,
            master,
        }
    }

    fn constant_voice(value: f32, frames: usize, channels: u16, looping: bool) -> Arc<VoiceShared> {
        let buffer = Arc::new(SoundBuffer {
            samples: RwLock::new(vec![value; frames * channels as usize]),
            sample_rate: 48000,
            channels,
            sample_size: SampleSize::F32,
        });
        let voice = Arc::new(VoiceShared::new(
            VoiceReader::Static(StaticReader::new(buffer)),
            48000,
            channels,
            looping,
        ));
        voice.controls.set_state(PlayState::Playing);
        voice
    }

    #[test]
    fn sums_voices_and_clamps() {
        let mut h = harness(2);
        for id in 0..3 {
            h.commands
                .send(MixerCommand::AddVoice {
                    id: VoiceId(id),
                    voice: constant_voice(0.4, 16, 1, true),
                })
                .unwrap();
        }

        let mut out = [0.0f32; 8];
        assert_eq!(h.mixer.render(&mut out), 4);
        assert_eq!(h.mixer.voice_count(), 3);
        assert!(out.iter().all(|&s| s == 1.0), "{:?}", out);
    }

    #[test]
    fn master_volume_and_pan_scale_voice() {
        let mut h = harness(2);
        let voice = constant_voice(0.5, 16, 1, true);
        voice.controls.set_pan(1.0);
        h.master.store(0.5f32.to_bits(), Ordering::Relaxed);
        h.commands
            .send(MixerCommand::AddVoice {
                id: VoiceId(1),
                voice,
            })
            .unwrap();

        let mut out = [0.0f32; 4];
        h.mixer.render(&mut out);
        assert_eq!(out, [0.0, 0.25, 0.0, 0.25]);
    }

    #[test]
    fn stereo_voice_folds_to_mono_device() {
        let mut h = harness(1);
        let buffer = Arc::new(SoundBuffer {
            samples: RwLock::new(vec![0.2, 0.6, 0.2, 0.6]),
            sample_rate: 48000,
            channels: 2,
            sample_size: SampleSize::F32,
        });
        let voice = Arc::new(VoiceShared::new(
            VoiceReader::Static(StaticReader::new(buffer)),
            48000,
            2,
            true,
        ));
        voice.controls.set_state(PlayState::Playing);
        h.commands
            .send(MixerCommand::AddVoice {
                id: VoiceId(1),
                voice,
            })
            .unwrap();

        let mut out = [0.0f32; 2];
        h.mixer.render(&mut out);
        for sample in out {
            assert!((sample - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn finished_voice_stops_and_reports() {
        let mut h = harness(1);
        let voice = constant_voice(0.1, 3, 1, false);
        h.commands
            .send(MixerCommand::AddVoice {
                id: VoiceId(9),
                voice: voice.clone(),
            })
            .unwrap();

        let mut out = [0.0f32; 8];
        h.mixer.render(&mut out);

        assert_eq!(voice.controls.state(), PlayState::Stopped);
        assert_eq!(
            h.events.try_recv().unwrap(),
            PetalMixEvent::SoundFinished {
                voice_id: VoiceId(9)
            }
        );
    }

    #[test]
    fn removed_voice_is_silent() {
        let mut h = harness(1);
        h.commands
            .send(MixerCommand::AddVoice {
                id: VoiceId(1),
                voice: constant_voice(0.3, 16, 1, true),
            })
            .unwrap();
        h.commands.send(MixerCommand::RemoveVoice(VoiceId(1))).unwrap();

        let mut out = [1.0f32; 4];
        h.mixer.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(h.mixer.voice_count(), 0);
    }

    #[test]
    fn voice_processor_runs_before_summing() {
        let mut h = harness(1);
        let invert = mixed_processor(|buffer, _| buffer.iter_mut().for_each(|s| *s = -*s));
        h.commands
            .send(MixerCommand::AddVoice {
                id: VoiceId(1),
                voice: constant_voice(0.3, 16, 1, true),
            })
            .unwrap();
        h.commands
            .send(MixerCommand::AddVoice {
                id: VoiceId(2),
                voice: constant_voice(0.1, 16, 1, true),
            })
            .unwrap();
        h.commands
            .send(MixerCommand::AttachVoiceProcessor {
                id: VoiceId(2),
                processor: invert,
            })
            .unwrap();

        let mut out = [0.0f32; 2];
        h.mixer.render(&mut out);
        for sample in out {
            assert!((sample - 0.2).abs() < 1e-6);
        }
    }
}
