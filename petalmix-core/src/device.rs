use crate::config::PetalMixDeviceDesc;
use crate::engine::PetalMixEngine;
use crate::error::Result;
use crate::events::{EventSink, PetalMixEvent};
use crate::mixer::{Mixer, MixerCommand};
use crate::playback::VoiceId;
use crate::processor::MixedProcessor;
use crate::voice::VoiceShared;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// The single audio output of the process.
///
/// `AudioDevice` owns the mixer, the output backend, the master volume and the
/// global mixed processor chain. Streams, sounds and music are created against
/// it and keep a lightweight link back to the mixer.
///
/// # Architecture
///
/// - **Main thread**: owns the device and every handle, issues control calls
/// - **Audio thread**: the backend callback, which renders the mix. Handle
///   registration and processor changes reach it through a command channel
///
/// A device can also be created [`headless`](Self::headless), in which case
/// nothing is opened and the owner pulls audio with [`render`](Self::render).
pub struct AudioDevice {
    link: DeviceLink,
    mixer: Arc<Mutex<Mixer>>,
    engine: Option<PetalMixEngine>,
    events: Receiver<PetalMixEvent>,
    master_volume: Arc<AtomicU32>,
    frames_rendered: Arc<AtomicU64>,
}

impl AudioDevice {
    /// Opens the default output device and starts rendering.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PetalMixError::Configuration`] for an invalid
    /// description and [`crate::PetalMixError::AudioDevice`] if the backend
    /// cannot be started.
    pub fn init(desc: PetalMixDeviceDesc) -> Result<Self> {
        let mut device = Self::build(desc)?;

        let mut engine = PetalMixEngine::new(device.link.desc.clone(), device.link.events.clone())?;
        let mixer = device.mixer.clone();
        engine.set_fill_callback(move |buffer, _sample_rate, _channels| {
            let Ok(mut mixer) = mixer.try_lock() else {
                log::warn!("Failed to acquire mixer lock in audio callback");
                return 0;
            };
            mixer.render(buffer)
        });
        engine.start()?;

        device.engine = Some(engine);
        log::info!("Audio device initialized");
        Ok(device)
    }

    /// Creates a device without any hardware behind it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PetalMixError::Configuration`] for an invalid description.
    pub fn headless(desc: PetalMixDeviceDesc) -> Result<Self> {
        let device = Self::build(desc)?;
        log::info!(
            "Headless audio device created: {} Hz, {} channels",
            device.sample_rate(),
            device.channels()
        );
        Ok(device)
    }

    fn build(desc: PetalMixDeviceDesc) -> Result<Self> {
        desc.validate()?;

        let (command_tx, command_rx) = unbounded();
        let (event_sink, event_rx) = EventSink::new(desc.event_capacity);
        let master_volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let mixer = Mixer::new(
            desc.sample_rate,
            desc.channels,
            desc.max_voices,
            desc.block_size,
            command_rx,
            event_sink.clone(),
            master_volume.clone(),
            frames_rendered.clone(),
        );

        Ok(Self {
            link: DeviceLink {
                commands: command_tx,
                events: event_sink,
                next_voice_id: Arc::new(AtomicU64::new(1)),
                desc,
            },
            mixer: Arc::new(Mutex::new(mixer)),
            engine: None,
            events: event_rx,
            master_volume,
            frames_rendered,
        })
    }

    /// Pulls one buffer from a headless device.
    ///
    /// # Arguments
    ///
    /// * `out` - interleaved buffer at the device channel count
    ///
    /// # Returns
    ///
    /// The number of frames rendered. Always 0 for a hardware-backed device,
    /// whose buffers belong to the backend.
    pub fn render(&self, out: &mut [f32]) -> usize {
        if self.engine.is_some() {
            log::warn!("render() called on a hardware-backed device, ignoring");
            return 0;
        }
        let mut mixer = self.mixer.lock().unwrap_or_else(PoisonError::into_inner);
        mixer.render(out)
    }

    /// Stops the backend and releases the device. Handles that outlive it
    /// keep working as silent no-ops.
    pub fn close(self) {}

    pub fn is_ready(&self) -> bool {
        match &self.engine {
            Some(engine) => engine.is_running(),
            None => true,
        }
    }

    pub fn is_headless(&self) -> bool {
        self.engine.is_none()
    }

    pub fn desc(&self) -> &PetalMixDeviceDesc {
        &self.link.desc
    }

    pub fn sample_rate(&self) -> u32 {
        self.link.desc.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.link.desc.channels
    }

    /// Sets the gain applied to every voice, clamped to [0, 1].
    pub fn set_master_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            1.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.master_volume
            .store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    /// Appends `processor` to the global chain applied to the final mix.
    ///
    /// Takes effect from the next rendered buffer. Attaching the same
    /// processor twice makes it run twice.
    pub fn attach_mixed_processor(&self, processor: &Arc<MixedProcessor>) {
        self.link
            .send(MixerCommand::AttachProcessor(processor.clone()));
    }

    /// Removes the first attachment of `processor`. No buffer rendered after
    /// this call returns invokes it. Unknown processors are ignored.
    pub fn detach_mixed_processor(&self, processor: &Arc<MixedProcessor>) {
        self.link
            .send(MixerCommand::DetachProcessor(processor.clone()));
    }

    /// Drains every pending event.
    ///
    /// At most `event_capacity` events are held between polls; later ones are
    /// dropped and counted in [`dropped_events`](Self::dropped_events).
    pub fn poll_events(&self) -> Vec<PetalMixEvent> {
        self.events.try_iter().collect()
    }

    /// Events lost because the queue was full when they were raised.
    pub fn dropped_events(&self) -> u64 {
        self.link.events.dropped()
    }

    /// Total frames rendered by the mixer since creation.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub(crate) fn link(&self) -> &DeviceLink {
        &self.link
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
        log::info!("Audio device closed");
    }
}

/// Connection from a handle back to its device's mixer.
///
/// Once the device is dropped the channels disconnect and every send becomes
/// a logged no-op.
#[derive(Clone)]
pub(crate) struct DeviceLink {
    commands: Sender<MixerCommand>,
    events: EventSink,
    next_voice_id: Arc<AtomicU64>,
    desc: PetalMixDeviceDesc,
}

impl DeviceLink {
    pub fn register(&self, voice: Arc<VoiceShared>) -> VoiceId {
        let id = VoiceId(self.next_voice_id.fetch_add(1, Ordering::Relaxed));
        self.send(MixerCommand::AddVoice { id, voice });
        id
    }

    pub fn unregister(&self, id: VoiceId) {
        self.send(MixerCommand::RemoveVoice(id));
    }

    pub fn send(&self, command: MixerCommand) {
        if self.commands.send(command).is_err() {
            log::debug!("Audio device closed, mixer command dropped");
        }
    }

    pub fn emit(&self, event: PetalMixEvent) {
        self.events.emit(event);
    }
}
