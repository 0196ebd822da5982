//! Event types for PetalMix

use crate::playback::VoiceId;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Notifications produced while rendering and streaming, drained with
/// [`crate::AudioDevice::poll_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum PetalMixEvent {
    /// A non-looping sound reached its last frame and stopped.
    SoundFinished { voice_id: VoiceId },
    /// A looping music stream wrapped back to its start.
    StreamLooped { voice_id: VoiceId },
    /// A non-looping music stream played out and stopped.
    StreamFinished { voice_id: VoiceId },
    /// The output backend reported an error.
    DeviceError { error: String },
}

impl PetalMixEvent {
    pub fn voice_id(&self) -> Option<VoiceId> {
        match self {
            Self::SoundFinished { voice_id }
            | Self::StreamLooped { voice_id }
            | Self::StreamFinished { voice_id } => Some(*voice_id),
            Self::DeviceError { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::DeviceError { .. })
    }
}

/// Sending half of the bounded event queue.
///
/// Never blocks: when the application stops polling and the queue fills up,
/// new events are dropped and counted.
#[derive(Clone)]
pub(crate) struct EventSink {
    sender: Sender<PetalMixEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, Receiver<PetalMixEvent>) {
        let (sender, receiver) = bounded(capacity);
        let sink = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, receiver)
    }

    pub fn emit(&self, event: PetalMixEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    log::warn!(
                        "Event queue full, dropping {:?} (poll_events is not keeping up)",
                        event
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Audio device closed, event dropped");
            }
        }
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
