use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Playback state shared by sounds, streams and music.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

impl PlayState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Playing => 1,
            Self::Paused => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Identifier of one voice registered with the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const MIN_PITCH: f32 = 0.01;
pub const MAX_PITCH: f32 = 16.0;

/// Per-voice parameters written by the application thread and read by the
/// audio thread without locking.
#[derive(Debug)]
pub(crate) struct VoiceControls {
    state: AtomicU8,
    volume: AtomicU32,
    pitch: AtomicU32,
    pan: AtomicU32,
    looping: AtomicBool,
    frames_played: AtomicU64,
}

impl VoiceControls {
    pub fn new(looping: bool) -> Self {
        Self {
            state: AtomicU8::new(PlayState::Stopped.as_u8()),
            volume: AtomicU32::new(1.0f32.to_bits()),
            pitch: AtomicU32::new(1.0f32.to_bits()),
            pan: AtomicU32::new(0.0f32.to_bits()),
            looping: AtomicBool::new(looping),
            frames_played: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PlayState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Moves to `to` only if the current state is `from`.
    pub fn transition(&self, from: PlayState, to: PlayState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(clamp_or(volume, 0.0, 1.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch.load(Ordering::Relaxed))
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.pitch
            .store(clamp_or(pitch, MIN_PITCH, MAX_PITCH, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan.load(Ordering::Relaxed))
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan
            .store(clamp_or(pan, -1.0, 1.0, 0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    pub fn add_frames_played(&self, frames: u64) {
        self.frames_played.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn reset_frames_played(&self) {
        self.frames_played.store(0, Ordering::Relaxed);
    }
}

// NaN falls back to the neutral value instead of poisoning the mix
fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Balance gains for a pan in [-1, 1]. Centre leaves both channels at unity;
/// panning attenuates the opposite side linearly.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let left = (1.0 - pan).min(1.0);
    let right = (1.0 + pan).min(1.0);
    (left, right)
}

/// Converts the older 0..1 pan encoding (0.5 centre, 0 left) to -1..1.
pub fn pan_from_unit(pan: f32) -> f32 {
    pan * 2.0 - 1.0
}
