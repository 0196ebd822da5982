use crate::error::{PetalMixError, Result};
use std::fmt;

/// Storage size of one PCM sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleSize {
    /// 8 bit unsigned, 128 is silence.
    U8,
    /// 16 bit signed.
    I16,
    /// 32 bit float, nominal range [-1, 1].
    F32,
}

impl SampleSize {
    /// Maps a bit count (8, 16 or 32) to a sample size.
    ///
    /// # Errors
    ///
    /// Returns [`PetalMixError::InvalidFormat`] for any other bit count.
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            8 => Ok(Self::U8),
            16 => Ok(Self::I16),
            32 => Ok(Self::F32),
            other => Err(PetalMixError::InvalidFormat(format!(
                "unsupported sample size: {} bits (expected 8, 16 or 32)",
                other
            ))),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::F32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }
}

impl fmt::Display for SampleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// A PCM sample type that streams and waves accept directly.
///
/// Conversions are symmetric so that `from_f32(to_f32(x)) == x` for every
/// integer sample value.
pub trait PcmSample: Copy + Send + Sync + 'static {
    const SIZE: SampleSize;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;
}

impl PcmSample for u8 {
    const SIZE: SampleSize = SampleSize::U8;

    fn to_f32(self) -> f32 {
        (self as f32 - 128.0) / 128.0
    }

    fn from_f32(value: f32) -> Self {
        (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8
    }
}

impl PcmSample for i16 {
    const SIZE: SampleSize = SampleSize::I16;

    fn to_f32(self) -> f32 {
        self as f32 / 32768.0
    }

    fn from_f32(value: f32) -> Self {
        (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
    }
}

impl PcmSample for f32 {
    const SIZE: SampleSize = SampleSize::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}
