use crate::audio_data::{LoadOptions, Wave};
use crate::error::Result;
use std::path::Path;

/// Trait for loading a [`Wave`] from a file path.
///
/// PetalMix provides [`super::DefaultAudioLoader`] built on Symphonia; bring
/// your own loader for formats or containers it does not cover.
///
/// # Example
///
/// ```ignore
/// use petalmix_core::audio_data::{AudioDataLoader, LoadOptions, Wave};
/// use petalmix_core::error::Result;
/// use std::path::Path;
///
/// struct SilenceLoader;
///
/// impl AudioDataLoader for SilenceLoader {
///     fn load(&self, _path: &Path, _options: &LoadOptions) -> Result<Wave> {
///         Wave::from_samples(48000, 1, vec![0.0f32; 48000])
///     }
/// }
/// ```
pub trait AudioDataLoader {
    /// Loads and fully decodes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a `PetalMixError` if the file cannot be opened or decoded.
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Wave>;
}
