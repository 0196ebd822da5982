//! In-place processors applied to interleaved audio on the audio thread.

use std::sync::Arc;

/// Callback run on a rendered buffer.
///
/// The callback receives:
/// - `buffer`: interleaved samples to modify in place
/// - `frames`: number of frames in `buffer` (frames = samples / channels)
///
/// Processors run on the audio thread. They must not block or allocate.
pub type MixedProcessor = dyn Fn(&mut [f32], usize) + Send + Sync;

/// Wraps a closure so it can be attached and later detached by identity.
///
/// # Example
///
/// ```ignore
/// let half = petalmix_core::mixed_processor(|buffer, _frames| {
///     for sample in buffer.iter_mut() {
///         *sample *= 0.5;
///     }
/// });
/// device.attach_mixed_processor(&half);
/// ```
pub fn mixed_processor<F>(processor: F) -> Arc<MixedProcessor>
where
    F: Fn(&mut [f32], usize) + Send + Sync + 'static,
{
    Arc::new(processor)
}

/// Ordered list of processors. Identity is the `Arc` allocation, so the same
/// processor attached twice runs twice and is detached one entry at a time.
#[derive(Default, Clone)]
pub(crate) struct ProcessorChain {
    processors: Vec<Arc<MixedProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, processor: Arc<MixedProcessor>) {
        self.processors.push(processor);
    }

    /// Removes the first entry sharing `processor`'s allocation.
    /// Returns `false` if it was not attached.
    pub fn detach(&mut self, processor: &Arc<MixedProcessor>) -> bool {
        match self
            .processors
            .iter()
            .position(|attached| Arc::ptr_eq(attached, processor))
        {
            Some(index) => {
                self.processors.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn process(&self, buffer: &mut [f32], frames: usize) {
        for processor in &self.processors {
            processor(buffer, frames);
        }
    }
}
