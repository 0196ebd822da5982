//! Fixed-capacity PCM queue between one producer (the application) and one
//! consumer (the mixer).
//!
//! Capacity is `buffer_count` slots of `buffer_frames` frames. A slot counts as
//! processed, and may be refilled, once that many frames have been consumed.
//! With N slots of L frames at rate R the queue holds at most `N·L/R` seconds
//! and the producer keeps at least `(N-1)·L/R` seconds ahead when it refills
//! on every processed slot.

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

pub const MIN_BUFFER_COUNT: usize = 2;

/// Geometry of a raw buffer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLayout {
    pub buffer_frames: usize,
    pub buffer_count: usize,
    pub channels: usize,
}

impl QueueLayout {
    pub fn new(buffer_frames: usize, buffer_count: usize, channels: usize) -> Self {
        Self {
            buffer_frames: buffer_frames.max(1),
            buffer_count: buffer_count.max(MIN_BUFFER_COUNT),
            channels: channels.max(1),
        }
    }

    pub fn capacity_frames(&self) -> usize {
        self.buffer_frames * self.buffer_count
    }

    pub fn slot_samples(&self) -> usize {
        self.buffer_frames * self.channels
    }
}

/// Creates a raw buffer queue and splits it into its two halves.
pub fn raw_buffer_queue(layout: QueueLayout) -> (QueueProducer, QueueConsumer) {
    let ring = HeapRb::<f32>::new(layout.capacity_frames() * layout.channels);
    let (producer, consumer) = ring.split();
    (
        QueueProducer { producer, layout },
        QueueConsumer { consumer, layout },
    )
}

/// Application side of the queue.
pub struct QueueProducer {
    producer: HeapProd<f32>,
    layout: QueueLayout,
}

impl QueueProducer {
    pub fn layout(&self) -> QueueLayout {
        self.layout
    }

    /// True when at least one whole slot is free for refilling.
    pub fn is_buffer_processed(&self) -> bool {
        self.producer.vacant_len() >= self.layout.slot_samples()
    }

    /// Frames that can be submitted right now without dropping any.
    pub fn free_frames(&self) -> usize {
        self.producer.vacant_len() / self.layout.channels
    }

    pub fn queued_frames(&self) -> usize {
        self.producer.occupied_len() / self.layout.channels
    }

    /// Queues as many whole frames of `samples` as fit. Frames that do not fit
    /// are dropped. Returns the number of frames queued.
    pub fn submit(&mut self, samples: &[f32]) -> usize {
        let channels = self.layout.channels;
        let offered = samples.len() / channels;
        let accepted = offered.min(self.free_frames());

        let partial = samples.len() % channels;
        if partial != 0 {
            log::warn!(
                "Raw buffer queue: dropped {} trailing samples that do not form a whole {}-channel frame",
                partial,
                channels
            );
        }

        let pushed = self.producer.push_slice(&samples[..accepted * channels]);
        if accepted < offered {
            log::warn!(
                "Raw buffer queue full: dropped {} of {} frames (check is_buffer_processed before submitting)",
                offered - accepted,
                offered
            );
        }
        pushed / channels
    }
}

/// Mixer side of the queue.
pub struct QueueConsumer {
    consumer: HeapCons<f32>,
    layout: QueueLayout,
}

impl QueueConsumer {
    pub fn layout(&self) -> QueueLayout {
        self.layout
    }

    /// Pops one frame into `frame`. Returns `false` when starved.
    pub fn pop_frame(&mut self, frame: &mut [f32]) -> bool {
        let channels = self.layout.channels;
        if self.consumer.occupied_len() < channels {
            return false;
        }
        self.consumer.pop_slice(&mut frame[..channels]) == channels
    }

    /// Copies the oldest queued frame into `frame` without consuming it.
    pub fn peek_frame(&self, frame: &mut [f32]) -> bool {
        let channels = self.layout.channels;
        if self.consumer.occupied_len() < channels {
            return false;
        }
        for (dst, src) in frame[..channels].iter_mut().zip(self.consumer.iter()) {
            *dst = *src;
        }
        true
    }

    pub fn queued_frames(&self) -> usize {
        self.consumer.occupied_len() / self.layout.channels
    }

    /// Discards everything queued.
    pub fn clear(&mut self) -> usize {
        self.consumer.clear() / self.layout.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_count_never_drops_below_two() {
        let layout = QueueLayout::new(128, 1, 2);
        assert_eq!(layout.buffer_count, 2);
        assert_eq!(layout.capacity_frames(), 256);
    }

    #[test]
    fn processed_tracks_free_slots() {
        let (mut producer, mut consumer) = raw_buffer_queue(QueueLayout::new(4, 2, 1));
        assert!(producer.is_buffer_processed());

        assert_eq!(producer.submit(&[0.1; 8]), 8);
        assert!(!producer.is_buffer_processed());

        let mut frame = [0.0f32; 1];
        for _ in 0..3 {
            assert!(consumer.pop_frame(&mut frame));
        }
        assert!(!producer.is_buffer_processed());

        assert!(consumer.pop_frame(&mut frame));
        assert!(producer.is_buffer_processed());
    }

    #[test]
    fn overflow_is_dropped_not_blocked() {
        let (mut producer, consumer) = raw_buffer_queue(QueueLayout::new(2, 2, 2));
        let samples: Vec<f32> = (0..12).map(|i| i as f32).collect();

        assert_eq!(producer.submit(&samples), 4);
        assert_eq!(consumer.queued_frames(), 4);
        assert_eq!(producer.submit(&samples), 0);
    }

    #[test]
    fn frames_come_out_in_order() {
        let (mut producer, mut consumer) = raw_buffer_queue(QueueLayout::new(2, 2, 2));
        producer.submit(&[1.0, 2.0, 3.0, 4.0]);

        let mut frame = [0.0f32; 2];
        assert!(consumer.pop_frame(&mut frame));
        assert_eq!(frame, [1.0, 2.0]);
        assert!(consumer.pop_frame(&mut frame));
        assert_eq!(frame, [3.0, 4.0]);
        assert!(!consumer.pop_frame(&mut frame));
    }

    #[test]
    fn clear_discards_queued_frames() {
        let (mut producer, mut consumer) = raw_buffer_queue(QueueLayout::new(4, 2, 1));
        producer.submit(&[0.5; 6]);
        assert_eq!(consumer.clear(), 6);
        assert_eq!(producer.queued_frames(), 0);
        assert!(producer.is_buffer_processed());
    }

    #[test]
    fn peek_leaves_frame_queued() {
        let (mut producer, mut consumer) = raw_buffer_queue(QueueLayout::new(2, 2, 2));
        producer.submit(&[1.0, 2.0, 3.0, 4.0]);

        let mut frame = [0.0f32; 2];
        assert!(consumer.peek_frame(&mut frame));
        assert_eq!(frame, [1.0, 2.0]);
        assert_eq!(consumer.queued_frames(), 2);

        assert!(consumer.pop_frame(&mut frame));
        assert_eq!(frame, [1.0, 2.0]);
        assert!(consumer.peek_frame(&mut frame));
        assert_eq!(frame, [3.0, 4.0]);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let (mut producer, consumer) = raw_buffer_queue(QueueLayout::new(4, 2, 2));
        assert_eq!(producer.submit(&[0.1, 0.2, 0.3, 0.4, 0.5]), 2);
        assert_eq!(consumer.queued_frames(), 2);
        assert_eq!(producer.free_frames(), 6);
    }
}
