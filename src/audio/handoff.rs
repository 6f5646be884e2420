//! Lock-free sample handoff from a capture callback to the analysis loop.
//!
//! The capture side only ever writes into the ring buffer; frames are assembled
//! on the consumer side, so a frame is complete before anyone sees it and is
//! never touched again afterwards.

use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::features::AudioFrame;
use super::source::SlidingWindow;

/// Create a connected sink/stream pair with room for `capacity` samples.
pub fn sample_channel(
    capacity: usize,
    frame_size: usize,
    hop: usize,
    sample_rate: u32,
) -> (SampleSink, SampleStream) {
    let (producer, consumer) = RingBuffer::<f32>::new(capacity);
    let overruns = Arc::new(AtomicUsize::new(0));
    let sink = SampleSink {
        producer,
        overruns: Arc::clone(&overruns),
    };
    let stream = SampleStream {
        consumer,
        window: SlidingWindow::new(frame_size, sample_rate),
        pending: Vec::with_capacity(hop),
        hop: hop.max(1),
        overruns,
        reported_overruns: 0,
    };
    (sink, stream)
}

/// Producer half, owned by the capture callback. Never blocks or allocates.
pub struct SampleSink {
    producer: Producer<f32>,
    overruns: Arc<AtomicUsize>,
}

impl SampleSink {
    /// Push mono samples as the iterator yields them; whatever does not fit is
    /// dropped and counted. Nothing is buffered on this side.
    pub fn push_iter<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = f32>,
    {
        let mut written = 0;
        let mut dropped = 0;
        for sample in samples {
            match self.producer.push(sample) {
                Ok(()) => written += 1,
                Err(_) => dropped += 1,
            }
        }
        if dropped > 0 {
            self.overruns.fetch_add(dropped, Ordering::Relaxed);
        }
        written
    }
}

/// Average each interleaved frame of `channels` samples into one mono sample.
pub fn downmix<'a, T, F>(
    interleaved: &'a [T],
    channels: usize,
    convert: F,
) -> impl Iterator<Item = f32> + 'a
where
    T: 'a,
    F: Fn(&T) -> f32 + Copy + 'a,
{
    interleaved
        .chunks(channels.max(1))
        .map(move |frame| frame.iter().map(convert).sum::<f32>() / frame.len() as f32)
}

/// Consumer half: turns the raw sample stream into frames, one per hop.
pub struct SampleStream {
    consumer: Consumer<f32>,
    window: SlidingWindow,
    pending: Vec<f32>,
    hop: usize,
    overruns: Arc<AtomicUsize>,
    reported_overruns: usize,
}

impl SampleStream {
    /// Assemble the next frame if a full hop of samples is available.
    /// Returns the frame and the number of fresh samples in it.
    pub fn try_next(&mut self) -> Option<(AudioFrame, usize)> {
        let wanted = self.hop - self.pending.len();
        let available = self.consumer.slots().min(wanted);
        if available > 0 {
            if let Ok(chunk) = self.consumer.read_chunk(available) {
                let (first, second) = chunk.as_slices();
                self.pending.extend_from_slice(first);
                self.pending.extend_from_slice(second);
                chunk.commit_all();
            }
        }
        self.report_overruns();

        if self.pending.len() < self.hop {
            return None;
        }
        let frame = self.window.advance(&self.pending);
        let fresh = self.pending.len();
        self.pending.clear();
        Some((frame, fresh))
    }

    /// Flush a partial hop once the producer is gone.
    pub fn drain_remainder(&mut self) -> Option<(AudioFrame, usize)> {
        if let Some(next) = self.try_next() {
            return Some(next);
        }
        if self.pending.is_empty() || !self.consumer.is_abandoned() {
            return None;
        }
        let frame = self.window.advance(&self.pending);
        let fresh = self.pending.len();
        self.pending.clear();
        Some((frame, fresh))
    }

    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned() && self.consumer.is_empty() && self.pending.is_empty()
    }

    pub fn overruns(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }

    fn report_overruns(&mut self) {
        let total = self.overruns();
        if total > self.reported_overruns {
            log::warn!(
                "Capture ring buffer overrun: {} samples dropped ({} total)",
                total - self.reported_overruns,
                total
            );
            self.reported_overruns = total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn frames_reassemble_the_pushed_stream() {
        let input: Vec<f32> = (0..10_000).map(|i| i as f32).collect();
        let (mut sink, mut stream) = sample_channel(16_384, 256, 100, 16_000);

        let producer_input = input.clone();
        let producer = thread::spawn(move || {
            let sizes = [7usize, 64, 3, 250, 31];
            let mut pos = 0;
            let mut i = 0;
            while pos < producer_input.len() {
                let end = (pos + sizes[i % sizes.len()]).min(producer_input.len());
                sink.push_iter(producer_input[pos..end].iter().copied());
                pos = end;
                i += 1;
            }
        });

        let mut tape = Vec::new();
        loop {
            match stream.drain_remainder() {
                Some((frame, fresh)) => {
                    assert_eq!(frame.len(), 256);
                    let samples = frame.samples();
                    tape.extend_from_slice(&samples[samples.len() - fresh..]);
                }
                None if stream.is_abandoned() => break,
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        assert_eq!(tape, input);
        assert_eq!(stream.overruns(), 0);
    }

    #[test]
    fn full_buffer_counts_dropped_samples() {
        let (mut sink, stream) = sample_channel(8, 4, 2, 8_000);
        assert_eq!(sink.push_iter([0.1; 12]), 8);
        assert_eq!(stream.overruns(), 4);
    }

    #[test]
    fn interleaved_push_downmixes() {
        let (mut sink, mut stream) = sample_channel(16, 2, 2, 8_000);
        sink.push_iter(downmix(&[1.0f32, 0.0, 0.0, -1.0], 2, |&s| s));
        let (frame, fresh) = stream.try_next().unwrap();
        assert_eq!(fresh, 2);
        assert_eq!(frame.samples(), &[0.5, -0.5]);
    }

    #[test]
    fn iterator_push_counts_overflow() {
        let (mut sink, stream) = sample_channel(4, 2, 2, 8_000);
        let converted = downmix(&[100i16, 300, -200, 0, 50, 50], 2, |&s| s as f32);
        assert_eq!(sink.push_iter(converted), 3);
        assert_eq!(sink.push_iter((0..3).map(|i| i as f32)), 1);
        assert_eq!(stream.overruns(), 2);
    }

    #[test]
    fn downmix_converts_each_frame() {
        let mono: Vec<f32> = downmix(&[2i16, 4, -6, -2], 2, |&s| f32::from(s)).collect();
        assert_eq!(mono, vec![3.0, -4.0]);
        let passthrough: Vec<f32> = downmix(&[0.25f32, -0.5], 1, |&s| s).collect();
        assert_eq!(passthrough, vec![0.25, -0.5]);
    }
}
