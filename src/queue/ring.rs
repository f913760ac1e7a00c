use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;
use std::sync::Arc;

use super::state::QueueState;
use crate::error::{ConfigurationError, QueueError};

/// Multi-channel single-producer/single-consumer ring of f32 frames
///
/// Each channel owns `capacity + 1` slots. One slot always stays empty so a
/// full ring and an empty ring are told apart by the two indices alone.
/// Construct with [`RingBuffer::new`] and hand out the two roles with
/// [`RingBuffer::split`]; only the [`Producer`] can push and only the
/// [`Consumer`] can pull.
pub struct RingBuffer {
    /// Backing length per channel (capacity + 1)
    buffer_length: usize,
    channel_count: usize,
    state: QueueState,
    channels: Box<[Box<[UnsafeCell<f32>]>]>,
}

// SAFETY: the producer only writes the free region [write, read - 1) and the
// consumer only reads the filled region [read, write). A region changes hands
// solely through a release store of the owning index, observed by the other
// side with an acquire load, so the two never touch the same slot at once.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Allocate a ring holding up to `capacity` frames per channel
    pub fn new(capacity: usize, channel_count: usize) -> Result<Self, ConfigurationError> {
        if capacity == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        if channel_count == 0 {
            return Err(ConfigurationError::ZeroChannels);
        }

        let too_large = ConfigurationError::CapacityTooLarge { capacity };
        let buffer_length = capacity
            .checked_add(1)
            .ok_or_else(|| too_large.clone())?;

        let mut channels = Vec::new();
        channels
            .try_reserve_exact(channel_count)
            .map_err(|_| too_large.clone())?;
        for _ in 0..channel_count {
            let mut slots = Vec::new();
            slots
                .try_reserve_exact(buffer_length)
                .map_err(|_| too_large.clone())?;
            slots.extend((0..buffer_length).map(|_| UnsafeCell::new(0.0f32)));
            channels.push(slots.into_boxed_slice());
        }
        let channels = channels.into_boxed_slice();

        Ok(Self {
            buffer_length,
            channel_count,
            state: QueueState::new(),
            channels,
        })
    }

    /// Split into the producer and consumer handles
    pub fn split(self) -> (Producer, Consumer) {
        let ring = Arc::new(self);
        (
            Producer {
                ring: Arc::clone(&ring),
            },
            Consumer { ring },
        )
    }

    /// Usable frames per channel (N, not the backing length)
    pub fn capacity(&self) -> usize {
        self.buffer_length - 1
    }

    /// Backing slots per channel (N + 1)
    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn available_to_read(&self) -> usize {
        self.state.snapshot().available_read(self.buffer_length)
    }

    pub fn available_to_write(&self) -> usize {
        self.state.snapshot().available_write(self.buffer_length)
    }

    /// Whether at least `frames` frames are waiting to be pulled
    pub fn is_frame_available(&self, frames: usize) -> bool {
        self.available_to_read() >= frames
    }

    fn check_channels(
        &self,
        lengths: impl ExactSizeIterator<Item = usize>,
        frames: usize,
    ) -> Result<(), ConfigurationError> {
        if lengths.len() != self.channel_count {
            return Err(ConfigurationError::ChannelCountMismatch {
                expected: self.channel_count,
                actual: lengths.len(),
            });
        }
        for (channel, len) in lengths.enumerate() {
            if len < frames {
                return Err(ConfigurationError::ChannelTooShort {
                    channel,
                    len,
                    frames,
                });
            }
        }
        Ok(())
    }

    /// Split a run of `frames` starting at `start` at the end of the backing array
    fn span(&self, start: usize, frames: usize) -> (usize, usize) {
        let first = frames.min(self.buffer_length - start);
        (first, frames - first)
    }

    fn advance(&self, index: usize, frames: usize) -> usize {
        (index + frames) % self.buffer_length
    }

    fn channel_ptr(&self, channel: usize) -> *mut f32 {
        UnsafeCell::raw_get(self.channels[channel].as_ptr())
    }

    fn write_block<S: AsRef<[f32]>>(&self, input: &[S], frames: usize) -> Result<(), QueueError> {
        self.check_channels(input.iter().map(|c| c.as_ref().len()), frames)?;

        let snap = self.state.producer_view();
        let available = snap.available_write(self.buffer_length);
        if available < frames {
            return Err(QueueError::InsufficientSpace {
                requested: frames,
                available,
            });
        }

        let write = snap.write;
        let (first, second) = self.span(write, frames);
        for (channel, samples) in input.iter().enumerate() {
            let src = samples.as_ref().as_ptr();
            let dst = self.channel_ptr(channel);
            // SAFETY: `write + first <= buffer_length` and `second < snap.read`, both
            // inside the free region owned by the producer; `src` holds at
            // least `frames` samples (checked above).
            unsafe {
                ptr::copy_nonoverlapping(src, dst.add(write), first);
                ptr::copy_nonoverlapping(src.add(first), dst, second);
            }
        }

        self.state.publish_write(self.advance(write, frames));
        Ok(())
    }

    fn read_block<S: AsMut<[f32]>>(&self, output: &mut [S], frames: usize) -> Result<(), QueueError> {
        self.check_channels(output.iter_mut().map(|c| c.as_mut().len()), frames)?;

        let snap = self.state.consumer_view();
        let available = snap.available_read(self.buffer_length);
        if available < frames {
            return Err(QueueError::InsufficientData {
                requested: frames,
                available,
            });
        }

        let read = snap.read;
        let (first, second) = self.span(read, frames);
        for (channel, samples) in output.iter_mut().enumerate() {
            let dst = samples.as_mut().as_mut_ptr();
            let src = self.channel_ptr(channel);
            // SAFETY: the slots [read, read + frames) modulo the backing length
            // were published by the producer and are owned by the consumer
            // until the read index moves; `dst` holds at least `frames` samples.
            unsafe {
                ptr::copy_nonoverlapping(src.add(read), dst, first);
                ptr::copy_nonoverlapping(src, dst.add(first), second);
            }
        }

        self.state.publish_read(self.advance(read, frames));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn indices(&self) -> super::state::IndexSnapshot {
        self.state.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn contents(&self) -> Vec<Vec<f32>> {
        (0..self.channel_count)
            .map(|channel| {
                let base = self.channel_ptr(channel);
                // SAFETY: tests call this with no concurrent producer or consumer
                (0..self.buffer_length)
                    .map(|i| unsafe { *base.add(i) })
                    .collect()
            })
            .collect()
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.state.snapshot();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("channel_count", &self.channel_count)
            .field("read", &snap.read)
            .field("write", &snap.write)
            .field("available_read", &snap.available_read(self.buffer_length))
            .field("available_write", &snap.available_write(self.buffer_length))
            .finish()
    }
}

/// Writing half of a [`RingBuffer`]
/// Exactly one exists per ring; it is `Send` but not `Clone`
#[derive(Debug)]
pub struct Producer {
    ring: Arc<RingBuffer>,
}

impl Producer {
    /// Copy `frames` frames from every channel of `input` into the ring
    ///
    /// All-or-nothing: when fewer than `frames` slots are free the ring is left
    /// exactly as it was and [`QueueError::InsufficientSpace`] is returned.
    /// Never blocks and never allocates.
    pub fn push<S: AsRef<[f32]>>(&mut self, input: &[S], frames: usize) -> Result<(), QueueError> {
        self.ring.write_block(input, frames)
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn available_to_write(&self) -> usize {
        self.ring.available_to_write()
    }

    pub fn available_to_read(&self) -> usize {
        self.ring.available_to_read()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Reading half of a [`RingBuffer`]
#[derive(Debug)]
pub struct Consumer {
    ring: Arc<RingBuffer>,
}

impl Consumer {
    /// Copy `frames` frames out of the ring into every channel of `output`
    ///
    /// All-or-nothing: when fewer than `frames` frames are readable neither the
    /// ring nor `output` is modified and [`QueueError::InsufficientData`] is
    /// returned.
    pub fn pull<S: AsMut<[f32]>>(&mut self, output: &mut [S], frames: usize) -> Result<(), QueueError> {
        self.ring.read_block(output, frames)
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn available_to_read(&self) -> usize {
        self.ring.available_to_read()
    }

    pub fn available_to_write(&self) -> usize {
        self.ring.available_to_write()
    }

    pub fn is_frame_available(&self, frames: usize) -> bool {
        self.ring.is_frame_available(frames)
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::thread;
    use std::time::Duration;

    fn ramp(start: f32, frames: usize) -> Vec<f32> {
        (0..frames).map(|i| start + i as f32).collect()
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert_eq!(
            RingBuffer::new(0, 1).unwrap_err(),
            ConfigurationError::ZeroCapacity
        );
        assert_eq!(
            RingBuffer::new(16, 0).unwrap_err(),
            ConfigurationError::ZeroChannels
        );
    }

    #[test]
    fn test_rejects_unallocatable_capacity() {
        assert_eq!(
            RingBuffer::new(usize::MAX, 1).unwrap_err(),
            ConfigurationError::CapacityTooLarge {
                capacity: usize::MAX
            }
        );
        // fits in usize but not in an allocation
        assert_eq!(
            RingBuffer::new(usize::MAX / 2, 2).unwrap_err(),
            ConfigurationError::CapacityTooLarge {
                capacity: usize::MAX / 2
            }
        );
    }

    #[test]
    fn test_capacity_excludes_spare_slot() {
        let ring = RingBuffer::new(1024, 2).unwrap();
        assert_eq!(ring.capacity(), 1024);
        assert_eq!(ring.buffer_length(), 1025);
        assert_eq!(ring.available_to_write(), 1024);
        assert_eq!(ring.available_to_read(), 0);
        assert!(ring.contents().iter().all(|c| c.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_round_trip_constant() {
        let (mut producer, mut consumer) = RingBuffer::new(512, 1).unwrap().split();
        producer.push(&[vec![1.0f32; 512]], 512).unwrap();
        assert_eq!(producer.available_to_write(), 0);

        let mut out = [vec![0.0f32; 512]];
        consumer.pull(&mut out, 512).unwrap();
        assert!(out[0].iter().all(|&s| s == 1.0));
        assert_eq!(consumer.available_to_read(), 0);
    }

    #[test]
    fn test_round_trip_per_channel() {
        let (mut producer, mut consumer) = RingBuffer::new(1024, 2).unwrap().split();
        let input = [vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        producer.push(&input, 3).unwrap();
        assert_eq!(producer.available_to_read(), 3);

        let mut output = [vec![0.0; 3], vec![0.0; 3]];
        consumer.pull(&mut output, 3).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_worked_example() {
        let (mut producer, mut consumer) = RingBuffer::new(512, 1).unwrap().split();
        assert_eq!(consumer.ring().buffer_length(), 513);

        producer.push(&[ramp(0.0, 200)], 200).unwrap();
        producer.push(&[ramp(200.0, 150)], 150).unwrap();
        assert_eq!(consumer.available_to_read(), 350);

        let mut out = [vec![0.0f32; 300]];
        consumer.pull(&mut out, 300).unwrap();
        assert_eq!(out[0], ramp(0.0, 300));
        assert_eq!(consumer.available_to_read(), 50);

        let mut tail = [vec![-1.0f32; 51]];
        let err = consumer.pull(&mut tail, 51).unwrap_err();
        assert_eq!(
            err,
            QueueError::InsufficientData {
                requested: 51,
                available: 50
            }
        );
        assert!(tail[0].iter().all(|&s| s == -1.0));
        assert_eq!(consumer.available_to_read(), 50);

        consumer.pull(&mut tail, 50).unwrap();
        assert_eq!(&tail[0][..50], &ramp(300.0, 50)[..]);
        assert_eq!(consumer.available_to_read(), 0);
    }

    #[test]
    fn test_push_fails_clean_when_full() {
        let (mut producer, mut consumer) = RingBuffer::new(8, 2).unwrap().split();
        producer.push(&[ramp(0.0, 6), ramp(10.0, 6)], 6).unwrap();
        let mut scratch = [vec![0.0; 4], vec![0.0; 4]];
        consumer.pull(&mut scratch, 4).unwrap();
        producer.push(&[ramp(20.0, 5), ramp(30.0, 5)], 5).unwrap();

        let before = producer.ring().contents();
        let indices = producer.ring().indices();
        let err = producer
            .push(&[vec![9.0; 2], vec![9.0; 2]], 2)
            .unwrap_err();

        assert_eq!(
            err,
            QueueError::InsufficientSpace {
                requested: 2,
                available: 1
            }
        );
        assert_eq!(producer.ring().contents(), before);
        assert_eq!(producer.ring().indices(), indices);
    }

    #[test]
    fn test_oversized_requests_fail_clean() {
        let (mut producer, mut consumer) = RingBuffer::new(4, 1).unwrap().split();
        let err = producer.push(&[vec![0.5; 5]], 5).unwrap_err();
        assert!(matches!(err, QueueError::InsufficientSpace { .. }));

        let mut out = [vec![0.0; 5]];
        let err = consumer.pull(&mut out, 5).unwrap_err();
        assert!(matches!(err, QueueError::InsufficientData { .. }));
        assert_eq!(consumer.ring().indices(), producer.ring().indices());
        assert_eq!(consumer.ring().indices().write, 0);
    }

    #[test]
    fn test_fill_one_frame_at_a_time() {
        let (mut producer, _consumer) = RingBuffer::new(64, 2).unwrap().split();
        let input = [vec![0.25; 1], vec![0.5; 1]];
        for _ in 0..64 {
            producer.push(&input, 1).unwrap();
        }
        assert!(producer.push(&input, 1).is_err());
    }

    #[test]
    fn test_channel_count_mismatch() {
        let (mut producer, mut consumer) = RingBuffer::new(256, 2).unwrap().split();
        let err = producer.push(&[vec![0.0; 256]], 256).unwrap_err();
        assert_eq!(
            err,
            QueueError::Config(ConfigurationError::ChannelCountMismatch {
                expected: 2,
                actual: 1
            })
        );

        let mut out = [vec![0.0; 8], vec![0.0; 8], vec![0.0; 8]];
        assert!(matches!(
            consumer.pull(&mut out, 8),
            Err(QueueError::Config(
                ConfigurationError::ChannelCountMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_short_channel_is_not_truncated() {
        let (mut producer, _consumer) = RingBuffer::new(256, 2).unwrap().split();
        let err = producer
            .push(&[vec![0.0; 128], vec![0.0; 64]], 128)
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::Config(ConfigurationError::ChannelTooShort {
                channel: 1,
                len: 64,
                frames: 128
            })
        );
        assert_eq!(producer.available_to_read(), 0);
    }

    #[test]
    fn test_accepts_borrowed_slices() {
        let (mut producer, mut consumer) = RingBuffer::new(16, 2).unwrap().split();
        let left = [0.1f32, 0.2, 0.3, 0.4];
        let right = [0.5f32, 0.6, 0.7, 0.8];
        producer.push(&[&left[..], &right[..]], 4).unwrap();

        let mut l = [0.0f32; 4];
        let mut r = [0.0f32; 4];
        consumer.pull(&mut [&mut l[..], &mut r[..]], 4).unwrap();
        assert_eq!(l, left);
        assert_eq!(r, right);
    }

    #[test]
    fn test_wraparound_matches_linear() {
        let capacity = 100;
        let block = capacity - 1;
        let data = ramp(0.5, block);

        let (mut producer, mut consumer) = RingBuffer::new(capacity, 1).unwrap().split();
        let mut linear = [vec![0.0; block]];
        producer.push(&[&data[..]], block).unwrap();
        consumer.pull(&mut linear, block).unwrap();

        // second pass starts near the end of the backing array and wraps
        let mut wrapped = [vec![0.0; block]];
        producer.push(&[&data[..]], block).unwrap();
        assert!(producer.ring().indices().write < producer.ring().indices().read);
        consumer.pull(&mut wrapped, block).unwrap();

        assert_eq!(linear, wrapped);
        assert_eq!(wrapped[0], data);
    }

    #[test]
    fn test_index_lands_on_zero_at_exact_end() {
        let (mut producer, mut consumer) = RingBuffer::new(4, 1).unwrap().split();
        let mut out = [vec![0.0; 5]];
        producer.push(&[vec![1.0; 3]], 3).unwrap();
        consumer.pull(&mut out, 3).unwrap();
        producer.push(&[vec![2.0; 2]], 2).unwrap();
        assert_eq!(producer.ring().indices().write, 0);
        consumer.pull(&mut out, 2).unwrap();
        assert_eq!(consumer.ring().indices().read, 0);
        assert_eq!(&out[0][..2], &[2.0, 2.0]);
    }

    #[test]
    fn test_debug_reports_levels() {
        let (mut producer, _consumer) = RingBuffer::new(8, 1).unwrap().split();
        producer.push(&[vec![0.0; 3]], 3).unwrap();
        let text = format!("{:?}", producer.ring());
        assert!(text.contains("available_read: 3"));
        assert!(text.contains("available_write: 5"));
    }

    #[test]
    fn test_concurrent_no_loss() {
        const BLOCK: usize = 37;
        const BLOCKS: usize = 4_000;
        let (mut producer, mut consumer) = RingBuffer::new(BLOCK * 3, 2).unwrap().split();

        let writer = thread::spawn(move || {
            let mut next = 0u32;
            let mut block = [vec![0.0f32; BLOCK], vec![0.0f32; BLOCK]];
            for n in 0..BLOCKS {
                for i in 0..BLOCK {
                    block[0][i] = (next + i as u32) as f32;
                    block[1][i] = -((next + i as u32) as f32);
                }
                while producer.push(&block, BLOCK).is_err() {
                    thread::yield_now();
                }
                next += BLOCK as u32;
                if n % 97 == 0 {
                    thread::sleep(Duration::from_micros(50));
                }
            }
        });

        let mut expected = 0u32;
        let mut block = [vec![0.0f32; BLOCK], vec![0.0f32; BLOCK]];
        for n in 0..BLOCKS {
            while consumer.pull(&mut block, BLOCK).is_err() {
                thread::yield_now();
            }
            for i in 0..BLOCK {
                assert_eq!(block[0][i], expected as f32);
                assert_eq!(block[1][i], -(expected as f32));
                expected += 1;
            }
            if n % 89 == 0 {
                thread::sleep(Duration::from_micros(70));
            }
        }

        writer.join().unwrap();
        assert_eq!(consumer.available_to_read(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(usize),
        Pull(usize),
    }

    fn op_strategy(max: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..=max).prop_map(Op::Push),
            (0..=max).prop_map(Op::Pull),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_fifo_model(
            capacity in 1usize..64,
            ops in prop::collection::vec(op_strategy(80), 1..200),
        ) {
            let (mut producer, mut consumer) = RingBuffer::new(capacity, 2).unwrap().split();
            let mut model: VecDeque<f32> = VecDeque::new();
            let mut counter = 0.0f32;

            for op in ops {
                match op {
                    Op::Push(frames) => {
                        let left: Vec<f32> = (0..frames).map(|i| counter + i as f32).collect();
                        let right: Vec<f32> = left.iter().map(|s| s * 2.0).collect();
                        let fits = capacity - model.len() >= frames;
                        let before = producer.ring().indices();
                        let result = producer.push(&[&left[..], &right[..]], frames);
                        prop_assert_eq!(result.is_ok(), fits);
                        if fits {
                            model.extend(left.iter().copied());
                            counter += frames as f32;
                        } else {
                            prop_assert_eq!(producer.ring().indices(), before);
                        }
                    }
                    Op::Pull(frames) => {
                        let mut out = [vec![f32::NAN; frames], vec![f32::NAN; frames]];
                        let result = consumer.pull(&mut out, frames);
                        prop_assert_eq!(result.is_ok(), model.len() >= frames);
                        if result.is_ok() {
                            for i in 0..frames {
                                let expected = model.pop_front().unwrap();
                                prop_assert_eq!(out[0][i], expected);
                                prop_assert_eq!(out[1][i], expected * 2.0);
                            }
                        } else {
                            prop_assert!(out[0].iter().all(|s| s.is_nan()));
                        }
                    }
                }
                prop_assert_eq!(consumer.available_to_read(), model.len());
                prop_assert_eq!(producer.available_to_write(), capacity - model.len());
            }
        }
    }
}
