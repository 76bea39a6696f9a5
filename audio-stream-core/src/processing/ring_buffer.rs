use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};

/// Lock-free circular buffer of 16-bit samples with one writer and any
/// number of independent readers.
///
/// The write cursor counts every sample ever written and only moves forward.
/// Readers keep their own cursor and never touch the writer's state, so the
/// real-time thread never waits on a session. A reader that falls more than
/// `capacity` samples behind skips ahead to the oldest sample still held
/// (lossy catch-up); the overwritten gap is dropped silently.
#[derive(Debug)]
pub struct RingBuffer {
    slots: Box<[AtomicI16]>,
    write_cursor: AtomicU64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1)).map(|_| AtomicI16::new(0)).collect();
        Self {
            slots,
            write_cursor: AtomicU64::new(0),
        }
    }

    /// Append one sample. Only one thread may write at a time.
    #[inline]
    pub fn write(&self, sample: i16) {
        let position = self.write_cursor.load(Ordering::Relaxed);
        let slot = (position % self.slots.len() as u64) as usize;
        self.slots[slot].store(sample, Ordering::Relaxed);
        self.write_cursor.fetch_add(1, Ordering::Release);
    }

    /// Append a slice of samples in order.
    #[inline]
    pub fn write_slice(&self, samples: &[i16]) {
        for &sample in samples {
            self.write(sample);
        }
    }

    /// Copy up to `requested` samples starting at `cursor` into `out`.
    ///
    /// Returns the number of samples copied and advances `cursor` by that
    /// amount. Never blocks; returns 0 when the reader is caught up.
    pub fn read(&self, out: &mut [i16], requested: usize, cursor: &mut u64) -> usize {
        let write_position = self.write_cursor.load(Ordering::Acquire);
        let capacity = self.slots.len() as u64;

        if write_position.saturating_sub(*cursor) > capacity {
            *cursor = write_position - capacity;
        }
        // A cursor from before a reset points past the new write position.
        if *cursor > write_position {
            *cursor = write_position;
        }

        let available = (write_position - *cursor) as usize;
        let count = requested.min(available).min(out.len());

        for (offset, dst) in out[..count].iter_mut().enumerate() {
            let slot = ((*cursor + offset as u64) % capacity) as usize;
            *dst = self.slots[slot].load(Ordering::Relaxed);
        }
        *cursor += count as u64;
        count
    }

    /// Snapshot of the total samples written so far.
    ///
    /// Used as a starting cursor, it means "from now on".
    pub fn current_write_position(&self) -> u64 {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Samples readable from `cursor` right now, capped at capacity.
    pub fn available(&self, cursor: u64) -> u64 {
        self.current_write_position()
            .saturating_sub(cursor)
            .min(self.slots.len() as u64)
    }

    /// Rewind the write cursor to zero.
    ///
    /// Only valid while no real-time callback is running against this buffer.
    pub fn reset(&self) {
        self.write_cursor.store(0, Ordering::Release);
    }

    /// The total capacity of the buffer in samples.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn filled(capacity: usize, count: i16) -> RingBuffer {
        let buf = RingBuffer::new(capacity);
        for i in 0..count {
            buf.write(i);
        }
        buf
    }

    #[test]
    fn basic_write_read() {
        let buf = RingBuffer::new(10);
        buf.write_slice(&[1, 2, 3]);

        let mut out = [0i16; 3];
        let mut cursor = 0;
        assert_eq!(buf.read(&mut out, 3, &mut cursor), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(cursor, 3);
        assert_eq!(buf.current_write_position(), 3);
    }

    #[test]
    fn read_prefix_of_written_samples() {
        let buf = filled(100, 80);

        let mut out = vec![0i16; 25];
        let mut cursor = 0;
        assert_eq!(buf.read(&mut out, 25, &mut cursor), 25);
        assert_eq!(out, (0..25).collect::<Vec<i16>>());
        assert_eq!(cursor, 25);
    }

    #[test]
    fn read_partial() {
        let buf = filled(100, 50);

        let mut out = vec![0i16; 100];
        let mut cursor = 0;
        assert_eq!(buf.read(&mut out, 100, &mut cursor), 50);
        assert_eq!(cursor, 50);
        assert_eq!(&out[..50], (0..50).collect::<Vec<i16>>().as_slice());
    }

    #[test]
    fn independent_cursors_observe_same_sequence() {
        let buf = filled(64, 40);

        let mut a = vec![0i16; 40];
        let mut b = vec![0i16; 40];
        let (mut cursor_a, mut cursor_b) = (0, 0);
        assert_eq!(buf.read(&mut a, 40, &mut cursor_a), 40);
        assert_eq!(buf.read(&mut b, 40, &mut cursor_b), 40);
        assert_eq!(a, b);
        assert_eq!(cursor_a, cursor_b);
    }

    #[test]
    fn small_reads_match_one_large_read() {
        let buf = filled(100, 100);

        let mut whole = vec![0i16; 100];
        let mut cursor = 0;
        buf.read(&mut whole, 100, &mut cursor);

        let mut pieces = Vec::new();
        let mut cursor = 0;
        for _ in 0..10 {
            let mut out = [0i16; 10];
            assert_eq!(buf.read(&mut out, 10, &mut cursor), 10);
            pieces.extend_from_slice(&out);
        }
        assert_eq!(pieces, whole);
    }

    #[test]
    fn overflow_skips_to_oldest_retained() {
        let buf = RingBuffer::new(4);
        buf.write_slice(&[1, 2, 3, 4, 5, 6]);

        let mut out = [0i16; 4];
        let mut cursor = 0;
        assert_eq!(buf.read(&mut out, 4, &mut cursor), 4);
        assert_eq!(out, [3, 4, 5, 6]);
        assert_eq!(cursor, 6);
    }

    #[test]
    fn wraparound() {
        let buf = RingBuffer::new(4);
        let mut cursor = 0;
        let mut out = [0i16; 4];

        buf.write_slice(&[1, 2, 3]);
        assert_eq!(buf.read(&mut out, 2, &mut cursor), 2);

        buf.write_slice(&[4, 5, 6]); // wraps around
        assert_eq!(buf.read(&mut out, 4, &mut cursor), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn reset_rewinds_write_cursor() {
        let buf = filled(10, 3);
        buf.reset();

        assert_eq!(buf.current_write_position(), 0);
        let mut stale_cursor = 3;
        let mut out = [0i16; 4];
        assert_eq!(buf.read(&mut out, 4, &mut stale_cursor), 0);
        assert_eq!(stale_cursor, 0);
    }

    #[test]
    fn empty_operations() {
        let buf = RingBuffer::new(10);
        let mut out = [0i16; 5];
        let mut cursor = 0;

        assert_eq!(buf.read(&mut out, 5, &mut cursor), 0);
        assert_eq!(cursor, 0);
        buf.write_slice(&[]);
        assert_eq!(buf.current_write_position(), 0);
        assert_eq!(buf.available(0), 0);
    }

    #[test]
    fn read_is_bounded_by_output_slice() {
        let buf = filled(10, 8);
        let mut out = [0i16; 3];
        let mut cursor = 0;
        assert_eq!(buf.read(&mut out, 8, &mut cursor), 3);
        assert_eq!(cursor, 3);
    }

    #[test]
    fn concurrent_writer_and_polling_reader() {
        let buf = Arc::new(RingBuffer::new(2048));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let buf = Arc::clone(&buf);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for block in 0..10 {
                    for i in 0..100 {
                        buf.write((block * 100 + i) as i16);
                    }
                    thread::sleep(Duration::from_millis(2));
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut cursor = 0;
        let mut consumed = Vec::new();
        let mut out = [0i16; 64];
        loop {
            let finished = done.load(Ordering::SeqCst);
            let n = buf.read(&mut out, 64, &mut cursor);
            consumed.extend_from_slice(&out[..n]);
            if finished && n == 0 {
                break;
            }
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        writer.join().unwrap();

        assert_eq!(consumed.len(), 1000);
        assert_eq!(consumed, (0..1000).collect::<Vec<i16>>());
    }
}
