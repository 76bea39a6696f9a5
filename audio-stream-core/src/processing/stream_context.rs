//! Ring buffer plus direction-specific state, shared between a real-time
//! callback and the threads that feed or drain it.
//!
//! A context is built complete before it is published and is never mutated
//! structurally afterwards; reconfiguration swaps in a fresh one.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};

use crate::models::audio_models::AudioInfo;
use crate::models::config::CHUNK_DURATION_SECONDS;
use crate::processing::ring_buffer::RingBuffer;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

const ANCHOR_UNSET: u8 = 0;
const ANCHOR_LATCHING: u8 = 1;
const ANCHOR_SET: u8 = 2;

/// A ring buffer sized for `buffer_seconds` of audio, the format it holds,
/// and a direction extension `X`.
#[derive(Debug)]
pub struct StreamContext<X> {
    buffer: RingBuffer,
    info: AudioInfo,
    ext: X,
}

impl<X> StreamContext<X> {
    fn with_ext(info: AudioInfo, buffer_seconds: f64, ext: X) -> Self {
        let frames = (f64::from(info.sample_rate_hz) * buffer_seconds) as usize;
        let capacity = frames * usize::from(info.num_channels);
        Self {
            buffer: RingBuffer::new(capacity),
            info,
            ext,
        }
    }

    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate_hz
    }

    pub fn num_channels(&self) -> u16 {
        self.info.num_channels
    }
}

/// The (device time, wall clock) pair latched by the first capture callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingAnchor {
    /// Device clock time of the first captured sample, seconds.
    pub device_time: f64,
    /// Wall-clock time of the first callback, nanoseconds since the Unix epoch.
    pub wall_clock_ns: i64,
}

/// Capture-side extension: timestamp anchor and recording gate.
#[derive(Debug)]
pub struct CaptureAnchor {
    state: AtomicU8,
    device_time_bits: AtomicU64,
    wall_clock_ns: AtomicI64,
    recording: AtomicBool,
    chunk_sample_count: usize,
}

pub type CaptureContext = StreamContext<CaptureAnchor>;

impl StreamContext<CaptureAnchor> {
    pub fn new(info: AudioInfo, buffer_seconds: f64) -> Self {
        let chunk_frames = (f64::from(info.sample_rate_hz) * CHUNK_DURATION_SECONDS) as usize;
        let ext = CaptureAnchor {
            state: AtomicU8::new(ANCHOR_UNSET),
            device_time_bits: AtomicU64::new(0),
            wall_clock_ns: AtomicI64::new(0),
            recording: AtomicBool::new(true),
            chunk_sample_count: chunk_frames * usize::from(info.num_channels),
        };
        Self::with_ext(info, buffer_seconds, ext)
    }

    /// Samples (all channels) in one chunk.
    pub fn chunk_sample_count(&self) -> usize {
        self.ext.chunk_sample_count
    }

    /// Record the timing anchor if this is the first call.
    ///
    /// Returns true for the call that performed the latch. Lock-free and
    /// allocation-free; safe on the real-time thread.
    pub fn latch_anchor(&self, device_time: f64, wall_clock_ns: i64) -> bool {
        if self
            .ext
            .state
            .compare_exchange(ANCHOR_UNSET, ANCHOR_LATCHING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        self.ext
            .device_time_bits
            .store(device_time.to_bits(), Ordering::Relaxed);
        self.ext.wall_clock_ns.store(wall_clock_ns, Ordering::Relaxed);
        self.ext.state.store(ANCHOR_SET, Ordering::Release);
        true
    }

    pub fn anchor(&self) -> Option<TimingAnchor> {
        if self.ext.state.load(Ordering::Acquire) != ANCHOR_SET {
            return None;
        }
        Some(TimingAnchor {
            device_time: f64::from_bits(self.ext.device_time_bits.load(Ordering::Relaxed)),
            wall_clock_ns: self.ext.wall_clock_ns.load(Ordering::Relaxed),
        })
    }

    /// Wall-clock nanoseconds of the sample at stream index `sample_index`.
    ///
    /// Before the anchor is latched the base is 0, so the result is the
    /// elapsed time since stream start.
    pub fn timestamp_of(&self, sample_index: u64) -> i64 {
        let base = self.anchor().map(|a| a.wall_clock_ns).unwrap_or(0);
        let frame = sample_index / u64::from(self.info.num_channels.max(1));
        let elapsed =
            u128::from(frame) * NANOS_PER_SECOND / u128::from(self.info.sample_rate_hz.max(1));
        base.saturating_add(i64::try_from(elapsed).unwrap_or(i64::MAX))
    }

    /// Inverse of [`timestamp_of`](Self::timestamp_of), rounded down to a
    /// frame boundary. Timestamps before the anchor map to index 0.
    pub fn sample_index_at(&self, timestamp_ns: i64) -> u64 {
        let base = self.anchor().map(|a| a.wall_clock_ns).unwrap_or(0);
        let Ok(elapsed) = u128::try_from(timestamp_ns.saturating_sub(base)) else {
            return 0;
        };
        let frame = elapsed * u128::from(self.info.sample_rate_hz) / NANOS_PER_SECOND;
        let index = frame * u128::from(self.info.num_channels);
        u64::try_from(index).unwrap_or(u64::MAX)
    }

    pub fn is_recording(&self) -> bool {
        self.ext.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.ext.recording.store(recording, Ordering::Release);
    }
}

/// Render-side extension: how far the hardware has consumed.
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    position: AtomicU64,
}

pub type RenderContext = StreamContext<PlaybackCursor>;

impl StreamContext<PlaybackCursor> {
    pub fn new(info: AudioInfo, buffer_seconds: f64) -> Self {
        Self::with_ext(info, buffer_seconds, PlaybackCursor::default())
    }

    /// Samples consumed by the render callback so far.
    pub fn playback_position(&self) -> u64 {
        self.ext.position.load(Ordering::Acquire)
    }

    /// Read the next `requested` samples for the hardware.
    ///
    /// Only the render callback calls this, so the cursor has one owner.
    pub(crate) fn consume(&self, out: &mut [i16], requested: usize) -> usize {
        let mut cursor = self.ext.position.load(Ordering::Relaxed);
        let read = self.buffer.read(out, requested, &mut cursor);
        self.ext.position.store(cursor, Ordering::Release);
        read
    }

    /// Samples written by the application but not yet played.
    pub fn queued(&self) -> u64 {
        self.buffer
            .current_write_position()
            .saturating_sub(self.playback_position())
    }
}
