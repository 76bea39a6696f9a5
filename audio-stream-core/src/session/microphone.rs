use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::codec::mp3_encoder::Mp3Encoder;
use crate::device::resolve::resolve_stream_parameters;
use crate::models::audio_models::{AudioCodec, AudioInfo, AudioProperties};
use crate::models::chunk::AudioChunk;
use crate::models::config::{StreamConfig, CHUNK_DURATION_SECONDS, POLL_INTERVAL};
use crate::models::error::StreamError;
use crate::models::params::{StreamDirection, StreamParameters};
use crate::models::state::StreamState;
use crate::processing::pcm::samples_to_le_bytes;
use crate::processing::stream_context::{CaptureAnchor, CaptureContext};
use crate::session::lifecycle::StreamLifecycle;
use crate::traits::audio_driver::AudioDriver;
use crate::traits::stream_delegate::StreamDelegate;

const SUPPORTED_CODECS: [AudioCodec; 2] = [AudioCodec::Pcm16, AudioCodec::Mp3];

/// A running capture stream that any number of sessions can read from.
///
/// The stream starts when the microphone is created and keeps filling its
/// ring buffer whether or not a session is attached. Each call to
/// [`get_audio`](Self::get_audio) follows the live write position with its
/// own cursor.
pub struct Microphone {
    driver: Arc<dyn AudioDriver>,
    lifecycle: StreamLifecycle<CaptureAnchor>,
    active_sessions: AtomicUsize,
    paused: AtomicBool,
}

impl Microphone {
    pub fn new(driver: Arc<dyn AudioDriver>, config: &StreamConfig) -> Result<Self, StreamError> {
        Self::with_delegate(driver, config, None)
    }

    /// Resolve `config`, then open and start the capture stream.
    pub fn with_delegate(
        driver: Arc<dyn AudioDriver>,
        config: &StreamConfig,
        delegate: Option<Arc<dyn StreamDelegate>>,
    ) -> Result<Self, StreamError> {
        let params = resolve_stream_parameters(driver.as_ref(), config, StreamDirection::Capture)?;
        log::info!(
            "Creating microphone on '{}' at {} Hz with {} channel(s)",
            params.device_name,
            params.sample_rate,
            params.num_channels
        );

        let lifecycle = StreamLifecycle::open(Arc::clone(&driver), params, delegate)?;
        lifecycle.start()?;

        Ok(Self {
            driver,
            lifecycle,
            active_sessions: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
        })
    }

    /// Apply new attributes. Returns false when nothing changed.
    ///
    /// Running sessions pick up the new stream on their next poll.
    pub fn reconfigure(&self, config: &StreamConfig) -> Result<bool, StreamError> {
        let params =
            resolve_stream_parameters(self.driver.as_ref(), config, StreamDirection::Capture)?;

        let active = self.active_sessions.load(Ordering::Acquire);
        if active > 0 {
            log::info!(
                "Reconfiguring microphone with {} active audio session(s)",
                active
            );
        }

        let changed = self.lifecycle.reconfigure_with(params, |context| {
            if self.paused.load(Ordering::Acquire) {
                context.set_recording(false);
            }
        })?;
        // A pause that raced the swap landed on the old context.
        if changed && self.paused.load(Ordering::Acquire) {
            self.lifecycle.context().set_recording(false);
        }
        Ok(changed)
    }

    pub fn properties(&self) -> AudioProperties {
        let params = self.lifecycle.params();
        AudioProperties {
            supported_codecs: SUPPORTED_CODECS.to_vec(),
            sample_rate_hz: params.sample_rate,
            num_channels: params.num_channels,
        }
    }

    /// Drop incoming audio until [`resume`](Self::resume). The stream keeps
    /// running.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.lifecycle.context().set_recording(false);
        log::info!("Microphone paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.lifecycle.context().set_recording(true);
        log::info!("Microphone resumed");
    }

    pub fn is_recording(&self) -> bool {
        self.lifecycle.context().is_recording()
    }

    pub fn params(&self) -> StreamParameters {
        self.lifecycle.params()
    }

    pub fn state(&self) -> StreamState {
        self.lifecycle.state()
    }

    /// Sessions currently inside [`get_audio`](Self::get_audio).
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Stream chunks of ~100 ms to `handler` until it returns false or
    /// `duration_seconds` (counted from the first chunk) runs out. A
    /// duration of zero or less streams until the handler stops.
    ///
    /// `codec` is `"pcm16"` or `"mp3"`. Reading starts at the live write
    /// position; `previous_timestamp_ns` is accepted for API compatibility
    /// but not used to rewind.
    pub fn get_audio<F>(
        &self,
        codec: &str,
        mut handler: F,
        duration_seconds: f64,
        previous_timestamp_ns: i64,
    ) -> Result<(), StreamError>
    where
        F: FnMut(AudioChunk) -> bool,
    {
        let codec: AudioCodec = codec.parse()?;
        let _session = SessionGuard::enter(&self.active_sessions);

        let mut context = self.lifecycle.context();
        let mut chunk_samples = checked_chunk_size(&context)?;
        let mut cursor = context.buffer().current_write_position();
        if previous_timestamp_ns != 0 {
            let requested = context.sample_index_at(previous_timestamp_ns);
            log::debug!(
                "Resume point {} ns is {} samples behind the live position, streaming from live",
                previous_timestamp_ns,
                cursor.saturating_sub(requested)
            );
        }
        let mut samples = vec![0i16; chunk_samples];

        let mut encoder = match codec {
            AudioCodec::Mp3 => Some(Mp3Encoder::new(
                context.sample_rate(),
                context.num_channels(),
            )?),
            AudioCodec::Pcm16 => None,
        };
        let mut encoded = Vec::new();
        // First stream index not yet covered by a delivered MP3 chunk.
        let mut pending_start: Option<u64> = None;

        // Durations too large for `Duration` (including infinity) are unbounded.
        let limit = (duration_seconds > 0.0)
            .then(|| Duration::try_from_secs_f64(duration_seconds).ok())
            .flatten();
        let mut deadline: Option<Instant> = None;
        let mut sink = ChunkSink {
            handler: &mut handler,
            sequence_number: 0,
        };

        log::info!(
            "Starting {} audio session at {} Hz with {} channel(s), chunk size {} samples",
            codec,
            context.sample_rate(),
            context.num_channels(),
            chunk_samples
        );

        loop {
            let live = self.lifecycle.context();
            if !Arc::ptr_eq(&live, &context) {
                log::info!(
                    "Detected stream change, switching to {} Hz with {} channel(s)",
                    live.sample_rate(),
                    live.num_channels()
                );
                if let Some(encoder) = encoder.as_mut() {
                    let first = pending_start.take();
                    if !flush_encoder(encoder, first, &context, &mut encoded, &mut sink)? {
                        return Ok(());
                    }
                    *encoder = Mp3Encoder::new(live.sample_rate(), live.num_channels())?;
                }
                context = live;
                chunk_samples = checked_chunk_size(&context)?;
                samples.resize(chunk_samples, 0);
                cursor = context.buffer().current_write_position();
                continue;
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::debug!("Audio session duration reached");
                break;
            }

            if context.buffer().available(cursor) < chunk_samples as u64 {
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            let read = context.buffer().read(&mut samples, chunk_samples, &mut cursor);
            let start_index = cursor - read as u64;
            if deadline.is_none() {
                deadline = limit.map(|limit| Instant::now() + limit);
            }

            let keep_going = match encoder.as_mut() {
                None => sink.deliver(
                    *context.info(),
                    context.timestamp_of(start_index),
                    context.timestamp_of(cursor),
                    samples_to_le_bytes(&samples[..read]),
                ),
                Some(encoder) => {
                    let first = *pending_start.get_or_insert(if encoder.backlog_len() == 0 {
                        start_index
                    } else {
                        encoder.backlog_start_position()
                    });
                    encoded.clear();
                    encoder.encode(&samples[..read], start_index, &mut encoded)?;
                    if encoded.is_empty() {
                        true
                    } else {
                        pending_start = None;
                        sink.deliver(
                            mp3_info(&context),
                            context.timestamp_of(first),
                            context.timestamp_of(encoder.backlog_start_position()),
                            std::mem::take(&mut encoded),
                        )
                    }
                }
            };
            if !keep_going {
                log::debug!("Audio session stopped by handler");
                return Ok(());
            }
        }

        if let Some(encoder) = encoder.as_mut() {
            flush_encoder(encoder, pending_start, &context, &mut encoded, &mut sink)?;
        }
        Ok(())
    }
}

/// Hands numbered chunks to the session handler.
struct ChunkSink<'a, F> {
    handler: &'a mut F,
    sequence_number: u64,
}

impl<F: FnMut(AudioChunk) -> bool> ChunkSink<'_, F> {
    fn deliver(&mut self, info: AudioInfo, start_ns: i64, end_ns: i64, data: Vec<u8>) -> bool {
        let chunk = AudioChunk {
            info,
            sequence_number: self.sequence_number,
            start_timestamp_ns: start_ns,
            end_timestamp_ns: end_ns,
            audio_data: data,
        };
        self.sequence_number += 1;
        (self.handler)(chunk)
    }
}

/// Drain `encoder` and deliver any tail bytes. Returns the handler's verdict.
fn flush_encoder<F: FnMut(AudioChunk) -> bool>(
    encoder: &mut Mp3Encoder,
    pending_start: Option<u64>,
    context: &CaptureContext,
    encoded: &mut Vec<u8>,
    sink: &mut ChunkSink<'_, F>,
) -> Result<bool, StreamError> {
    let first = pending_start.unwrap_or(encoder.backlog_start_position());
    encoded.clear();
    encoder.flush(encoded)?;
    if encoded.is_empty() {
        return Ok(true);
    }
    Ok(sink.deliver(
        mp3_info(context),
        context.timestamp_of(first),
        context.timestamp_of(encoder.backlog_start_position()),
        std::mem::take(encoded),
    ))
}

fn mp3_info(context: &CaptureContext) -> AudioInfo {
    AudioInfo {
        codec: AudioCodec::Mp3,
        sample_rate_hz: context.sample_rate(),
        num_channels: context.num_channels(),
    }
}

fn checked_chunk_size(context: &CaptureContext) -> Result<usize, StreamError> {
    match context.chunk_sample_count() {
        0 => Err(StreamError::Session(format!(
            "invalid chunk size for sample rate {} Hz, {} channel(s) and chunk duration {} s",
            context.sample_rate(),
            context.num_channels(),
            CHUNK_DURATION_SECONDS
        ))),
        n => Ok(n),
    }
}

/// Counts a session as active for as long as it lives.
struct SessionGuard<'a>(&'a AtomicUsize);

impl<'a> SessionGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
