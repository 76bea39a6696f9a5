use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::codec::mp3_decoder::Mp3Decoder;
use crate::device::resolve::resolve_stream_parameters;
use crate::models::audio_models::{AudioCodec, AudioInfo, AudioProperties};
use crate::models::config::{StreamConfig, POLL_INTERVAL};
use crate::models::error::StreamError;
use crate::models::params::{StreamDirection, StreamParameters};
use crate::models::state::StreamState;
use crate::processing::pcm::le_bytes_to_samples;
use crate::processing::resample::PolynomialResampler;
use crate::processing::stream_context::{PlaybackCursor, RenderContext};
use crate::session::lifecycle::StreamLifecycle;
use crate::traits::audio_driver::AudioDriver;
use crate::traits::resampler::Resampler;
use crate::traits::stream_delegate::StreamDelegate;

const SUPPORTED_CODECS: [AudioCodec; 2] = [AudioCodec::Pcm16, AudioCodec::Mp3];

/// A running render stream fed by blocking [`play`](Self::play) calls.
pub struct Speaker {
    driver: Arc<dyn AudioDriver>,
    lifecycle: StreamLifecycle<PlaybackCursor>,
    resampler: Box<dyn Resampler>,
    play_lock: Mutex<()>,
}

impl Speaker {
    pub fn new(driver: Arc<dyn AudioDriver>, config: &StreamConfig) -> Result<Self, StreamError> {
        Self::with_delegate(driver, config, None)
    }

    /// Resolve `config`, then open and start the render stream.
    pub fn with_delegate(
        driver: Arc<dyn AudioDriver>,
        config: &StreamConfig,
        delegate: Option<Arc<dyn StreamDelegate>>,
    ) -> Result<Self, StreamError> {
        let params = resolve_stream_parameters(driver.as_ref(), config, StreamDirection::Render)?;
        log::info!(
            "Creating speaker on '{}' at {} Hz with {} channel(s)",
            params.device_name,
            params.sample_rate,
            params.num_channels
        );

        let lifecycle = StreamLifecycle::open(Arc::clone(&driver), params, delegate)?;
        lifecycle.start()?;

        Ok(Self {
            driver,
            lifecycle,
            resampler: Box::new(PolynomialResampler::new()),
            play_lock: Mutex::new(()),
        })
    }

    /// Replace the resampler used when input and stream rates differ.
    pub fn with_resampler(mut self, resampler: Box<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    /// Apply new attributes. Returns false when nothing changed.
    pub fn reconfigure(&self, config: &StreamConfig) -> Result<bool, StreamError> {
        let params =
            resolve_stream_parameters(self.driver.as_ref(), config, StreamDirection::Render)?;
        self.lifecycle.reconfigure(params)
    }

    pub fn properties(&self) -> AudioProperties {
        let params = self.lifecycle.params();
        AudioProperties {
            supported_codecs: SUPPORTED_CODECS.to_vec(),
            sample_rate_hz: params.sample_rate,
            num_channels: params.num_channels,
        }
    }

    pub fn params(&self) -> StreamParameters {
        self.lifecycle.params()
    }

    pub fn state(&self) -> StreamState {
        self.lifecycle.state()
    }

    /// Play `data` and block until the hardware has consumed all of it.
    ///
    /// `info` describes `data`; for MP3 the rate and channel count come from
    /// the stream header instead. Audio at a different rate is resampled, a
    /// different channel count is an error. Concurrent calls are serialized.
    pub fn play(&self, data: &[u8], info: &AudioInfo) -> Result<(), StreamError> {
        let _playing = self.play_lock.lock();
        let context = self.lifecycle.context();

        let (mut samples, sample_rate, num_channels) = match info.codec {
            AudioCodec::Pcm16 => (
                le_bytes_to_samples(data),
                info.sample_rate_hz,
                info.num_channels,
            ),
            AudioCodec::Mp3 => {
                let mut decoder = Mp3Decoder::new();
                let mut pcm = Vec::new();
                decoder.decode(data, &mut pcm)?;
                (
                    le_bytes_to_samples(&pcm),
                    decoder.sample_rate(),
                    decoder.num_channels(),
                )
            }
        };

        if samples.is_empty() {
            log::debug!("Nothing to play");
            return Ok(());
        }
        if num_channels != context.num_channels() {
            return Err(StreamError::ConfigurationFailed(format!(
                "audio has {} channel(s) but the speaker is configured for {}",
                num_channels,
                context.num_channels()
            )));
        }
        let channels = usize::from(num_channels);
        samples.truncate(samples.len() - samples.len() % channels);

        if sample_rate != context.sample_rate() {
            log::debug!(
                "Resampling playback audio from {} Hz to {} Hz",
                sample_rate,
                context.sample_rate()
            );
            samples =
                self.resampler
                    .resample(sample_rate, context.sample_rate(), num_channels, &samples)?;
        }

        log::info!(
            "Playing {} frames at {} Hz",
            samples.len() / channels,
            context.sample_rate()
        );
        self.write_all(&context, &samples)?;
        self.drain(&context)
    }

    /// Write `samples` without overrunning audio the callback has not played.
    fn write_all(&self, context: &Arc<RenderContext>, samples: &[i16]) -> Result<(), StreamError> {
        let capacity = context.buffer().capacity() as u64;
        let mut offset = 0;
        while offset < samples.len() {
            let free = capacity.saturating_sub(context.queued());
            if free == 0 {
                self.ensure_live(context)?;
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            let n = (samples.len() - offset).min(free as usize);
            context.buffer().write_slice(&samples[offset..offset + n]);
            offset += n;
        }
        Ok(())
    }

    /// Wait until the playback cursor reaches the write position.
    fn drain(&self, context: &Arc<RenderContext>) -> Result<(), StreamError> {
        while context.queued() > 0 {
            self.ensure_live(context)?;
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Playback cannot complete once the stream it targets is gone.
    fn ensure_live(&self, context: &Arc<RenderContext>) -> Result<(), StreamError> {
        if !self.lifecycle.state().is_started() {
            return Err(StreamError::Device(
                "speaker stream is not running".into(),
            ));
        }
        if !Arc::ptr_eq(context, &self.lifecycle.context()) {
            log::warn!("Speaker was reconfigured during playback, abandoning remaining audio");
            return Err(StreamError::Device(
                "speaker was reconfigured during playback".into(),
            ));
        }
        Ok(())
    }
}
