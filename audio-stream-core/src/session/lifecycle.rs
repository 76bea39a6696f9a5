use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::BUFFER_DURATION_SECONDS;
use crate::models::error::{DriverError, StreamError};
use crate::models::params::{StreamDirection, StreamParameters};
use crate::models::state::StreamState;
use crate::processing::callback::{bind_capture, bind_render};
use crate::processing::stream_context::{CaptureAnchor, PlaybackCursor, StreamContext};
use crate::traits::audio_driver::{AudioDriver, NativeStream, StreamCallback};
use crate::traits::stream_delegate::StreamDelegate;

/// Direction-specific construction for a lifecycle: how to build a fresh
/// context and bind it to a real-time callback.
pub trait StreamKind: Sized + Send + Sync + 'static {
    const DIRECTION: StreamDirection;

    fn new_context(params: &StreamParameters) -> StreamContext<Self>;

    fn bind(context: Arc<StreamContext<Self>>) -> StreamCallback;
}

impl StreamKind for CaptureAnchor {
    const DIRECTION: StreamDirection = StreamDirection::Capture;

    fn new_context(params: &StreamParameters) -> StreamContext<Self> {
        StreamContext::<CaptureAnchor>::new(params.audio_info(), BUFFER_DURATION_SECONDS)
    }

    fn bind(context: Arc<StreamContext<Self>>) -> StreamCallback {
        bind_capture(context)
    }
}

impl StreamKind for PlaybackCursor {
    const DIRECTION: StreamDirection = StreamDirection::Render;

    fn new_context(params: &StreamParameters) -> StreamContext<Self> {
        StreamContext::<PlaybackCursor>::new(params.audio_info(), BUFFER_DURATION_SECONDS)
    }

    fn bind(context: Arc<StreamContext<Self>>) -> StreamCallback {
        bind_render(context)
    }
}

/// A native stream handle that is closed exactly once, on request or on drop.
struct OwnedStream {
    inner: Box<dyn NativeStream>,
    closed: bool,
}

impl OwnedStream {
    fn new(inner: Box<dyn NativeStream>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    fn start(&mut self) -> Result<(), DriverError> {
        self.inner.start()
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.inner.stop()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

impl Drop for OwnedStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close stream on drop: {}", e);
        }
    }
}

/// Everything that must change together when the stream is swapped.
struct LiveStream<X> {
    params: StreamParameters,
    context: Arc<StreamContext<X>>,
    native: Option<OwnedStream>,
    state: StreamState,
}

/// Owns one native stream and the context its callback writes to.
///
/// Parameters, context and handle live under a single mutex that is only
/// held for bookkeeping and hardware calls, never while sessions poll. A
/// session that still holds an old context keeps reading it safely after a
/// reconfigure; the context is freed when its last holder lets go.
pub struct StreamLifecycle<X: StreamKind> {
    driver: Arc<dyn AudioDriver>,
    live: Mutex<LiveStream<X>>,
    delegate: Option<Arc<dyn StreamDelegate>>,
}

impl<X: StreamKind> StreamLifecycle<X> {
    /// Build a context for `params` and open (but do not start) a stream
    /// bound to it.
    pub fn open(
        driver: Arc<dyn AudioDriver>,
        params: StreamParameters,
        delegate: Option<Arc<dyn StreamDelegate>>,
    ) -> Result<Self, StreamError> {
        let context = Arc::new(X::new_context(&params));
        let native = open_native::<X>(driver.as_ref(), &params, &context)?;

        let lifecycle = Self {
            driver,
            live: Mutex::new(LiveStream {
                params,
                context,
                native: Some(native),
                state: StreamState::Opened,
            }),
            delegate,
        };
        lifecycle.notify_state(StreamState::Opened);
        Ok(lifecycle)
    }

    /// Start the callback. On failure the stream is closed before the
    /// error is returned.
    pub fn start(&self) -> Result<(), StreamError> {
        let mut live = self.live.lock();
        let Some(native) = live.native.as_mut() else {
            return Err(StreamError::Device("no open stream to start".into()));
        };

        if let Err(e) = native.start() {
            log::error!("Failed to start audio stream: {}", e);
            let mut errors = Vec::new();
            if let Some(mut native) = live.native.take() {
                if let Err(close_err) = native.close() {
                    log::error!("Failed to close stream after start failure: {}", close_err);
                    errors.push(close_err.into());
                }
            }
            live.state = StreamState::Closed;
            drop(live);

            self.report(errors);
            self.notify_state(StreamState::Closed);
            return Err(StreamError::Device(format!(
                "Failed to start audio stream: {}",
                e
            )));
        }

        live.state = StreamState::Started;
        drop(live);
        self.notify_state(StreamState::Started);
        Ok(())
    }

    /// Pause the callback, keeping the handle open.
    pub fn stop(&self) -> Result<(), StreamError> {
        let mut live = self.live.lock();
        let Some(native) = live.native.as_mut() else {
            return Err(StreamError::Device("no open stream to stop".into()));
        };
        native.stop().map_err(|e| {
            log::error!("Failed to stop audio stream: {}", e);
            StreamError::from(e)
        })?;
        live.state = StreamState::Stopped;
        drop(live);
        self.notify_state(StreamState::Stopped);
        Ok(())
    }

    /// Release the native handle. The context stays readable.
    pub fn close(&self) -> Result<(), StreamError> {
        let mut live = self.live.lock();
        let Some(mut native) = live.native.take() else {
            return Ok(());
        };
        live.state = StreamState::Closed;
        drop(live);

        let result = native.close().map_err(|e| {
            log::error!("Failed to close audio stream: {}", e);
            StreamError::from(e)
        });
        self.notify_state(StreamState::Closed);
        result
    }

    /// Switch to `params`, returning whether the hardware stream changed.
    ///
    /// Identical parameters on an open stream are a no-op: no hardware
    /// calls and no new context. Otherwise the new context is built first,
    /// then swapped in together with the parameters, and the old stream is
    /// torn down (best-effort) before the new one opens and starts.
    pub fn reconfigure(&self, params: StreamParameters) -> Result<bool, StreamError> {
        self.reconfigure_with(params, |_| {})
    }

    /// [`reconfigure`](Self::reconfigure), running `prepare` on the new
    /// context before it is published or any callback can reach it.
    pub fn reconfigure_with(
        &self,
        params: StreamParameters,
        prepare: impl FnOnce(&StreamContext<X>),
    ) -> Result<bool, StreamError> {
        {
            let live = self.live.lock();
            if live.params == params && live.native.is_some() {
                log::info!(
                    "Stream parameters for '{}' unchanged, keeping current stream",
                    params.device_name
                );
                return Ok(false);
            }
        }

        let context = Arc::new(X::new_context(&params));
        prepare(&context);

        let mut live = self.live.lock();
        let was_started = live.state.is_started();
        live.state = StreamState::Reconfiguring;
        let old = live.native.take();
        live.params = params.clone();
        live.context = Arc::clone(&context);

        let errors = old
            .map(|native| teardown(native, was_started))
            .unwrap_or_default();

        let opened = open_native::<X>(self.driver.as_ref(), &params, &context).and_then(
            |mut native| match native.start() {
                Ok(()) => Ok(native),
                Err(e) => {
                    log::error!("Failed to start audio stream: {}", e);
                    Err(StreamError::Device(format!(
                        "Failed to start audio stream: {}",
                        e
                    )))
                }
            },
        );

        match opened {
            Ok(native) => {
                live.native = Some(native);
                live.state = StreamState::Started;
                drop(live);
                self.report(errors);
                self.notify_state(StreamState::Started);
                if let Some(delegate) = &self.delegate {
                    delegate.on_reconfigured(&params);
                }
                Ok(true)
            }
            Err(e) => {
                live.state = StreamState::Closed;
                drop(live);
                self.report(errors);
                self.notify_state(StreamState::Closed);
                Err(e)
            }
        }
    }

    /// Stop and close the stream, logging (never returning) driver errors.
    pub fn shutdown(&self) {
        let (native, was_started) = {
            let mut live = self.live.lock();
            if live.state.is_closed() && live.native.is_none() {
                return;
            }
            let was_started = live.state.is_started();
            live.state = StreamState::Closed;
            (live.native.take(), was_started)
        };

        if let Some(native) = native {
            self.report(teardown(native, was_started));
        }
        self.notify_state(StreamState::Closed);
    }

    /// The live context. Sessions compare it by pointer to spot a swap.
    pub fn context(&self) -> Arc<StreamContext<X>> {
        Arc::clone(&self.live.lock().context)
    }

    pub fn params(&self) -> StreamParameters {
        self.live.lock().params.clone()
    }

    /// Parameters and context read under one lock.
    pub fn snapshot(&self) -> (StreamParameters, Arc<StreamContext<X>>) {
        let live = self.live.lock();
        (live.params.clone(), Arc::clone(&live.context))
    }

    pub fn state(&self) -> StreamState {
        self.live.lock().state
    }

    fn notify_state(&self, state: StreamState) {
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn report(&self, errors: Vec<StreamError>) {
        if let Some(delegate) = &self.delegate {
            for error in &errors {
                delegate.on_error(error);
            }
        }
    }
}

impl<X: StreamKind> Drop for StreamLifecycle<X> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Check the format and open a stream bound to `context`.
fn open_native<X: StreamKind>(
    driver: &dyn AudioDriver,
    params: &StreamParameters,
    context: &Arc<StreamContext<X>>,
) -> Result<OwnedStream, StreamError> {
    log::debug!(
        "Opening stream for device '{}' (index {}) with sample rate: {}, channels: {}",
        params.device_name,
        params.device_index,
        params.sample_rate,
        params.num_channels
    );

    if let Err(e) = driver.is_format_supported(params) {
        let message = format_mismatch_message(driver, params, &e);
        log::error!("{}", message);
        return Err(StreamError::Device(message));
    }

    log::info!(
        "Opening stream for device '{}' (index {}) with sample rate {} and latency {} seconds",
        params.device_name,
        params.device_index,
        params.sample_rate,
        params.latency_seconds
    );

    let native = driver
        .open_stream(params, X::bind(Arc::clone(context)))
        .map_err(|e| {
            let message = format!(
                "Failed to open audio stream for device '{}' (index {}): {} (sample_rate={}, channels={}, latency={}s)",
                params.device_name,
                params.device_index,
                e,
                params.sample_rate,
                params.num_channels,
                params.latency_seconds
            );
            log::error!("{}", message);
            StreamError::Device(message)
        })?;
    Ok(OwnedStream::new(native))
}

fn format_mismatch_message(
    driver: &dyn AudioDriver,
    params: &StreamParameters,
    err: &DriverError,
) -> String {
    let mut message = format!(
        "Audio format not supported by device '{}' (index {}): {}\n\
         Requested configuration:\n  \
         - Sample rate: {} Hz\n  \
         - Channels: {}\n  \
         - Format: 16-bit PCM\n  \
         - Latency: {} seconds",
        params.device_name,
        params.device_index,
        err,
        params.sample_rate,
        params.num_channels,
        params.latency_seconds
    );
    if let Some(info) = driver.device_info(params.device_index) {
        let max_channels = match params.direction {
            StreamDirection::Capture => info.max_input_channels,
            StreamDirection::Render => info.max_output_channels,
        };
        message.push_str(&format!(
            "\nDevice supports:\n  - Max channels: {}\n  - Default sample rate: {} Hz",
            max_channels, info.default_sample_rate
        ));
    }
    message
}

/// Stop (if running) and close, collecting rather than returning errors.
fn teardown(mut native: OwnedStream, was_started: bool) -> Vec<StreamError> {
    let mut errors = Vec::new();
    if was_started {
        if let Err(e) = native.stop() {
            log::error!("Failed to stop stream: {}", e);
            errors.push(e.into());
        }
    }
    if let Err(e) = native.close() {
        log::error!("Failed to close stream: {}", e);
        errors.push(e.into());
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use crate::processing::stream_context::CaptureContext;

    type CaptureLifecycle = StreamLifecycle<CaptureAnchor>;

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<StreamState>>,
        errors: Mutex<Vec<StreamError>>,
        reconfigured: Mutex<Vec<StreamParameters>>,
    }

    impl StreamDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: StreamState) {
            self.states.lock().push(state);
        }

        fn on_error(&self, error: &StreamError) {
            self.errors.lock().push(error.clone());
        }

        fn on_reconfigured(&self, params: &StreamParameters) {
            self.reconfigured.lock().push(params.clone());
        }
    }

    fn params(sample_rate: u32, channels: u16) -> StreamParameters {
        StreamParameters {
            device_name: "Mock Microphone".into(),
            device_index: 0,
            direction: StreamDirection::Capture,
            sample_rate,
            num_channels: channels,
            latency_seconds: 0.01,
        }
    }

    fn started(driver: &MockDriver) -> CaptureLifecycle {
        let lifecycle =
            CaptureLifecycle::open(Arc::new(driver.clone()), params(48000, 1), None).unwrap();
        lifecycle.start().unwrap();
        lifecycle
    }

    #[test]
    fn open_and_start() {
        let driver = MockDriver::new();
        let lifecycle = started(&driver);

        assert_eq!(lifecycle.state(), StreamState::Started);
        assert_eq!(driver.open_count(), 1);
        assert_eq!(driver.start_count(), 1);
        assert_eq!(lifecycle.context().chunk_sample_count(), 4800);
    }

    #[test]
    fn unsupported_format_names_requested_and_actual_values() {
        let driver = MockDriver::new();
        driver.set_reject_format(true);

        let err = CaptureLifecycle::open(Arc::new(driver.clone()), params(44100, 2), None)
            .err()
            .unwrap();

        let StreamError::Device(message) = err else {
            panic!("expected device error");
        };
        assert!(message.contains("Mock Microphone"));
        assert!(message.contains("Sample rate: 44100 Hz"));
        assert!(message.contains("Channels: 2"));
        assert!(message.contains("16-bit PCM"));
        assert!(message.contains("Default sample rate: 48000 Hz"));
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn open_failure_reports_parameters() {
        let driver = MockDriver::new();
        driver.set_fail_open(true);

        let err = CaptureLifecycle::open(Arc::new(driver.clone()), params(48000, 1), None)
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Device(msg) if msg.contains("sample_rate=48000")));
    }

    #[test]
    fn start_failure_closes_stream() {
        let driver = MockDriver::new();
        driver.set_fail_start(true);
        let lifecycle =
            CaptureLifecycle::open(Arc::new(driver.clone()), params(48000, 1), None).unwrap();

        let err = lifecycle.start().unwrap_err();

        assert!(matches!(err, StreamError::Device(msg) if msg.starts_with("Failed to start")));
        assert_eq!(driver.close_count(), 1);
        assert_eq!(driver.open_streams(), 0);
        assert_eq!(lifecycle.state(), StreamState::Closed);
    }

    #[test]
    fn identical_reconfigure_is_noop() {
        let driver = MockDriver::new();
        let lifecycle = started(&driver);
        let before = lifecycle.context();

        assert!(!lifecycle.reconfigure(params(48000, 1)).unwrap());

        assert!(Arc::ptr_eq(&before, &lifecycle.context()));
        assert_eq!(driver.open_count(), 1);
        assert_eq!(driver.stop_count(), 0);
        assert_eq!(driver.close_count(), 0);
    }

    #[test]
    fn changed_reconfigure_swaps_stream_and_context() {
        let driver = MockDriver::new();
        let delegate = Arc::new(RecordingDelegate::default());
        let lifecycle = CaptureLifecycle::open(
            Arc::new(driver.clone()),
            params(48000, 1),
            Some(delegate.clone()),
        )
        .unwrap();
        lifecycle.start().unwrap();
        let old: Arc<CaptureContext> = lifecycle.context();
        driver.fire_capture(&[1, 2, 3], 3, 0.0);

        assert!(lifecycle.reconfigure(params(16000, 2)).unwrap());

        let (new_params, new_ctx) = lifecycle.snapshot();
        assert_eq!(new_params.sample_rate, 16000);
        assert_eq!(new_ctx.num_channels(), 2);
        assert!(!Arc::ptr_eq(&old, &new_ctx));
        assert_eq!(driver.open_count(), 2);
        assert_eq!(driver.stop_count(), 1);
        assert_eq!(driver.close_count(), 1);
        assert_eq!(lifecycle.state(), StreamState::Started);
        assert_eq!(delegate.reconfigured.lock().len(), 1);

        // The old context is still readable by anyone holding it.
        let mut out = [0i16; 3];
        let mut cursor = 0;
        assert_eq!(old.buffer().read(&mut out, 3, &mut cursor), 3);
        assert_eq!(out, [1, 2, 3]);

        // New audio only reaches the new context.
        driver.fire_capture(&[9, 9], 1, 0.0);
        assert_eq!(new_ctx.buffer().current_write_position(), 2);
        assert_eq!(old.buffer().current_write_position(), 3);
    }

    #[test]
    fn failed_reconfigure_leaves_stream_closed_and_retries() {
        let driver = MockDriver::new();
        let lifecycle = started(&driver);

        driver.set_fail_open(true);
        assert!(lifecycle.reconfigure(params(16000, 1)).is_err());
        assert_eq!(lifecycle.state(), StreamState::Closed);

        driver.set_fail_open(false);
        assert!(lifecycle.reconfigure(params(16000, 1)).unwrap());
        assert_eq!(lifecycle.state(), StreamState::Started);
    }

    #[test]
    fn shutdown_is_best_effort() {
        let driver = MockDriver::new();
        let delegate = Arc::new(RecordingDelegate::default());
        let lifecycle = CaptureLifecycle::open(
            Arc::new(driver.clone()),
            params(48000, 1),
            Some(delegate.clone()),
        )
        .unwrap();
        lifecycle.start().unwrap();
        driver.set_fail_stop(true);
        driver.set_fail_close(true);

        lifecycle.shutdown();

        assert_eq!(lifecycle.state(), StreamState::Closed);
        assert_eq!(delegate.errors.lock().len(), 2);
        assert_eq!(delegate.states.lock().last(), Some(&StreamState::Closed));

        // Second shutdown has nothing left to do.
        lifecycle.shutdown();
        assert_eq!(delegate.errors.lock().len(), 2);
    }

    #[test]
    fn drop_stops_and_closes() {
        let driver = MockDriver::new();
        drop(started(&driver));

        assert_eq!(driver.stop_count(), 1);
        assert_eq!(driver.close_count(), 1);
        assert_eq!(driver.open_streams(), 0);
    }

    #[test]
    fn stop_then_close() {
        let driver = MockDriver::new();
        let lifecycle = started(&driver);

        lifecycle.stop().unwrap();
        assert_eq!(lifecycle.state(), StreamState::Stopped);
        lifecycle.close().unwrap();
        assert_eq!(lifecycle.state(), StreamState::Closed);
        assert_eq!(driver.close_count(), 1);
        assert!(lifecycle.start().is_err());
    }
}
