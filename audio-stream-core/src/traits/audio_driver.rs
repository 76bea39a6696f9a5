use crate::models::audio_models::DeviceInfo;
use crate::models::error::DriverError;
use crate::models::params::StreamParameters;

/// What a real-time callback tells the driver to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    Continue,
    /// Stop invoking the callback; the stream is considered dead.
    Abort,
}

/// Device-clock timing for one callback invocation, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallbackTiming {
    /// When the first input sample of this buffer hit the ADC.
    pub input_adc_time: f64,
    /// When the first output sample of this buffer will hit the DAC.
    pub output_dac_time: f64,
}

/// Capture callback: `(input, frames, timing)`. `input` is None when the
/// hardware had nothing to deliver this tick.
pub type CaptureFn = Box<dyn FnMut(Option<&[i16]>, usize, &CallbackTiming) -> CallbackFlow + Send>;

/// Render callback: `(output, frames, timing)`. The callback must fill all
/// of `output`.
pub type RenderFn = Box<dyn FnMut(&mut [i16], usize, &CallbackTiming) -> CallbackFlow + Send>;

/// The real-time function a native stream drives.
///
/// Invoked on the driver's audio thread: implementations must not allocate,
/// lock, or block.
pub enum StreamCallback {
    Capture(CaptureFn),
    Render(RenderFn),
}

/// An opened hardware stream.
///
/// `close` releases the handle; calling it twice must be harmless.
pub trait NativeStream: Send {
    fn start(&mut self) -> Result<(), DriverError>;

    fn stop(&mut self) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

/// Interface to the host audio system.
///
/// Implemented by:
/// - `CpalDriver` (audio-stream-cpal)
/// - `MockDriver` (tests, `mock` feature)
pub trait AudioDriver: Send + Sync {
    fn initialize(&self) -> Result<(), DriverError>;

    fn terminate(&self) -> Result<(), DriverError>;

    fn device_count(&self) -> usize;

    /// None if the index is out of range or the device vanished.
    fn device_info(&self, index: usize) -> Option<DeviceInfo>;

    fn default_input_device(&self) -> Option<usize>;

    fn default_output_device(&self) -> Option<usize>;

    /// Whether the device can run 16-bit PCM with these parameters.
    fn is_format_supported(&self, params: &StreamParameters) -> Result<(), DriverError>;

    /// Open (but do not start) a stream bound to `callback`.
    fn open_stream(
        &self,
        params: &StreamParameters,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, DriverError>;
}
