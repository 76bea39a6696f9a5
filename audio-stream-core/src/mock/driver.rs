use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::DeviceInfo;
use crate::models::error::DriverError;
use crate::models::params::{StreamDirection, StreamParameters};
use crate::traits::audio_driver::{
    AudioDriver, CallbackFlow, CallbackTiming, NativeStream, StreamCallback,
};

struct MockSlot {
    id: u64,
    callback: StreamCallback,
    started: bool,
}

#[derive(Default)]
struct MockState {
    initialized: bool,
    opened: usize,
    started: usize,
    stopped: usize,
    closed: usize,
    fail_open: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_close: bool,
    reject_format: bool,
    next_id: u64,
    slots: Vec<MockSlot>,
    last_params: Option<StreamParameters>,
}

/// Scriptable [`AudioDriver`] that records every call.
///
/// Tests push audio through an open stream with [`fire_capture`] and pull it
/// with [`pull_render`], standing in for the hardware thread. Clones share
/// state, so one clone can be handed to a stream while the test keeps another.
///
/// [`fire_capture`]: MockDriver::fire_capture
/// [`pull_render`]: MockDriver::pull_render
#[derive(Clone)]
pub struct MockDriver {
    devices: Arc<Vec<DeviceInfo>>,
    default_input: Option<usize>,
    default_output: Option<usize>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Default low latency reported for every mock device, seconds.
    pub const DEFAULT_LATENCY: f64 = 0.01;

    /// One stereo 48 kHz microphone and one stereo 48 kHz speaker.
    pub fn new() -> Self {
        Self::with_devices(vec![
            Self::input_device("Mock Microphone", 2, 48000.0),
            Self::output_device("Mock Speaker", 2, 48000.0),
        ])
    }

    /// Defaults are the first device with input and with output channels.
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        let default_input = devices.iter().position(|d| d.max_input_channels > 0);
        let default_output = devices.iter().position(|d| d.max_output_channels > 0);
        Self {
            devices: Arc::new(devices),
            default_input,
            default_output,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_defaults(mut self, input: Option<usize>, output: Option<usize>) -> Self {
        self.default_input = input;
        self.default_output = output;
        self
    }

    pub fn input_device(name: &str, channels: u16, sample_rate: f64) -> DeviceInfo {
        Self::duplex_device(name, channels, 0, sample_rate)
    }

    pub fn output_device(name: &str, channels: u16, sample_rate: f64) -> DeviceInfo {
        Self::duplex_device(name, 0, channels, sample_rate)
    }

    pub fn duplex_device(name: &str, inputs: u16, outputs: u16, sample_rate: f64) -> DeviceInfo {
        DeviceInfo {
            name: name.to_string(),
            max_input_channels: inputs,
            max_output_channels: outputs,
            default_sample_rate: sample_rate,
            default_low_input_latency: Self::DEFAULT_LATENCY,
            default_low_output_latency: Self::DEFAULT_LATENCY,
        }
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().fail_close = fail;
    }

    pub fn set_reject_format(&self, reject: bool) {
        self.state.lock().reject_format = reject;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opened
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().started
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().stopped
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closed
    }

    /// Streams opened and not yet closed.
    pub fn open_streams(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Parameters of the most recent successful open.
    pub fn last_params(&self) -> Option<StreamParameters> {
        self.state.lock().last_params.clone()
    }

    /// Deliver one input buffer to the newest running capture stream.
    ///
    /// Returns None when no capture stream is running.
    pub fn fire_capture(&self, input: &[i16], frames: usize, adc_time: f64) -> Option<CallbackFlow> {
        let timing = CallbackTiming {
            input_adc_time: adc_time,
            output_dac_time: 0.0,
        };
        let mut state = self.state.lock();
        state.slots.iter_mut().rev().find_map(|slot| match &mut slot.callback {
            StreamCallback::Capture(callback) if slot.started => {
                Some(callback(Some(input), frames, &timing))
            }
            _ => None,
        })
    }

    /// Request one output buffer from the newest running render stream.
    ///
    /// Returns None when no render stream is running.
    pub fn pull_render(&self, output: &mut [i16], frames: usize) -> Option<CallbackFlow> {
        let timing = CallbackTiming::default();
        let mut state = self.state.lock();
        state.slots.iter_mut().rev().find_map(|slot| match &mut slot.callback {
            StreamCallback::Render(callback) if slot.started => {
                Some(callback(&mut *output, frames, &timing))
            }
            _ => None,
        })
    }
}

impl AudioDriver for MockDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        self.state.lock().initialized = true;
        Ok(())
    }

    fn terminate(&self) -> Result<(), DriverError> {
        self.state.lock().initialized = false;
        Ok(())
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_info(&self, index: usize) -> Option<DeviceInfo> {
        self.devices.get(index).cloned()
    }

    fn default_input_device(&self) -> Option<usize> {
        self.default_input
    }

    fn default_output_device(&self) -> Option<usize> {
        self.default_output
    }

    fn is_format_supported(&self, params: &StreamParameters) -> Result<(), DriverError> {
        let info = self
            .devices
            .get(params.device_index)
            .ok_or(DriverError::InvalidDevice(params.device_index))?;
        if self.state.lock().reject_format {
            return Err(DriverError::FormatNotSupported("Invalid sample rate".into()));
        }
        let max_channels = match params.direction {
            StreamDirection::Capture => info.max_input_channels,
            StreamDirection::Render => info.max_output_channels,
        };
        if params.num_channels > max_channels {
            return Err(DriverError::FormatNotSupported("Invalid number of channels".into()));
        }
        Ok(())
    }

    fn open_stream(
        &self,
        params: &StreamParameters,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, DriverError> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(DriverError::Host("Device unavailable".into()));
        }
        state.opened += 1;
        state.next_id += 1;
        let id = state.next_id;
        state.slots.push(MockSlot {
            id,
            callback,
            started: false,
        });
        state.last_params = Some(params.clone());
        Ok(Box::new(MockStream {
            id,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockStream {
    id: u64,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockStream {
    fn slot<'a>(&self, state: &'a mut MockState) -> Option<&'a mut MockSlot> {
        state.slots.iter_mut().find(|s| s.id == self.id)
    }
}

impl NativeStream for MockStream {
    fn start(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::StreamClosed);
        }
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(DriverError::Host("Internal host error".into()));
        }
        state.started += 1;
        if let Some(slot) = self.slot(&mut state) {
            slot.started = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::StreamClosed);
        }
        let mut state = self.state.lock();
        if state.fail_stop {
            return Err(DriverError::Host("Stream is stopped".into()));
        }
        state.stopped += 1;
        if let Some(slot) = self.slot(&mut state) {
            slot.started = false;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = self.state.lock();
        state.slots.retain(|s| s.id != self.id);
        if state.fail_close {
            return Err(DriverError::Host("Bad stream pointer".into()));
        }
        state.closed += 1;
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        if !self.closed {
            self.state.lock().slots.retain(|s| s.id != self.id);
        }
    }
}
