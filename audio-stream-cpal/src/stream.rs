//! cpal streams driven from a dedicated control thread.
//!
//! `cpal::Stream` is not `Send` on every host, so each stream is built and
//! owned by its own thread. The [`CpalStream`] handle talks to that thread
//! over a command channel and waits for each reply.

use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamInstant, SupportedBufferSize};
use crossbeam_channel::{bounded, Receiver, Sender};

use audio_stream_core::models::error::DriverError;
use audio_stream_core::models::params::{StreamDirection, StreamParameters};
use audio_stream_core::processing::pcm::{f32_to_i16, i16_to_f32};
use audio_stream_core::traits::audio_driver::{
    CallbackFlow, CallbackTiming, CaptureFn, NativeStream, RenderFn, StreamCallback,
};

use crate::device::find_device;
use crate::error::CpalError;

/// Frames converted per piece when the device runs in `f32`.
const SCRATCH_FRAMES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Close,
}

type Reply = Sender<Result<(), DriverError>>;

/// Handle to a stream living on its control thread.
pub struct CpalStream {
    commands: Sender<(Command, Reply)>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalStream {
    /// Spawn the control thread and wait until the stream is built.
    pub(crate) fn open(
        host_id: cpal::HostId,
        params: &StreamParameters,
        sample_format: SampleFormat,
        callback: StreamCallback,
    ) -> Result<Self, DriverError> {
        let (command_tx, command_rx) = bounded::<(Command, Reply)>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), DriverError>>(1);
        let params = params.clone();

        let name = match params.direction {
            StreamDirection::Capture => "audio-stream-capture",
            StreamDirection::Render => "audio-stream-render",
        };
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || control_loop(host_id, params, sample_format, callback, ready_tx, command_rx))
            .map_err(|e| CpalError::Thread(format!("failed to spawn stream thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands: command_tx,
                thread: Some(handle),
            }),
            Ok(Err(e)) => {
                join(handle);
                Err(e)
            }
            Err(_) => {
                join(handle);
                Err(CpalError::Thread("stream thread exited during setup".into()).into())
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), DriverError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send((command, reply_tx))
            .map_err(|_| DriverError::StreamClosed)?;
        reply_rx.recv().map_err(|_| DriverError::StreamClosed)?
    }
}

impl NativeStream for CpalStream {
    fn start(&mut self) -> Result<(), DriverError> {
        if self.thread.is_none() {
            return Err(DriverError::StreamClosed);
        }
        self.send(Command::Start)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if self.thread.is_none() {
            return Err(DriverError::StreamClosed);
        }
        self.send(Command::Stop)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        let result = self.send(Command::Close);
        join(handle);
        result
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close cpal stream: {}", e);
        }
    }
}

fn join(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Audio stream thread panicked");
    }
}

/// Body of the control thread: build, report readiness, then serve commands
/// until Close or until the handle is dropped.
fn control_loop(
    host_id: cpal::HostId,
    params: StreamParameters,
    sample_format: SampleFormat,
    callback: StreamCallback,
    ready: Sender<Result<(), DriverError>>,
    commands: Receiver<(Command, Reply)>,
) {
    let stream = match build_stream(host_id, &params, sample_format, callback) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("Failed to build stream for '{}': {}", params.device_name, e);
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    for (command, reply) in commands.iter() {
        let result: Result<(), DriverError> = match command {
            Command::Start => stream.play().map_err(|e| CpalError::from(e).into()),
            Command::Stop => stream.pause().map_err(|e| CpalError::from(e).into()),
            Command::Close => {
                drop(stream);
                log::debug!("Closed stream for '{}'", params.device_name);
                let _ = reply.send(Ok(()));
                return;
            }
        };
        let _ = reply.send(result);
    }
}

fn build_stream(
    host_id: cpal::HostId,
    params: &StreamParameters,
    sample_format: SampleFormat,
    callback: StreamCallback,
) -> Result<cpal::Stream, DriverError> {
    let host = cpal::host_from_id(host_id).map_err(CpalError::from)?;
    let device = find_device(&host, params.device_index, &params.device_name)?;

    let buffer_range = match params.direction {
        StreamDirection::Capture => device.default_input_config(),
        StreamDirection::Render => device.default_output_config(),
    }
    .map(|c| c.buffer_size().clone())
    .unwrap_or(SupportedBufferSize::Unknown);

    let config = cpal::StreamConfig {
        channels: params.num_channels,
        sample_rate: SampleRate(params.sample_rate),
        buffer_size: choose_buffer_size(params.latency_seconds, params.sample_rate, &buffer_range),
    };
    log::info!(
        "Building {:?} stream on '{}': {} Hz, {} channel(s), {:?}, buffer {:?}",
        params.direction,
        params.device_name,
        params.sample_rate,
        params.num_channels,
        sample_format,
        config.buffer_size
    );

    let device_name = params.device_name.clone();
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Audio stream error on '{}': {}", device_name, err);
    };
    let channels = usize::from(params.num_channels.max(1));
    let rate = params.sample_rate;

    let stream = match (callback, sample_format) {
        (StreamCallback::Capture(cb), SampleFormat::I16) => {
            let mut capture = CaptureState::new(cb, channels, rate);
            device.build_input_stream(
                &config,
                move |data: &[i16], info: &cpal::InputCallbackInfo| {
                    capture.deliver_i16(data, info.timestamp().capture)
                },
                err_fn,
                None,
            )
        }
        (StreamCallback::Capture(cb), SampleFormat::F32) => {
            let mut capture = CaptureState::new(cb, channels, rate);
            device.build_input_stream(
                &config,
                move |data: &[f32], info: &cpal::InputCallbackInfo| {
                    capture.deliver_f32(data, info.timestamp().capture)
                },
                err_fn,
                None,
            )
        }
        (StreamCallback::Render(cb), SampleFormat::I16) => {
            let mut render = RenderState::new(cb, channels, rate);
            device.build_output_stream(
                &config,
                move |data: &mut [i16], info: &cpal::OutputCallbackInfo| {
                    render.fill_i16(data, info.timestamp().playback)
                },
                err_fn,
                None,
            )
        }
        (StreamCallback::Render(cb), SampleFormat::F32) => {
            let mut render = RenderState::new(cb, channels, rate);
            device.build_output_stream(
                &config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    render.fill_f32(data, info.timestamp().playback)
                },
                err_fn,
                None,
            )
        }
        (_, other) => {
            return Err(DriverError::FormatNotSupported(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(CpalError::from)?;

    Ok(stream)
}

/// Fixed buffer of `latency × rate` frames when the host allows it,
/// otherwise the host default.
pub(crate) fn choose_buffer_size(
    latency_seconds: f64,
    sample_rate: u32,
    supported: &SupportedBufferSize,
) -> BufferSize {
    if latency_seconds <= 0.0 {
        return BufferSize::Default;
    }
    let frames = (latency_seconds * f64::from(sample_rate)).round() as u32;
    match supported {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            BufferSize::Fixed(frames)
        }
        _ => BufferSize::Default,
    }
}

/// Device time in seconds, measured from the first callback.
#[derive(Default)]
struct StreamClock {
    origin: Option<StreamInstant>,
}

impl StreamClock {
    fn seconds(&mut self, now: StreamInstant) -> f64 {
        let origin = *self.origin.get_or_insert(now);
        now.duration_since(&origin)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Capture side of the real-time thread. All buffers are allocated here,
/// before the stream starts.
struct CaptureState {
    callback: CaptureFn,
    clock: StreamClock,
    scratch: Vec<i16>,
    channels: usize,
    sample_rate: u32,
    aborted: bool,
}

impl CaptureState {
    fn new(callback: CaptureFn, channels: usize, sample_rate: u32) -> Self {
        Self {
            callback,
            clock: StreamClock::default(),
            scratch: vec![0; SCRATCH_FRAMES * channels],
            channels,
            sample_rate,
            aborted: false,
        }
    }

    fn deliver_i16(&mut self, data: &[i16], instant: StreamInstant) {
        if self.aborted {
            return;
        }
        let timing = CallbackTiming {
            input_adc_time: self.clock.seconds(instant),
            output_dac_time: 0.0,
        };
        let frames = data.len() / self.channels;
        if (self.callback)(Some(data), frames, &timing) == CallbackFlow::Abort {
            self.aborted = true;
        }
    }

    fn deliver_f32(&mut self, data: &[f32], instant: StreamInstant) {
        if self.aborted {
            return;
        }
        let start = self.clock.seconds(instant);
        let rate = f64::from(self.sample_rate);
        let callback = &mut self.callback;
        let flow = convert_capture(
            data,
            &mut self.scratch,
            self.channels,
            |piece, frames, offset_frames| {
                let timing = CallbackTiming {
                    input_adc_time: start + offset_frames as f64 / rate,
                    output_dac_time: 0.0,
                };
                callback(Some(piece), frames, &timing)
            },
        );
        if flow == CallbackFlow::Abort {
            self.aborted = true;
        }
    }
}

/// Render side of the real-time thread.
struct RenderState {
    callback: RenderFn,
    clock: StreamClock,
    scratch: Vec<i16>,
    channels: usize,
    sample_rate: u32,
    aborted: bool,
}

impl RenderState {
    fn new(callback: RenderFn, channels: usize, sample_rate: u32) -> Self {
        Self {
            callback,
            clock: StreamClock::default(),
            scratch: vec![0; SCRATCH_FRAMES * channels],
            channels,
            sample_rate,
            aborted: false,
        }
    }

    fn fill_i16(&mut self, data: &mut [i16], instant: StreamInstant) {
        if self.aborted {
            data.fill(0);
            return;
        }
        let timing = CallbackTiming {
            input_adc_time: 0.0,
            output_dac_time: self.clock.seconds(instant),
        };
        let frames = data.len() / self.channels;
        if (self.callback)(data, frames, &timing) == CallbackFlow::Abort {
            self.aborted = true;
        }
    }

    fn fill_f32(&mut self, data: &mut [f32], instant: StreamInstant) {
        if self.aborted {
            data.fill(0.0);
            return;
        }
        let start = self.clock.seconds(instant);
        let rate = f64::from(self.sample_rate);
        let callback = &mut self.callback;
        let flow = convert_render(
            data,
            &mut self.scratch,
            self.channels,
            |piece, frames, offset_frames| {
                let timing = CallbackTiming {
                    input_adc_time: 0.0,
                    output_dac_time: start + offset_frames as f64 / rate,
                };
                callback(piece, frames, &timing)
            },
        );
        if flow == CallbackFlow::Abort {
            self.aborted = true;
        }
    }
}

/// Feed `data` to `deliver` as i16 in scratch-sized, frame-aligned pieces.
/// Stops at the first Abort.
fn convert_capture(
    data: &[f32],
    scratch: &mut [i16],
    channels: usize,
    mut deliver: impl FnMut(&[i16], usize, usize) -> CallbackFlow,
) -> CallbackFlow {
    let piece_len = (scratch.len() / channels).max(1) * channels;
    let mut offset_frames = 0;
    for piece in data.chunks(piece_len) {
        let out = &mut scratch[..piece.len()];
        for (dst, &src) in out.iter_mut().zip(piece) {
            *dst = f32_to_i16(src);
        }
        let frames = piece.len() / channels;
        if deliver(out, frames, offset_frames) == CallbackFlow::Abort {
            return CallbackFlow::Abort;
        }
        offset_frames += frames;
    }
    CallbackFlow::Continue
}

/// Fill `data` from `produce` through the i16 scratch buffer. Stops at the
/// first Abort, leaving the rest silent.
fn convert_render(
    data: &mut [f32],
    scratch: &mut [i16],
    channels: usize,
    mut produce: impl FnMut(&mut [i16], usize, usize) -> CallbackFlow,
) -> CallbackFlow {
    let piece_len = (scratch.len() / channels).max(1) * channels;
    let mut offset_frames = 0;
    let mut flow = CallbackFlow::Continue;
    for piece in data.chunks_mut(piece_len) {
        if flow == CallbackFlow::Abort {
            piece.fill(0.0);
            continue;
        }
        let buf = &mut scratch[..piece.len()];
        let frames = piece.len() / channels;
        flow = produce(buf, frames, offset_frames);
        for (dst, &src) in piece.iter_mut().zip(buf.iter()) {
            *dst = i16_to_f32(src);
        }
        offset_frames += frames;
    }
    flow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_buffer_when_in_range() {
        let range = SupportedBufferSize::Range { min: 64, max: 4096 };
        assert_eq!(choose_buffer_size(0.01, 48000, &range), BufferSize::Fixed(480));
    }

    #[test]
    fn default_buffer_when_out_of_range_or_unknown() {
        let range = SupportedBufferSize::Range { min: 64, max: 256 };
        assert_eq!(choose_buffer_size(0.01, 48000, &range), BufferSize::Default);
        assert_eq!(
            choose_buffer_size(0.01, 48000, &SupportedBufferSize::Unknown),
            BufferSize::Default
        );
        let wide = SupportedBufferSize::Range { min: 1, max: 100_000 };
        assert_eq!(choose_buffer_size(0.0, 48000, &wide), BufferSize::Default);
    }

    #[test]
    fn capture_conversion_splits_on_frame_boundaries() {
        let data: Vec<f32> = (0..10).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let mut scratch = vec![0i16; 4];
        let mut pieces = Vec::new();

        let flow = convert_capture(&data, &mut scratch, 2, |piece, frames, offset| {
            pieces.push((piece.to_vec(), frames, offset));
            CallbackFlow::Continue
        });

        assert_eq!(flow, CallbackFlow::Continue);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], (vec![i16::MAX, -i16::MAX, i16::MAX, -i16::MAX], 2, 0));
        assert_eq!(pieces[1].2, 2);
        assert_eq!(pieces[2], (vec![i16::MAX, -i16::MAX], 1, 4));
    }

    #[test]
    fn capture_conversion_stops_on_abort() {
        let data = vec![0.5f32; 12];
        let mut scratch = vec![0i16; 4];
        let mut calls = 0;

        let flow = convert_capture(&data, &mut scratch, 1, |_, _, _| {
            calls += 1;
            CallbackFlow::Abort
        });

        assert_eq!(flow, CallbackFlow::Abort);
        assert_eq!(calls, 1);
    }

    #[test]
    fn render_conversion_fills_all_pieces() {
        let mut data = vec![9.0f32; 6];
        let mut scratch = vec![0i16; 4];
        let mut offsets = Vec::new();

        let flow = convert_render(&mut data, &mut scratch, 1, |buf, frames, offset| {
            buf.fill(i16::MAX);
            offsets.push((frames, offset));
            CallbackFlow::Continue
        });

        assert_eq!(flow, CallbackFlow::Continue);
        assert_eq!(offsets, vec![(4, 0), (2, 4)]);
        assert!(data.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn render_conversion_silences_after_abort() {
        let mut data = vec![9.0f32; 8];
        let mut scratch = vec![0i16; 4];

        let flow = convert_render(&mut data, &mut scratch, 2, |buf, _, _| {
            buf.fill(i16::MAX);
            CallbackFlow::Abort
        });

        assert_eq!(flow, CallbackFlow::Abort);
        assert!(data[..4].iter().all(|&s| (s - 1.0).abs() < 1e-6));
        assert!(data[4..].iter().all(|&s| s == 0.0));
    }
}
