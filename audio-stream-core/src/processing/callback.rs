//! Real-time callbacks moving samples between hardware buffers and a
//! stream context.
//!
//! These run on the driver's audio thread and must not:
//! - allocate
//! - take locks or block
//! - log or touch the file system
//!
//! Their cost is proportional to the frames in the hardware buffer.

use std::sync::Arc;

use chrono::Utc;

use crate::processing::stream_context::{CaptureContext, RenderContext};
use crate::traits::audio_driver::{CallbackFlow, CallbackTiming, StreamCallback};

/// Move one hardware input buffer into the capture ring.
///
/// Latches the timing anchor on the first call that carries data. Writes
/// `frames × channels` samples, or fewer if `input` is shorter.
pub fn capture_callback(
    ctx: Option<&CaptureContext>,
    input: Option<&[i16]>,
    frames: usize,
    timing: &CallbackTiming,
) -> CallbackFlow {
    let Some(ctx) = ctx else {
        return CallbackFlow::Abort;
    };
    let Some(input) = input else {
        return CallbackFlow::Continue;
    };
    if !ctx.is_recording() {
        return CallbackFlow::Continue;
    }

    if ctx.anchor().is_none() {
        ctx.latch_anchor(timing.input_adc_time, wall_clock_now_ns());
    }

    let total = (frames * usize::from(ctx.num_channels())).min(input.len());
    ctx.buffer().write_slice(&input[..total]);
    CallbackFlow::Continue
}

/// Fill one hardware output buffer from the render ring.
///
/// Underrun is not fatal: missing samples become silence.
pub fn render_callback(
    ctx: Option<&RenderContext>,
    output: &mut [i16],
    frames: usize,
) -> CallbackFlow {
    let Some(ctx) = ctx else {
        output.fill(0);
        return CallbackFlow::Abort;
    };

    let wanted = (frames * usize::from(ctx.num_channels())).min(output.len());
    let read = ctx.consume(output, wanted);
    output[read..].fill(0);
    CallbackFlow::Continue
}

/// Bind a capture context to a driver callback.
pub fn bind_capture(ctx: Arc<CaptureContext>) -> StreamCallback {
    StreamCallback::Capture(Box::new(
        move |input: Option<&[i16]>, frames: usize, timing: &CallbackTiming| {
            capture_callback(Some(&ctx), input, frames, timing)
        },
    ))
}

/// Bind a render context to a driver callback.
pub fn bind_render(ctx: Arc<RenderContext>) -> StreamCallback {
    StreamCallback::Render(Box::new(
        move |output: &mut [i16], frames: usize, _timing: &CallbackTiming| {
            render_callback(Some(&ctx), output, frames)
        },
    ))
}

fn wall_clock_now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0)
}
